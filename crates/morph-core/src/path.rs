//! Access paths into input and output values.
//!
//! An [`AccessPath`] is the static description of where a value lives relative
//! to a schema root: a sequence of field names, literal indexes, and
//! [`AccessSegment::Dynamic`] markers for keys or indexes that are only known
//! at run time. Paths containing a dynamic segment are never deep-validated;
//! they surface as [`OpaqueRegion`]s instead.
//!
//! The textual form is `$` for the root, `$.a.b[0][*]` otherwise. Field names
//! that are not plain identifiers render as `["some key"]`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;

/// One step of an [`AccessPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessSegment {
    /// A statically known object field.
    Field(String),
    /// A literal array index.
    Index(i64),
    /// A key or index not known statically (computed key, loop element).
    Dynamic,
}

/// Ordered list of [`AccessSegment`]s from a schema root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessPath {
    segments: SmallVec<[AccessSegment; 4]>,
}

impl AccessPath {
    /// The empty path addressing the schema root.
    pub fn root() -> Self {
        AccessPath::default()
    }

    pub fn from_segments(segments: impl IntoIterator<Item = AccessSegment>) -> Self {
        AccessPath {
            segments: segments.into_iter().collect(),
        }
    }

    /// Builds a path of plain field names.
    pub fn fields<S: AsRef<str>>(names: &[S]) -> Self {
        AccessPath::from_segments(
            names
                .iter()
                .map(|n| AccessSegment::Field(n.as_ref().to_string())),
        )
    }

    pub fn segments(&self) -> &[AccessSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: AccessSegment) {
        self.segments.push(segment);
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: AccessSegment) -> AccessPath {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    pub fn field(&self, name: &str) -> AccessPath {
        self.child(AccessSegment::Field(name.to_string()))
    }

    /// Returns a new path with every segment of `suffix` appended.
    pub fn join(&self, suffix: &AccessPath) -> AccessPath {
        let mut next = self.clone();
        next.segments.extend(suffix.segments.iter().cloned());
        next
    }

    pub fn has_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, AccessSegment::Dynamic))
    }

    /// The longest prefix containing no dynamic segment.
    pub fn static_prefix(&self) -> AccessPath {
        AccessPath::from_segments(
            self.segments
                .iter()
                .take_while(|s| !matches!(s, AccessSegment::Dynamic))
                .cloned(),
        )
    }

    pub fn starts_with(&self, prefix: &AccessPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strips `prefix` from the front of this path, if it is a prefix.
    pub fn strip_prefix(&self, prefix: &AccessPath) -> Option<AccessPath> {
        if self.starts_with(prefix) {
            Some(AccessPath::from_segments(
                self.segments[prefix.segments.len()..].iter().cloned(),
            ))
        } else {
            None
        }
    }

    pub fn parent(&self) -> Option<AccessPath> {
        if self.segments.is_empty() {
            None
        } else {
            Some(AccessPath::from_segments(
                self.segments[..self.segments.len() - 1].iter().cloned(),
            ))
        }
    }

    pub fn last(&self) -> Option<&AccessSegment> {
        self.segments.last()
    }

    /// Name of the first segment when it is a field.
    pub fn top_level_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(AccessSegment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Every non-empty prefix of this path, shortest first.
    pub fn prefixes(&self) -> impl Iterator<Item = AccessPath> + '_ {
        (1..=self.segments.len())
            .map(|n| AccessPath::from_segments(self.segments[..n].iter().cloned()))
    }

    /// Parses the textual form produced by [`fmt::Display`].
    ///
    /// The leading `$` is optional, so `a.b[0]` and `$.a.b[0]` are the same
    /// path.
    pub fn parse(input: &str) -> Result<AccessPath, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidPath {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = input.trim();
        if let Some(stripped) = rest.strip_prefix('$') {
            rest = stripped;
        }

        let mut path = AccessPath::root();
        let mut first = true;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let inner = &after[..close];
                let segment = if inner == "*" {
                    AccessSegment::Dynamic
                } else if let Some(quoted) = inner
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                {
                    AccessSegment::Field(quoted.to_string())
                } else {
                    let index = inner
                        .parse::<i64>()
                        .map_err(|_| invalid("index is not an integer"))?;
                    AccessSegment::Index(index)
                };
                path.push(segment);
                rest = &after[close + 1..];
            } else {
                let body = match rest.strip_prefix('.') {
                    Some(after) => after,
                    None if first => rest,
                    None => return Err(invalid("expected '.' or '['")),
                };
                let end = body.find(['.', '[']).unwrap_or(body.len());
                let name = &body[..end];
                if name.is_empty() {
                    return Err(invalid("empty field name"));
                }
                path.push(AccessSegment::Field(name.to_string()));
                rest = &body[end..];
            }
            first = false;
        }
        Ok(path)
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '@')
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                AccessSegment::Field(name) if is_plain_identifier(name) => write!(f, ".{name}")?,
                AccessSegment::Field(name) => write!(f, "[\"{name}\"]")?,
                AccessSegment::Index(i) => write!(f, "[{i}]")?,
                AccessSegment::Dynamic => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

/// Why a location was excluded from deep validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueReason {
    /// Reached through a computed object key.
    Key,
    /// Reached through a computed array index (including loop elements).
    Index,
    /// Produced by a computed expression whose structure is not static.
    Computed,
}

impl fmt::Display for OpaqueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpaqueReason::Key => "key",
            OpaqueReason::Index => "index",
            OpaqueReason::Computed => "computed",
        };
        f.write_str(name)
    }
}

/// A location reachable only through a dynamically computed key or index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpaqueRegion {
    pub path: AccessPath,
    pub reason: OpaqueReason,
}

impl OpaqueRegion {
    pub fn new(path: AccessPath, reason: OpaqueReason) -> Self {
        OpaqueRegion { path, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_fields_indexes_and_dynamic() {
        let path = AccessPath::fields(&["a", "b"])
            .child(AccessSegment::Index(0))
            .child(AccessSegment::Dynamic);
        assert_eq!(path.to_string(), "$.a.b[0][*]");
        assert_eq!(AccessPath::root().to_string(), "$");
    }

    #[test]
    fn display_quotes_unusual_field_names() {
        let path = AccessPath::fields(&["has space"]);
        assert_eq!(path.to_string(), "$[\"has space\"]");
    }

    #[test]
    fn parse_roundtrips_display() {
        for text in ["$", "$.a", "$.a.b[0][*]", "$[\"has space\"].x", "$.items[12].name"] {
            let path = AccessPath::parse(text).unwrap();
            assert_eq!(path.to_string(), text);
        }
    }

    #[test]
    fn parse_accepts_missing_dollar() {
        assert_eq!(
            AccessPath::parse("a.b").unwrap(),
            AccessPath::fields(&["a", "b"])
        );
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert!(AccessPath::parse("a[").is_err());
        assert!(AccessPath::parse("a..b").is_err());
        assert!(AccessPath::parse("a[x]").is_err());
    }

    #[test]
    fn static_prefix_stops_at_dynamic() {
        let path = AccessPath::fields(&["a"])
            .child(AccessSegment::Dynamic)
            .field("b");
        assert!(path.has_dynamic());
        assert_eq!(path.static_prefix(), AccessPath::fields(&["a"]));
    }

    #[test]
    fn prefixes_are_shortest_first() {
        let path = AccessPath::fields(&["a", "b", "c"]);
        let prefixes: Vec<String> = path.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["$.a", "$.a.b", "$.a.b.c"]);
    }

    #[test]
    fn strip_prefix_returns_remainder() {
        let path = AccessPath::fields(&["a", "b", "c"]);
        let rest = path.strip_prefix(&AccessPath::fields(&["a"])).unwrap();
        assert_eq!(rest, AccessPath::fields(&["b", "c"]));
        assert!(path.strip_prefix(&AccessPath::fields(&["x"])).is_none());
    }
}
