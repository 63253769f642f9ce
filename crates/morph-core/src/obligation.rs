//! Obligations: boolean constraints over a concrete root value.
//!
//! Structural shape matching cannot express "at least one of these fields" or
//! "every element of this list carries these keys". [`ObligationExpr`] trees
//! capture those, addressed by [`AccessPath`]s from the schema root, and are
//! evaluated independently of the node tree.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::ValueDomain;
use crate::path::AccessPath;

/// A boolean constraint tree over a concrete root value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ObligationExpr {
    /// The path resolves to some value (possibly `null`).
    PathPresent { path: AccessPath },
    /// The path resolves to a non-null value.
    PathNonNull { path: AccessPath },
    /// At least one child holds.
    OneOf { children: Vec<ObligationExpr> },
    /// Every child holds.
    AllOf { children: Vec<ObligationExpr> },
    /// Every element of the array/set at `path` satisfies the per-element
    /// constraints. Vacuously true when the path is absent.
    ForAll {
        path: AccessPath,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required_fields: Vec<String>,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        field_domains: IndexMap<String, Vec<ValueDomain>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        require_any_of: Vec<Vec<String>>,
    },
    /// The array/set at `path` has at least `min_count` elements.
    Exists { path: AccessPath, min_count: usize },
    /// The value at `path`, when present and non-null, lies in `domain`.
    ValueDomain { path: AccessPath, domain: ValueDomain },
}

impl ObligationExpr {
    pub fn present(path: AccessPath) -> Self {
        ObligationExpr::PathPresent { path }
    }

    pub fn non_null(path: AccessPath) -> Self {
        ObligationExpr::PathNonNull { path }
    }

    pub fn for_all_required<S: AsRef<str>>(path: AccessPath, fields: &[S]) -> Self {
        ObligationExpr::ForAll {
            path,
            required_fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            field_domains: IndexMap::new(),
            require_any_of: Vec::new(),
        }
    }

    /// The path a violation of this obligation is reported at: the first path
    /// mentioned, or the root for empty combinators.
    pub fn anchor_path(&self) -> AccessPath {
        self.paths().into_iter().next().unwrap_or_default()
    }

    /// Every path mentioned by this tree, in order of appearance.
    pub fn paths(&self) -> Vec<AccessPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut Vec<AccessPath>) {
        match self {
            ObligationExpr::PathPresent { path }
            | ObligationExpr::PathNonNull { path }
            | ObligationExpr::ForAll { path, .. }
            | ObligationExpr::Exists { path, .. }
            | ObligationExpr::ValueDomain { path, .. } => out.push(path.clone()),
            ObligationExpr::OneOf { children } | ObligationExpr::AllOf { children } => {
                for child in children {
                    child.collect_paths(out);
                }
            }
        }
    }
}

impl fmt::Display for ObligationExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObligationExpr::PathPresent { path } => write!(f, "present({path})"),
            ObligationExpr::PathNonNull { path } => write!(f, "non_null({path})"),
            ObligationExpr::OneOf { children } | ObligationExpr::AllOf { children } => {
                let name = if matches!(self, ObligationExpr::OneOf { .. }) {
                    "one_of"
                } else {
                    "all_of"
                };
                write!(f, "{name}(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            ObligationExpr::ForAll {
                path,
                required_fields,
                field_domains,
                require_any_of,
            } => {
                write!(f, "for_all({path}")?;
                if !required_fields.is_empty() {
                    write!(f, ", required=[{}]", required_fields.join(", "))?;
                }
                for (field, domains) in field_domains {
                    for domain in domains {
                        write!(f, ", {field} in {domain}")?;
                    }
                }
                for group in require_any_of {
                    write!(f, ", any_of=[{}]", group.join(", "))?;
                }
                write!(f, ")")
            }
            ObligationExpr::Exists { path, min_count } => {
                write!(f, "exists({path}, min={min_count})")
            }
            ObligationExpr::ValueDomain { path, domain } => write!(f, "{path} in {domain}"),
        }
    }
}

/// An obligation plus the metadata that gates how strictly it is enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub expr: ObligationExpr,
    /// How sure the producer is that the constraint reflects intent, 0..=1.
    pub confidence: f64,
    /// Derived by a heuristic rather than read off the program directly.
    #[serde(default)]
    pub heuristic: bool,
    /// Identifier of the rule that produced this obligation.
    pub rule_id: String,
}

impl Obligation {
    /// A fully trusted, non-heuristic obligation.
    pub fn certain(expr: ObligationExpr, rule_id: &str) -> Self {
        Obligation {
            expr,
            confidence: 1.0,
            heuristic: false,
            rule_id: rule_id.to_string(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn heuristic(mut self) -> Self {
        self.heuristic = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nests_combinators() {
        let expr = ObligationExpr::OneOf {
            children: vec![
                ObligationExpr::non_null(AccessPath::fields(&["testsuites"])),
                ObligationExpr::non_null(AccessPath::fields(&["testsuite"])),
            ],
        };
        assert_eq!(
            expr.to_string(),
            "one_of(non_null($.testsuites), non_null($.testsuite))"
        );
    }

    #[test]
    fn anchor_path_is_first_mentioned() {
        let expr = ObligationExpr::AllOf {
            children: vec![
                ObligationExpr::present(AccessPath::fields(&["b"])),
                ObligationExpr::present(AccessPath::fields(&["a"])),
            ],
        };
        assert_eq!(expr.anchor_path(), AccessPath::fields(&["b"]));
        assert_eq!(
            ObligationExpr::AllOf { children: vec![] }.anchor_path(),
            AccessPath::root()
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let ob = Obligation::certain(ObligationExpr::present(AccessPath::root()), "r")
            .with_confidence(4.0);
        assert_eq!(ob.confidence, 1.0);
    }
}
