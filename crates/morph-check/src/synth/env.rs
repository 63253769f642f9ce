//! Abstract values and the environment threaded through synthesis.
//!
//! Branches are analyzed on clones of the environment and merged with
//! [`Env::join`] afterwards; nothing is undone in place.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use morph_core::{
    AccessPath, AccessSegment, FieldShape, ObjectShape, OpaqueReason, Origin, ValueShape,
};

/// What is known about the text literals a position can hold.
///
/// Used to put `EnumText` domains on output fields that only ever receive
/// literal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Nothing has been written here yet. Identity for [`Evidence::merge`].
    Unreached,
    /// Something non-literal may end up here. Absorbs everything.
    Unconstrained,
    TextLiterals(IndexSet<String>),
    Fields(IndexMap<String, Evidence>),
    Elements(Box<Evidence>),
}

impl Evidence {
    pub fn text(literal: &str) -> Evidence {
        Evidence::TextLiterals(IndexSet::from([literal.to_string()]))
    }

    pub fn merge(&self, other: &Evidence) -> Evidence {
        match (self, other) {
            (Evidence::Unreached, x) | (x, Evidence::Unreached) => x.clone(),
            (Evidence::TextLiterals(a), Evidence::TextLiterals(b)) => {
                Evidence::TextLiterals(a.union(b).cloned().collect())
            }
            (Evidence::Fields(a), Evidence::Fields(b)) => {
                let mut fields = a.clone();
                for (name, ev) in b {
                    let merged = match fields.get(name) {
                        Some(existing) => existing.merge(ev),
                        None => ev.clone(),
                    };
                    fields.insert(name.clone(), merged);
                }
                Evidence::Fields(fields)
            }
            (Evidence::Elements(a), Evidence::Elements(b)) => {
                Evidence::Elements(Box::new(a.merge(b)))
            }
            _ => Evidence::Unconstrained,
        }
    }

    /// Evidence for one field of an object with this evidence.
    pub fn field(&self, name: &str) -> Evidence {
        match self {
            Evidence::Fields(fields) => fields.get(name).cloned().unwrap_or(Evidence::Unreached),
            Evidence::Unreached => Evidence::Unreached,
            _ => Evidence::Unconstrained,
        }
    }

    pub fn element(&self) -> Evidence {
        match self {
            Evidence::Elements(inner) => (**inner).clone(),
            Evidence::Unreached => Evidence::Unreached,
            _ => Evidence::Unconstrained,
        }
    }

    /// Replaces the evidence at `segments` below this one.
    pub fn write(&self, segments: &[AccessSegment], value: Evidence) -> Evidence {
        let Some((first, rest)) = segments.split_first() else {
            return value;
        };
        match first {
            AccessSegment::Field(name) => {
                let mut fields = match self {
                    Evidence::Fields(fields) => fields.clone(),
                    Evidence::Unreached => IndexMap::new(),
                    _ => return Evidence::Unconstrained,
                };
                let child = self.field(name).write(rest, value);
                fields.insert(name.clone(), child);
                Evidence::Fields(fields)
            }
            AccessSegment::Index(_) => {
                let element = self.element();
                let written = if rest.is_empty() {
                    element.merge(&value)
                } else {
                    element.write(rest, value)
                };
                match self {
                    Evidence::Elements(_) | Evidence::Unreached => {
                        Evidence::Elements(Box::new(written))
                    }
                    _ => Evidence::Unconstrained,
                }
            }
            AccessSegment::Dynamic => Evidence::Unconstrained,
        }
    }
}

/// The abstract counterpart of a runtime value.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractValue {
    pub shape: ValueShape,
    /// Input paths the value may have been read from.
    pub provenance: BTreeSet<AccessPath>,
    pub evidence: Evidence,
    /// Regions inside this value (relative paths) that are only reachable
    /// through computed keys or indexes.
    pub opaque: Vec<(AccessPath, OpaqueReason)>,
}

impl AbstractValue {
    /// A value of `shape` with no provenance. Shapes that cannot hold text
    /// start with no evidence; anything else is unconstrained.
    pub fn of(shape: ValueShape) -> Self {
        let textless = shape.options().iter().all(|o| {
            matches!(
                o,
                ValueShape::Never
                    | ValueShape::Null
                    | ValueShape::Boolean
                    | ValueShape::Number
                    | ValueShape::Bytes
            )
        });
        AbstractValue {
            shape,
            provenance: BTreeSet::new(),
            evidence: if textless {
                Evidence::Unreached
            } else {
                Evidence::Unconstrained
            },
            opaque: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        AbstractValue::of(ValueShape::Unknown)
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_provenance(mut self, provenance: BTreeSet<AccessPath>) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn merge(&self, other: &AbstractValue) -> AbstractValue {
        let mut opaque = self.opaque.clone();
        for entry in &other.opaque {
            if !opaque.contains(entry) {
                opaque.push(entry.clone());
            }
        }
        AbstractValue {
            shape: self.shape.merge(&other.shape),
            provenance: self.provenance.union(&other.provenance).cloned().collect(),
            evidence: self.evidence.merge(&other.evidence),
            opaque,
        }
    }

    /// Adds opaque entries from `inner`, re-rooted under `prefix`.
    pub fn absorb_opaque(&mut self, prefix: &AccessPath, inner: &[(AccessPath, OpaqueReason)]) {
        for (path, reason) in inner {
            let entry = (prefix.join(path), *reason);
            if !self.opaque.contains(&entry) {
                self.opaque.push(entry);
            }
        }
    }

    /// The unique static input path this value was read from, if any.
    pub fn single_static_source(&self) -> Option<&AccessPath> {
        match self.provenance.iter().next() {
            Some(path) if self.provenance.len() == 1 && !path.has_dynamic() => Some(path),
            _ => None,
        }
    }
}

/// Per-path state of the abstract interpreter.
#[derive(Debug, Clone, Default)]
pub struct Env {
    /// Transform locals in declaration order.
    pub vars: IndexMap<String, AbstractValue>,
    /// Narrowed shapes of input paths, from refinements.
    pub input_overlay: IndexMap<AccessPath, ValueShape>,
    /// This path has emitted an output.
    pub emitted: bool,
    /// This path has returned or aborted (or is unreachable).
    pub terminated: bool,
}

impl Env {
    pub fn is_local(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn declare(&mut self, name: &str, value: AbstractValue) {
        self.vars.insert(name.to_string(), value);
    }

    /// Merges two paths that reconverge.
    ///
    /// A terminated path contributes nothing. Locals present on only one
    /// side were declared inside the branch and go out of scope; overlay
    /// entries present on only one side no longer hold.
    pub fn join(a: Env, b: Env) -> Env {
        if a.terminated {
            return b;
        }
        if b.terminated {
            return a;
        }

        let mut vars = IndexMap::new();
        for (name, value) in &a.vars {
            if let Some(theirs) = b.vars.get(name) {
                vars.insert(name.clone(), value.merge(theirs));
            }
        }

        let mut input_overlay = IndexMap::new();
        for (path, shape) in &a.input_overlay {
            if let Some(theirs) = b.input_overlay.get(path) {
                input_overlay.insert(path.clone(), shape.merge(theirs));
            }
        }

        Env {
            vars,
            input_overlay,
            emitted: a.emitted && b.emitted,
            terminated: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Shape surgery for writes through paths
// ---------------------------------------------------------------------------

/// The object a write into `base` lands in. Writing into a value that has no
/// object part creates a fresh closed object.
fn object_for_write(base: &ValueShape) -> ObjectShape {
    match base {
        ValueShape::Unknown => ObjectShape::open(),
        _ => base
            .options()
            .iter()
            .find_map(|o| match o {
                ValueShape::Object(object) => Some(object.clone()),
                _ => None,
            })
            .unwrap_or_else(ObjectShape::closed),
    }
}

/// Reads the shape at `segments`, or `Never` if nothing was written there.
pub fn read_shape(base: &ValueShape, segments: &[AccessSegment]) -> ValueShape {
    let Some((first, rest)) = segments.split_first() else {
        return base.clone();
    };
    match first {
        AccessSegment::Field(name) => {
            let object = object_for_write(base);
            match object.fields.get(name) {
                Some(field) => read_shape(&field.shape, rest),
                None => ValueShape::Never,
            }
        }
        AccessSegment::Index(_) | AccessSegment::Dynamic => read_shape(&base.element_shape(), rest),
    }
}

/// Writes `value` at `segments` inside `base`, creating intermediate objects.
///
/// Fields along the path become required and take `origin` unless they
/// already carry one; the written field itself always takes `origin`. An
/// index segment merges into the element shape instead of replacing it.
pub fn write_shape(
    base: &ValueShape,
    segments: &[AccessSegment],
    value: &ValueShape,
    origin: Origin,
) -> ValueShape {
    let Some((first, rest)) = segments.split_first() else {
        return value.clone();
    };
    match first {
        AccessSegment::Field(name) => {
            let mut object = object_for_write(base);
            let existing = object.fields.get(name).cloned();
            let child_base = existing
                .as_ref()
                .map(|f| f.shape.clone())
                .unwrap_or(ValueShape::Never);
            let shape = write_shape(&child_base, rest, value, origin);
            let field_origin = if rest.is_empty() {
                Some(origin)
            } else {
                existing.and_then(|f| f.origin).or(Some(origin))
            };
            object.fields.insert(
                name.clone(),
                FieldShape {
                    shape,
                    required: true,
                    origin: field_origin,
                },
            );
            ValueShape::Object(object)
        }
        AccessSegment::Index(_) | AccessSegment::Dynamic => {
            let element = base.element_shape();
            let written = if rest.is_empty() {
                element.merge(value)
            } else {
                write_shape(&element, rest, value, origin)
            };
            if matches!(base, ValueShape::Set(_)) {
                ValueShape::set(written)
            } else {
                ValueShape::array(written)
            }
        }
    }
}

/// Marks the object at `segments` as open, creating it if needed.
pub fn open_at(base: &ValueShape, segments: &[AccessSegment], origin: Origin) -> ValueShape {
    let mut target = object_for_write(&read_shape(base, segments));
    target.closed = false;
    write_shape(base, segments, &ValueShape::Object(target), origin)
}

/// Applies `narrow` to the shape at `segments`, leaving everything else as is.
///
/// Paths that do not exist in the shape are left alone; a field that is only
/// optionally present keeps its optionality.
pub fn narrow_shape(
    base: &ValueShape,
    segments: &[AccessSegment],
    narrow: &dyn Fn(&ValueShape) -> ValueShape,
) -> ValueShape {
    let Some((first, rest)) = segments.split_first() else {
        return narrow(base);
    };
    let AccessSegment::Field(name) = first else {
        return base.clone();
    };
    let rebuild = |option: &ValueShape| match option {
        ValueShape::Object(object) => {
            let mut object = object.clone();
            if let Some(field) = object.fields.get_mut(name) {
                field.shape = narrow_shape(&field.shape, rest, narrow);
            }
            ValueShape::Object(object)
        }
        other => other.clone(),
    };
    match base {
        ValueShape::Union(options) => ValueShape::union(options.iter().map(rebuild)),
        other => rebuild(other),
    }
}

/// `shape` with `origin` on every object field that has none, recursively.
pub fn tag_origin(shape: &ValueShape, origin: Origin) -> ValueShape {
    match shape {
        ValueShape::Object(object) => {
            let mut object = object.clone();
            for field in object.fields.values_mut() {
                field.shape = tag_origin(&field.shape, origin);
                if field.origin.is_none() {
                    field.origin = Some(origin);
                }
            }
            ValueShape::Object(object)
        }
        ValueShape::Array(elem) => ValueShape::array(tag_origin(elem, origin)),
        ValueShape::Set(elem) => ValueShape::set(tag_origin(elem, origin)),
        ValueShape::Union(options) => {
            ValueShape::union(options.iter().map(|o| tag_origin(o, origin)))
        }
        other => other.clone(),
    }
}

/// Shape of an accumulator after appending one element of shape `element`.
///
/// Array and set options grow; a null or unknown accumulator becomes an
/// array; scalar options cannot be appended to and are dropped.
pub fn append_shape(current: &ValueShape, element: &ValueShape) -> ValueShape {
    if current.is_unknown() || current.is_never() {
        return ValueShape::array(element.clone());
    }
    let grown: Vec<ValueShape> = current
        .options()
        .iter()
        .filter_map(|option| match option {
            ValueShape::Array(e) => Some(ValueShape::array(e.merge(element))),
            ValueShape::Set(e) => Some(ValueShape::set(e.merge(element))),
            ValueShape::Null => Some(ValueShape::array(element.clone())),
            _ => None,
        })
        .collect();
    if grown.is_empty() {
        ValueShape::array(element.clone())
    } else {
        ValueShape::union(grown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(fields: &[&str]) -> Vec<AccessSegment> {
        AccessPath::fields(fields).segments().to_vec()
    }

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    #[test]
    fn evidence_merge_identity_and_absorption() {
        let a = Evidence::text("a");
        assert_eq!(Evidence::Unreached.merge(&a), a);
        assert_eq!(a.merge(&Evidence::Unconstrained), Evidence::Unconstrained);
        let ab = a.merge(&Evidence::text("b"));
        assert_eq!(
            ab,
            Evidence::TextLiterals(IndexSet::from(["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn evidence_write_into_unconstrained_stays_unconstrained() {
        let written = Evidence::Unconstrained.write(&path(&["x"]), Evidence::text("a"));
        assert_eq!(written, Evidence::Unconstrained);
        let fresh = Evidence::Unreached.write(&path(&["x"]), Evidence::text("a"));
        assert_eq!(fresh.field("x"), Evidence::text("a"));
    }

    // -----------------------------------------------------------------------
    // Shape writes
    // -----------------------------------------------------------------------

    #[test]
    fn write_creates_intermediate_closed_objects() {
        let shape = write_shape(
            &ValueShape::Object(ObjectShape::closed()),
            &path(&["a", "b"]),
            &ValueShape::Text,
            Origin::Set,
        );
        assert_eq!(shape.to_string(), "object{a: object{b: text}}");
        let ValueShape::Object(object) = &shape else {
            panic!("expected object");
        };
        assert_eq!(object.fields["a"].origin, Some(Origin::Set));
        assert_eq!(read_shape(&shape, &path(&["a", "b"])), ValueShape::Text);
        assert_eq!(read_shape(&shape, &path(&["a", "zzz"])), ValueShape::Never);
    }

    #[test]
    fn write_into_nullable_object_drops_null() {
        let base = ValueShape::record([("x", ValueShape::Number)]).nullable();
        let shape = write_shape(&base, &path(&["y"]), &ValueShape::Text, Origin::Set);
        assert_eq!(shape.to_string(), "object{x: number, y: text}");
    }

    #[test]
    fn open_at_marks_container_open() {
        let shape = open_at(
            &ValueShape::Object(ObjectShape::closed()),
            &path(&["bag"]),
            Origin::Set,
        );
        assert_eq!(shape.to_string(), "object{bag: object{..}}");
    }

    #[test]
    fn append_to_empty_seed_takes_exact_element_shape() {
        let empty = ValueShape::array(ValueShape::Never);
        assert_eq!(
            append_shape(&empty, &ValueShape::Text),
            ValueShape::array(ValueShape::Text)
        );
        assert_eq!(
            append_shape(&ValueShape::Null, &ValueShape::Number),
            ValueShape::array(ValueShape::Number)
        );
    }

    #[test]
    fn narrow_reaches_nested_fields() {
        let base = ValueShape::record([("meta", ValueShape::open_object().nullable())]);
        let narrowed = narrow_shape(&base, &path(&["meta"]), &|s: &ValueShape| s.without_null());
        assert_eq!(narrowed.to_string(), "object{meta: object{..}}");
    }

    #[test]
    fn join_drops_branch_locals_and_terminated_paths() {
        let mut a = Env::default();
        a.declare("x", AbstractValue::of(ValueShape::Text));
        let mut b = a.clone();
        b.declare("x", AbstractValue::of(ValueShape::Number));
        b.declare("only_b", AbstractValue::of(ValueShape::Boolean));
        let joined = Env::join(a.clone(), b);
        assert!(!joined.is_local("only_b"));
        assert_eq!(
            joined.vars["x"].shape,
            ValueShape::union([ValueShape::Number, ValueShape::Text])
        );

        let mut dead = a.clone();
        dead.declare("x", AbstractValue::of(ValueShape::Null));
        dead.terminated = true;
        let joined = Env::join(dead, a);
        assert_eq!(joined.vars["x"].shape, ValueShape::Text);
    }
}
