//! Structural value shapes and their merge algebra.
//!
//! [`ValueShape`] is the closed sum type the synthesizer reasons with. It is a
//! lattice with [`ValueShape::Never`] at the bottom and
//! [`ValueShape::Unknown`] at the top; [`ValueShape::merge`] is the join used
//! for branch merging and union construction.
//!
//! Union invariants, maintained by [`ValueShape::union`]:
//! - a union never directly contains another union (options are flattened);
//! - `Never` never appears as an option;
//! - any `Unknown` option collapses the whole union to `Unknown`;
//! - at most one array, one set and one object option exist (same-kind
//!   containers are merged pairwise), and scalar options are unique;
//! - options are ordered by kind, which makes `merge` commutative.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How an output field came to exist. Only meaningful on output schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Written by a `SET` on a path.
    Set,
    /// Written by a `MODIFY` merge.
    Modify,
    /// Grown by an `APPEND TO`.
    Append,
    /// Part of an emitted `OUTPUT` template.
    Output,
    /// Two merged paths disagreed on where the field came from.
    Merged,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Set => "set",
            Origin::Modify => "modify",
            Origin::Append => "append",
            Origin::Output => "output",
            Origin::Merged => "merged",
        };
        f.write_str(name)
    }
}

/// The shape of one object field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldShape {
    pub shape: ValueShape,
    /// The key is present on every path that produced the object.
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl FieldShape {
    pub fn required(shape: ValueShape) -> Self {
        FieldShape {
            shape,
            required: true,
            origin: None,
        }
    }

    pub fn optional(shape: ValueShape) -> Self {
        FieldShape {
            shape,
            required: false,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Merges the same field seen on two paths.
    fn merge(&self, other: &FieldShape) -> FieldShape {
        let origin = if self.origin == other.origin {
            self.origin
        } else {
            Some(Origin::Merged)
        };
        FieldShape {
            shape: self.shape.merge(&other.shape),
            required: self.required && other.required,
            origin,
        }
    }
}

/// Fields of an object shape plus whether extra keys are forbidden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectShape {
    pub fields: IndexMap<String, FieldShape>,
    /// `true` forbids keys beyond `fields`.
    pub closed: bool,
}

impl ObjectShape {
    pub fn open() -> Self {
        ObjectShape {
            fields: IndexMap::new(),
            closed: false,
        }
    }

    pub fn closed() -> Self {
        ObjectShape {
            fields: IndexMap::new(),
            closed: true,
        }
    }

    pub fn with_field(mut self, name: &str, field: FieldShape) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    /// Field-by-field merge. Fields seen on only one side become optional.
    fn merge(&self, other: &ObjectShape) -> ObjectShape {
        let mut fields = IndexMap::new();
        for (name, field) in &self.fields {
            let merged = match other.fields.get(name) {
                Some(theirs) => field.merge(theirs),
                None => FieldShape {
                    required: false,
                    ..field.clone()
                },
            };
            fields.insert(name.clone(), merged);
        }
        for (name, field) in &other.fields {
            if !self.fields.contains_key(name) {
                fields.insert(
                    name.clone(),
                    FieldShape {
                        required: false,
                        ..field.clone()
                    },
                );
            }
        }
        ObjectShape {
            fields,
            closed: self.closed && other.closed,
        }
    }
}

/// Structural type describing the set of permissible values at a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// Bottom: no value (unreachable).
    Never,
    /// Top: no constraint.
    Unknown,
    Null,
    Boolean,
    Number,
    Bytes,
    Text,
    Array(Box<ValueShape>),
    Set(Box<ValueShape>),
    Object(ObjectShape),
    Union(Vec<ValueShape>),
}

impl ValueShape {
    pub fn array(element: ValueShape) -> Self {
        ValueShape::Array(Box::new(element))
    }

    pub fn set(element: ValueShape) -> Self {
        ValueShape::Set(Box::new(element))
    }

    pub fn open_object() -> Self {
        ValueShape::Object(ObjectShape::open())
    }

    /// A closed object whose listed fields are all required.
    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, ValueShape)>) -> Self {
        let mut object = ObjectShape::closed();
        for (name, shape) in fields {
            object
                .fields
                .insert(name.to_string(), FieldShape::required(shape));
        }
        ValueShape::Object(object)
    }

    /// This shape, also admitting `Null`.
    pub fn nullable(self) -> Self {
        ValueShape::union([self, ValueShape::Null])
    }

    /// Builds a normalized union of `options`.
    pub fn union(options: impl IntoIterator<Item = ValueShape>) -> Self {
        let mut buckets = UnionBuckets::default();
        for option in options {
            if buckets.add(option) {
                return ValueShape::Unknown;
            }
        }
        buckets.finish()
    }

    /// Least upper bound of two shapes.
    ///
    /// `merge(Never, x) = x`, `merge(Unknown, x) = Unknown`; containers merge
    /// element-wise and objects field-by-field, everything else unions.
    pub fn merge(&self, other: &ValueShape) -> ValueShape {
        match (self, other) {
            (ValueShape::Never, x) | (x, ValueShape::Never) => x.clone(),
            (ValueShape::Unknown, _) | (_, ValueShape::Unknown) => ValueShape::Unknown,
            _ => ValueShape::union([self.clone(), other.clone()]),
        }
    }

    /// Tightens an unconstrained shape with `constraint`.
    ///
    /// An `Unknown` shape takes the constraint; an already-known shape keeps
    /// its own information and widens to admit the constraint.
    pub fn constrain(&self, constraint: &ValueShape) -> ValueShape {
        match (self, constraint) {
            (ValueShape::Unknown, c) => c.clone(),
            (s, ValueShape::Unknown) => s.clone(),
            (s, c) => s.merge(c),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, ValueShape::Never)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ValueShape::Unknown)
    }

    /// Options of a union, or the shape itself.
    pub fn options(&self) -> &[ValueShape] {
        match self {
            ValueShape::Union(options) => options,
            other => std::slice::from_ref(other),
        }
    }

    pub fn admits_null(&self) -> bool {
        self.options()
            .iter()
            .any(|o| matches!(o, ValueShape::Null | ValueShape::Unknown))
    }

    /// Narrows to the non-null part. `Unknown` stays `Unknown`.
    pub fn without_null(&self) -> ValueShape {
        match self {
            ValueShape::Unknown => ValueShape::Unknown,
            _ => ValueShape::union(
                self.options()
                    .iter()
                    .filter(|o| !matches!(o, ValueShape::Null))
                    .cloned(),
            ),
        }
    }

    /// Narrows to `Null`, or `Never` if null is impossible.
    pub fn only_null(&self) -> ValueShape {
        if self.admits_null() {
            ValueShape::Null
        } else {
            ValueShape::Never
        }
    }

    /// Narrows to the object part. `Unknown` becomes an open empty object.
    pub fn object_part(&self) -> ValueShape {
        match self {
            ValueShape::Unknown => ValueShape::open_object(),
            _ => ValueShape::union(
                self.options()
                    .iter()
                    .filter(|o| matches!(o, ValueShape::Object(_)))
                    .cloned(),
            ),
        }
    }

    /// Narrows away the object part. `Unknown` stays `Unknown`.
    pub fn without_object(&self) -> ValueShape {
        match self {
            ValueShape::Unknown => ValueShape::Unknown,
            _ => ValueShape::union(
                self.options()
                    .iter()
                    .filter(|o| !matches!(o, ValueShape::Object(_)))
                    .cloned(),
            ),
        }
    }

    /// Shape of the elements when iterating this value.
    ///
    /// Array and set options contribute their element shape; anything else
    /// contributes nothing, so a non-iterable shape yields `Never`.
    pub fn element_shape(&self) -> ValueShape {
        match self {
            ValueShape::Unknown => ValueShape::Unknown,
            _ => self
                .options()
                .iter()
                .fold(ValueShape::Never, |acc, option| match option {
                    ValueShape::Array(elem) | ValueShape::Set(elem) => acc.merge(elem),
                    _ => acc,
                }),
        }
    }

    /// Shape produced by reading field `name` from a value of this shape.
    ///
    /// Reading a missing field, or a field of a non-object, yields `Null`;
    /// optional fields therefore also admit `Null`.
    pub fn field_shape(&self, name: &str) -> ValueShape {
        match self {
            ValueShape::Never => ValueShape::Never,
            ValueShape::Unknown => ValueShape::Unknown,
            ValueShape::Object(object) => match object.fields.get(name) {
                Some(field) if field.required => field.shape.clone(),
                Some(field) => field.shape.clone().nullable(),
                None if object.closed => ValueShape::Null,
                None => ValueShape::Unknown,
            },
            ValueShape::Union(options) => options
                .iter()
                .fold(ValueShape::Never, |acc, o| acc.merge(&o.field_shape(name))),
            _ => ValueShape::Null,
        }
    }

    /// Short lowercase tag of the outermost constructor.
    pub fn tag(&self) -> &'static str {
        match self {
            ValueShape::Never => "never",
            ValueShape::Unknown => "unknown",
            ValueShape::Null => "null",
            ValueShape::Boolean => "boolean",
            ValueShape::Number => "number",
            ValueShape::Bytes => "bytes",
            ValueShape::Text => "text",
            ValueShape::Array(_) => "array",
            ValueShape::Set(_) => "set",
            ValueShape::Object(_) => "object",
            ValueShape::Union(_) => "union",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ValueShape::Never => 0,
            ValueShape::Null => 1,
            ValueShape::Boolean => 2,
            ValueShape::Number => 3,
            ValueShape::Bytes => 4,
            ValueShape::Text => 5,
            ValueShape::Array(_) => 6,
            ValueShape::Set(_) => 7,
            ValueShape::Object(_) => 8,
            ValueShape::Union(_) => 9,
            ValueShape::Unknown => 10,
        }
    }
}

/// Accumulator for union normalization. Containers of the same kind are merged
/// as they arrive so a long chain of branches cannot blow up the union.
#[derive(Default)]
struct UnionBuckets {
    scalars: Vec<ValueShape>,
    array: Option<ValueShape>,
    set: Option<ValueShape>,
    object: Option<ObjectShape>,
}

impl UnionBuckets {
    /// Adds an option. Returns `true` if the union collapsed to `Unknown`.
    fn add(&mut self, option: ValueShape) -> bool {
        match option {
            ValueShape::Never => false,
            ValueShape::Unknown => true,
            ValueShape::Union(options) => {
                for o in options {
                    if self.add(o) {
                        return true;
                    }
                }
                false
            }
            ValueShape::Array(elem) => {
                let merged = match self.array.take() {
                    Some(existing) => existing.merge(&elem),
                    None => *elem,
                };
                self.array = Some(merged);
                false
            }
            ValueShape::Set(elem) => {
                let merged = match self.set.take() {
                    Some(existing) => existing.merge(&elem),
                    None => *elem,
                };
                self.set = Some(merged);
                false
            }
            ValueShape::Object(object) => {
                let merged = match self.object.take() {
                    Some(existing) => existing.merge(&object),
                    None => object,
                };
                self.object = Some(merged);
                false
            }
            scalar => {
                if !self.scalars.contains(&scalar) {
                    self.scalars.push(scalar);
                }
                false
            }
        }
    }

    fn finish(self) -> ValueShape {
        let mut options = self.scalars;
        if let Some(elem) = self.array {
            options.push(ValueShape::Array(Box::new(elem)));
        }
        if let Some(elem) = self.set {
            options.push(ValueShape::Set(Box::new(elem)));
        }
        if let Some(object) = self.object {
            options.push(ValueShape::Object(object));
        }
        options.sort_by_key(ValueShape::rank);
        match options.len() {
            0 => ValueShape::Never,
            1 => options.pop().unwrap_or(ValueShape::Never),
            _ => ValueShape::Union(options),
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueShape::Array(elem) => write!(f, "array<{elem}>"),
            ValueShape::Set(elem) => write!(f, "set<{elem}>"),
            ValueShape::Object(object) => {
                write!(f, "object{{")?;
                for (i, (name, field)) in object.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let marker = if field.required { "" } else { "?" };
                    write!(f, "{name}{marker}: {}", field.shape)?;
                }
                if !object.closed {
                    if !object.fields.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "..")?;
                }
                write!(f, "}}")
            }
            ValueShape::Union(options) => {
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{option}")?;
                }
                Ok(())
            }
            scalar => f.write_str(scalar.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text_or_null() -> ValueShape {
        ValueShape::union([ValueShape::Text, ValueShape::Null])
    }

    // -----------------------------------------------------------------------
    // Union normalization
    // -----------------------------------------------------------------------

    #[test]
    fn union_flattens_nested_unions() {
        let inner = ValueShape::union([ValueShape::Text, ValueShape::Number]);
        let outer = ValueShape::union([inner, ValueShape::Boolean]);
        match outer {
            ValueShape::Union(options) => {
                assert_eq!(options.len(), 3);
                assert!(options.iter().all(|o| !matches!(o, ValueShape::Union(_))));
            }
            other => panic!("expected union, got {other}"),
        }
    }

    #[test]
    fn union_drops_never_and_collapses_unknown() {
        assert_eq!(
            ValueShape::union([ValueShape::Never, ValueShape::Text]),
            ValueShape::Text
        );
        assert_eq!(
            ValueShape::union([ValueShape::Text, ValueShape::Unknown]),
            ValueShape::Unknown
        );
        assert_eq!(ValueShape::union([]), ValueShape::Never);
    }

    #[test]
    fn union_merges_same_kind_containers() {
        let merged = ValueShape::union([
            ValueShape::array(ValueShape::Text),
            ValueShape::array(ValueShape::Number),
            ValueShape::Null,
        ]);
        assert_eq!(
            merged,
            ValueShape::Union(vec![
                ValueShape::Null,
                ValueShape::array(ValueShape::union([ValueShape::Number, ValueShape::Text])),
            ])
        );
    }

    #[test]
    fn display_is_readable() {
        let shape = ValueShape::Object(
            ObjectShape::closed()
                .with_field("id", FieldShape::required(ValueShape::Number))
                .with_field("tags", FieldShape::optional(ValueShape::array(text_or_null()))),
        );
        assert_eq!(
            shape.to_string(),
            "object{id: number, tags?: array<null | text>}"
        );
        assert_eq!(ValueShape::open_object().to_string(), "object{..}");
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    #[test]
    fn merge_objects_requires_field_on_both_sides() {
        let left = ValueShape::record([("a", ValueShape::Number), ("b", ValueShape::Text)]);
        let right = ValueShape::record([("a", ValueShape::Number)]);
        let ValueShape::Object(merged) = left.merge(&right) else {
            panic!("expected object");
        };
        assert!(merged.fields["a"].required);
        assert!(!merged.fields["b"].required);
        assert!(merged.closed);
    }

    #[test]
    fn merge_objects_marks_disagreeing_origin_as_merged() {
        let left = ValueShape::Object(ObjectShape::closed().with_field(
            "a",
            FieldShape::required(ValueShape::Text).with_origin(Origin::Set),
        ));
        let right = ValueShape::Object(ObjectShape::closed().with_field(
            "a",
            FieldShape::required(ValueShape::Text).with_origin(Origin::Output),
        ));
        let ValueShape::Object(merged) = left.merge(&right) else {
            panic!("expected object");
        };
        assert_eq!(merged.fields["a"].origin, Some(Origin::Merged));
    }

    #[test]
    fn merge_open_with_closed_is_open() {
        let ValueShape::Object(merged) = ValueShape::open_object().merge(&ValueShape::Object(ObjectShape::closed()))
        else {
            panic!("expected object");
        };
        assert!(!merged.closed);
    }

    #[test]
    fn empty_array_widens_to_first_element() {
        let empty = ValueShape::array(ValueShape::Never);
        let appended = empty.merge(&ValueShape::array(ValueShape::Text));
        assert_eq!(appended, ValueShape::array(ValueShape::Text));
    }

    // -----------------------------------------------------------------------
    // Narrowing
    // -----------------------------------------------------------------------

    #[test]
    fn without_null_and_only_null() {
        assert_eq!(text_or_null().without_null(), ValueShape::Text);
        assert_eq!(text_or_null().only_null(), ValueShape::Null);
        assert_eq!(ValueShape::Text.only_null(), ValueShape::Never);
        assert_eq!(ValueShape::Unknown.without_null(), ValueShape::Unknown);
        assert_eq!(ValueShape::Unknown.only_null(), ValueShape::Null);
    }

    #[test]
    fn object_part_narrowing() {
        let shape = ValueShape::union([ValueShape::open_object(), ValueShape::Text]);
        assert_eq!(shape.object_part(), ValueShape::open_object());
        assert_eq!(shape.without_object(), ValueShape::Text);
        assert_eq!(ValueShape::Unknown.object_part(), ValueShape::open_object());
        assert_eq!(ValueShape::Number.object_part(), ValueShape::Never);
    }

    #[test]
    fn field_shape_reads_through_objects() {
        let shape = ValueShape::Object(
            ObjectShape::closed()
                .with_field("a", FieldShape::required(ValueShape::Number))
                .with_field("b", FieldShape::optional(ValueShape::Text)),
        );
        assert_eq!(shape.field_shape("a"), ValueShape::Number);
        assert_eq!(shape.field_shape("b"), text_or_null());
        assert_eq!(shape.field_shape("zzz"), ValueShape::Null);
        assert_eq!(ValueShape::open_object().field_shape("x"), ValueShape::Unknown);
    }

    #[test]
    fn element_shape_of_union_merges_containers() {
        let shape = ValueShape::union([
            ValueShape::array(ValueShape::Text),
            ValueShape::set(ValueShape::Number),
            ValueShape::Null,
        ]);
        assert_eq!(
            shape.element_shape(),
            ValueShape::union([ValueShape::Number, ValueShape::Text])
        );
        assert_eq!(ValueShape::Text.element_shape(), ValueShape::Never);
    }

    #[test]
    fn constrain_only_tightens_unknown() {
        assert_eq!(
            ValueShape::Unknown.constrain(&ValueShape::Number),
            ValueShape::Number
        );
        assert_eq!(
            ValueShape::Text.constrain(&ValueShape::Unknown),
            ValueShape::Text
        );
    }

    // -----------------------------------------------------------------------
    // Algebraic properties
    // -----------------------------------------------------------------------

    fn arb_shape() -> impl Strategy<Value = ValueShape> {
        let leaf = prop_oneof![
            Just(ValueShape::Never),
            Just(ValueShape::Unknown),
            Just(ValueShape::Null),
            Just(ValueShape::Boolean),
            Just(ValueShape::Number),
            Just(ValueShape::Bytes),
            Just(ValueShape::Text),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(ValueShape::array),
                inner.clone().prop_map(ValueShape::set),
                (
                    prop::collection::vec(("[a-c]", inner.clone(), any::<bool>()), 0..3),
                    any::<bool>()
                )
                    .prop_map(|(fields, closed)| {
                        let mut object = ObjectShape {
                            fields: IndexMap::new(),
                            closed,
                        };
                        for (name, shape, required) in fields {
                            object.fields.insert(
                                name,
                                FieldShape {
                                    shape,
                                    required,
                                    origin: None,
                                },
                            );
                        }
                        ValueShape::Object(object)
                    }),
                prop::collection::vec(inner, 0..4).prop_map(ValueShape::union),
            ]
        })
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in arb_shape(), b in arb_shape()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn merge_is_idempotent(a in arb_shape()) {
            prop_assert_eq!(a.merge(&a), a);
        }

        #[test]
        fn never_is_identity(a in arb_shape()) {
            prop_assert_eq!(ValueShape::Never.merge(&a), a.clone());
            prop_assert_eq!(a.merge(&ValueShape::Never), a);
        }

        #[test]
        fn unknown_absorbs(a in arb_shape()) {
            prop_assert_eq!(ValueShape::Unknown.merge(&a), ValueShape::Unknown);
        }

        #[test]
        fn union_never_nests(options in prop::collection::vec(arb_shape(), 0..5)) {
            if let ValueShape::Union(inner) = ValueShape::union(options) {
                prop_assert!(inner.len() >= 2);
                prop_assert!(inner.iter().all(|o| !matches!(o, ValueShape::Union(_) | ValueShape::Never | ValueShape::Unknown)));
            }
        }
    }
}
