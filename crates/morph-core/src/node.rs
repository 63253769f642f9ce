//! Schema tree nodes: the authoritative (V3) schema representation.
//!
//! A [`Node`] is the tree form of a [`ValueShape`] enriched with the things
//! validation and witness generation need: per-child presence (`required`),
//! openness of objects, value domains on scalars, and the provenance tag of
//! output fields.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::ValueDomain;
use crate::path::{AccessPath, AccessSegment};
use crate::shape::{FieldShape, ObjectShape, Origin, ValueShape};
use crate::value::Value;

/// Kind tag of a schema node. Mirrors the [`ValueShape`] constructors, with
/// `Any` standing in for `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Any,
    Never,
    Null,
    Boolean,
    Number,
    Bytes,
    Text,
    Object,
    Array,
    Set,
    Union,
}

impl NodeKind {
    /// Returns `true` if a runtime value's dynamic type satisfies this kind.
    ///
    /// `Union` never matches directly; callers match against its options.
    /// Sets also accept arrays, since most wire formats have no set type.
    pub fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (NodeKind::Any, _) => true,
            (NodeKind::Null, Value::Null) => true,
            (NodeKind::Boolean, Value::Bool(_)) => true,
            (NodeKind::Number, Value::Number(_)) => true,
            (NodeKind::Bytes, Value::Bytes(_)) => true,
            (NodeKind::Text, Value::Text(_)) => true,
            (NodeKind::Object, Value::Object(_)) => true,
            (NodeKind::Array, Value::Array(_)) => true,
            (NodeKind::Set, Value::Set(_) | Value::Array(_)) => true,
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Any => "any",
            NodeKind::Never => "never",
            NodeKind::Null => "null",
            NodeKind::Boolean => "boolean",
            NodeKind::Number => "number",
            NodeKind::Bytes => "bytes",
            NodeKind::Text => "text",
            NodeKind::Object => "object",
            NodeKind::Array => "array",
            NodeKind::Set => "set",
            NodeKind::Union => "union",
        }
    }
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Presence of this node within its parent object.
    pub required: bool,
    pub kind: NodeKind,
    /// For objects: whether keys beyond `children` are permitted.
    #[serde(default)]
    pub open: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<Node>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<ValueDomain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl Node {
    /// A required node of the given kind with nothing else set.
    pub fn new(kind: NodeKind) -> Self {
        Node {
            required: true,
            kind,
            open: false,
            children: IndexMap::new(),
            element: None,
            options: Vec::new(),
            domains: Vec::new(),
            origin: None,
        }
    }

    pub fn any() -> Self {
        Node::new(NodeKind::Any)
    }

    pub fn object(open: bool) -> Self {
        Node {
            open,
            ..Node::new(NodeKind::Object)
        }
    }

    pub fn array(element: Node) -> Self {
        Node {
            element: Some(Box::new(element)),
            ..Node::new(NodeKind::Array)
        }
    }

    pub fn set(element: Node) -> Self {
        Node {
            element: Some(Box::new(element)),
            ..Node::new(NodeKind::Set)
        }
    }

    pub fn union(options: Vec<Node>) -> Self {
        Node {
            options,
            ..Node::new(NodeKind::Union)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_child(mut self, name: &str, child: Node) -> Self {
        self.children.insert(name.to_string(), child);
        self
    }

    pub fn with_domain(mut self, domain: ValueDomain) -> Self {
        self.domains.push(domain);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Builds a node tree from a shape.
    pub fn from_shape(shape: &ValueShape, required: bool) -> Node {
        let mut node = match shape {
            ValueShape::Never => Node::new(NodeKind::Never),
            ValueShape::Unknown => Node::any(),
            ValueShape::Null => Node::new(NodeKind::Null),
            ValueShape::Boolean => Node::new(NodeKind::Boolean),
            ValueShape::Number => Node::new(NodeKind::Number),
            ValueShape::Bytes => Node::new(NodeKind::Bytes),
            ValueShape::Text => Node::new(NodeKind::Text),
            ValueShape::Array(elem) => Node::array(Node::from_shape(elem, true)),
            ValueShape::Set(elem) => Node::set(Node::from_shape(elem, true)),
            ValueShape::Object(object) => {
                let mut node = Node::object(!object.closed);
                for (name, field) in &object.fields {
                    let mut child = Node::from_shape(&field.shape, field.required);
                    child.origin = field.origin;
                    node.children.insert(name.clone(), child);
                }
                node
            }
            ValueShape::Union(options) => Node::union(
                options
                    .iter()
                    .map(|option| Node::from_shape(option, true))
                    .collect(),
            ),
        };
        node.required = required;
        node
    }

    /// Projects the tree back to a shape, dropping domains.
    pub fn to_shape(&self) -> ValueShape {
        match self.kind {
            NodeKind::Any => ValueShape::Unknown,
            NodeKind::Never => ValueShape::Never,
            NodeKind::Null => ValueShape::Null,
            NodeKind::Boolean => ValueShape::Boolean,
            NodeKind::Number => ValueShape::Number,
            NodeKind::Bytes => ValueShape::Bytes,
            NodeKind::Text => ValueShape::Text,
            NodeKind::Array => ValueShape::array(self.element_shape()),
            NodeKind::Set => ValueShape::set(self.element_shape()),
            NodeKind::Object => {
                let mut object = ObjectShape {
                    fields: IndexMap::new(),
                    closed: !self.open,
                };
                for (name, child) in &self.children {
                    object.fields.insert(
                        name.clone(),
                        FieldShape {
                            shape: child.to_shape(),
                            required: child.required,
                            origin: child.origin,
                        },
                    );
                }
                ValueShape::Object(object)
            }
            NodeKind::Union => ValueShape::union(self.options.iter().map(Node::to_shape)),
        }
    }

    fn element_shape(&self) -> ValueShape {
        self.element
            .as_ref()
            .map(|e| e.to_shape())
            .unwrap_or(ValueShape::Unknown)
    }

    /// Returns `true` if `null` is an acceptable value for this node.
    pub fn admits_null(&self) -> bool {
        match self.kind {
            NodeKind::Any | NodeKind::Null => true,
            NodeKind::Union => self.options.iter().any(Node::admits_null),
            _ => false,
        }
    }

    /// Returns `true` if the element node places no constraint on elements.
    pub fn element_unconstrained(&self) -> bool {
        match &self.element {
            None => true,
            Some(elem) => matches!(elem.kind, NodeKind::Any | NodeKind::Never),
        }
    }

    /// The option of a union (or the node itself) with the given kind.
    pub fn option_of_kind(&self, kind: NodeKind) -> Option<&Node> {
        if self.kind == kind {
            return Some(self);
        }
        if self.kind == NodeKind::Union {
            return self.options.iter().find_map(|o| o.option_of_kind(kind));
        }
        None
    }

    /// Follows `path` through children and element nodes.
    ///
    /// Union nodes are looked through to their object or container option.
    /// Returns `None` when the path leaves the described structure.
    pub fn node_at(&self, path: &AccessPath) -> Option<&Node> {
        let mut current = self;
        for segment in path.segments() {
            current = match segment {
                AccessSegment::Field(name) => {
                    let object = current.option_of_kind(NodeKind::Object)?;
                    object.children.get(name)?
                }
                AccessSegment::Index(_) | AccessSegment::Dynamic => {
                    let container = current
                        .option_of_kind(NodeKind::Array)
                        .or_else(|| current.option_of_kind(NodeKind::Set))?;
                    container.element.as_deref()?
                }
            };
        }
        Some(current)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Array | NodeKind::Set => match &self.element {
                Some(elem) => write!(f, "{}<{elem}>", self.kind.name()),
                None => write!(f, "{}<any>", self.kind.name()),
            },
            NodeKind::Union => {
                for (i, option) in self.options.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{option}")?;
                }
                Ok(())
            }
            kind => f.write_str(kind.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_and_back_preserves_structure() {
        let shape = ValueShape::Object(
            ObjectShape::closed()
                .with_field("id", FieldShape::required(ValueShape::Number))
                .with_field(
                    "tags",
                    FieldShape::optional(ValueShape::set(ValueShape::Text))
                        .with_origin(Origin::Append),
                ),
        );
        let node = Node::from_shape(&shape, true);
        assert_eq!(node.kind, NodeKind::Object);
        assert!(!node.open);
        assert!(node.children["id"].required);
        assert!(!node.children["tags"].required);
        assert_eq!(node.children["tags"].origin, Some(Origin::Append));
        assert_eq!(node.to_shape(), shape);
    }

    #[test]
    fn unknown_becomes_any() {
        let node = Node::from_shape(&ValueShape::Unknown, false);
        assert_eq!(node.kind, NodeKind::Any);
        assert!(!node.required);
        assert!(node.admits_null());
    }

    #[test]
    fn node_at_walks_children_and_elements() {
        let root = Node::object(true).with_child(
            "suites",
            Node::array(Node::object(true).with_child("name", Node::new(NodeKind::Text))),
        );
        let path = AccessPath::parse("$.suites[0].name").unwrap();
        assert_eq!(root.node_at(&path).map(|n| n.kind), Some(NodeKind::Text));
        let missing = AccessPath::parse("$.suites[0].other").unwrap();
        assert!(root.node_at(&missing).is_none());
    }

    #[test]
    fn node_at_looks_through_nullable_unions() {
        let root = Node::object(true).with_child(
            "meta",
            Node::union(vec![
                Node::new(NodeKind::Null),
                Node::object(true).with_child("v", Node::new(NodeKind::Number)),
            ]),
        );
        let path = AccessPath::parse("meta.v").unwrap();
        assert_eq!(root.node_at(&path).map(|n| n.kind), Some(NodeKind::Number));
    }

    #[test]
    fn set_kind_accepts_arrays() {
        assert!(NodeKind::Set.matches(&Value::Array(vec![])));
        assert!(!NodeKind::Array.matches(&Value::Set(vec![])));
    }

    #[test]
    fn display_describes_containers_and_unions() {
        let node = Node::union(vec![
            Node::new(NodeKind::Null),
            Node::array(Node::new(NodeKind::Text)),
        ]);
        assert_eq!(node.to_string(), "null | array<text>");
    }
}
