//! The second schema generation: kind-tagged nodes with a nullable flag and
//! path-only requirement expressions.
//!
//! Compared with the current model, V2 has no general unions (a node is one
//! kind plus `nullable`), no value domains, and no element-wise or counting
//! obligations.

use indexmap::IndexMap;
use morph_core::{
    AccessPath, Contract, ContractMetadata, ContractSource, GuaranteeSchema, Node, NodeKind,
    Obligation, ObligationExpr, OpaqueRegion, Origin, RequirementSchema, ValueShape,
};
use serde::{Deserialize, Serialize};

/// Rule id given to path expressions read back from V2.
pub const RULE_FROM_V2: &str = "v2-requirement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindV2 {
    Any,
    Object,
    Array,
    Set,
    Scalar,
}

/// One V2 node. Requirement and guarantee trees share the layout; only
/// guarantees carry an origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeV2 {
    pub kind: NodeKindV2,
    /// For scalars: the scalar shape (possibly a union of scalars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ValueShape>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, NodeV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<NodeV2>>,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub nullable: bool,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

pub type RequirementNodeV2 = NodeV2;
pub type GuaranteeNodeV2 = NodeV2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequirementExprV2 {
    AllOf { children: Vec<RequirementExprV2> },
    AnyOf { children: Vec<RequirementExprV2> },
    PathPresent { path: AccessPath },
    PathNonNull { path: AccessPath },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSchemaV2 {
    pub root: RequirementNodeV2,
    #[serde(default)]
    pub requirements: Vec<RequirementExprV2>,
    #[serde(default)]
    pub opaque_regions: Vec<OpaqueRegion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeSchemaV2 {
    pub root: GuaranteeNodeV2,
    /// Path guarantees, in the same expression language as requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guarantees: Vec<RequirementExprV2>,
    #[serde(default)]
    pub opaque_regions: Vec<OpaqueRegion>,
    #[serde(default)]
    pub may_emit_null: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractV2 {
    pub input: RequirementSchemaV2,
    pub output: GuaranteeSchemaV2,
}

impl NodeV2 {
    fn new(kind: NodeKindV2, required: bool) -> Self {
        NodeV2 {
            kind,
            shape: None,
            children: IndexMap::new(),
            element: None,
            open: false,
            nullable: false,
            required,
            origin: None,
        }
    }

    pub fn any(required: bool) -> Self {
        NodeV2 {
            nullable: true,
            ..NodeV2::new(NodeKindV2::Any, required)
        }
    }

    pub fn scalar(shape: ValueShape, required: bool) -> Self {
        NodeV2 {
            nullable: shape.admits_null(),
            shape: Some(shape),
            ..NodeV2::new(NodeKindV2::Scalar, required)
        }
    }

    /// Merges two alternatives of the same position.
    ///
    /// Nodes of different kinds merge to `Any` carrying whatever children and
    /// element either side had; see [`NodeV2::promote`].
    pub fn merge(&self, other: &NodeV2) -> NodeV2 {
        let mut merged = if self.kind == other.kind {
            let mut merged = self.clone();
            if self.kind == NodeKindV2::Scalar {
                merged.shape = match (&self.shape, &other.shape) {
                    (Some(a), Some(b)) => Some(a.merge(b)),
                    (a, b) => a.clone().or_else(|| b.clone()),
                };
            }
            merged
        } else {
            NodeV2::new(NodeKindV2::Any, self.required)
        };

        merged.children = merge_children(&self.children, &other.children);
        merged.element = match (&self.element, &other.element) {
            (Some(a), Some(b)) => Some(Box::new(a.merge(b))),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        merged.open = self.open || other.open;
        merged.nullable = self.nullable || other.nullable || merged.kind == NodeKindV2::Any;
        merged.required = self.required && other.required;
        merged.origin = if self.origin == other.origin {
            self.origin
        } else {
            Some(Origin::Merged)
        };
        merged.promote()
    }

    /// An `Any` node that acquired children becomes an open object, so
    /// consumers switching on `kind` do not drop the children.
    pub fn promote(mut self) -> NodeV2 {
        if self.kind == NodeKindV2::Any && !self.children.is_empty() {
            self.kind = NodeKindV2::Object;
            self.open = true;
        }
        self
    }

    /// The shape this node describes.
    pub fn to_shape(&self) -> ValueShape {
        let shape = match self.kind {
            NodeKindV2::Any => return ValueShape::Unknown,
            NodeKindV2::Scalar => self.shape.clone().unwrap_or(ValueShape::Unknown),
            NodeKindV2::Object => {
                let mut object = morph_core::ObjectShape {
                    fields: IndexMap::new(),
                    closed: !self.open,
                };
                for (name, child) in &self.children {
                    object.fields.insert(
                        name.clone(),
                        morph_core::FieldShape {
                            shape: child.to_shape(),
                            required: child.required,
                            origin: child.origin,
                        },
                    );
                }
                ValueShape::Object(object)
            }
            NodeKindV2::Array => ValueShape::array(self.element_shape()),
            NodeKindV2::Set => ValueShape::set(self.element_shape()),
        };
        if self.nullable {
            shape.nullable()
        } else {
            shape
        }
    }

    fn element_shape(&self) -> ValueShape {
        self.element
            .as_ref()
            .map(|e| e.to_shape())
            .unwrap_or(ValueShape::Unknown)
    }
}

fn merge_children(
    a: &IndexMap<String, NodeV2>,
    b: &IndexMap<String, NodeV2>,
) -> IndexMap<String, NodeV2> {
    let mut children = IndexMap::new();
    for (name, child) in a {
        let merged = match b.get(name) {
            Some(theirs) => child.merge(theirs),
            None => NodeV2 {
                required: false,
                ..child.clone()
            },
        };
        children.insert(name.clone(), merged);
    }
    for (name, child) in b {
        if !a.contains_key(name) {
            children.insert(
                name.clone(),
                NodeV2 {
                    required: false,
                    ..child.clone()
                },
            );
        }
    }
    children
}

// ---------------------------------------------------------------------------
// Current model -> V2
// ---------------------------------------------------------------------------

/// Converts a current-model node. Unions fold into one node; domains are lost.
pub fn node_to_v2(node: &Node) -> NodeV2 {
    let mut out = match node.kind {
        NodeKind::Any => NodeV2::any(node.required),
        NodeKind::Never => NodeV2::scalar(ValueShape::Never, node.required),
        NodeKind::Null => NodeV2::scalar(ValueShape::Null, node.required),
        NodeKind::Boolean => NodeV2::scalar(ValueShape::Boolean, node.required),
        NodeKind::Number => NodeV2::scalar(ValueShape::Number, node.required),
        NodeKind::Bytes => NodeV2::scalar(ValueShape::Bytes, node.required),
        NodeKind::Text => NodeV2::scalar(ValueShape::Text, node.required),
        NodeKind::Object => {
            let mut out = NodeV2::new(NodeKindV2::Object, node.required);
            out.open = node.open;
            for (name, child) in &node.children {
                out.children.insert(name.clone(), node_to_v2(child));
            }
            out
        }
        NodeKind::Array | NodeKind::Set => {
            let kind = if node.kind == NodeKind::Array {
                NodeKindV2::Array
            } else {
                NodeKindV2::Set
            };
            let mut out = NodeV2::new(kind, node.required);
            out.element = node.element.as_deref().map(|e| Box::new(node_to_v2(e)));
            out
        }
        NodeKind::Union => {
            let has_null = node.options.iter().any(|o| o.kind == NodeKind::Null);
            let mut folded: Option<NodeV2> = None;
            for option in node.options.iter().filter(|o| o.kind != NodeKind::Null) {
                let converted = node_to_v2(option);
                folded = Some(match folded {
                    Some(acc) => acc.merge(&converted),
                    None => converted,
                });
            }
            let mut out = folded.unwrap_or_else(|| NodeV2::scalar(ValueShape::Null, true));
            out.nullable |= has_null;
            out.required = node.required;
            out
        }
    };
    out.origin = node.origin;
    out
}

/// Converts an obligation expression; element-wise, counting and domain
/// obligations have no V2 form and yield `None`.
pub fn expr_to_v2(expr: &ObligationExpr) -> Option<RequirementExprV2> {
    match expr {
        ObligationExpr::PathPresent { path } => {
            Some(RequirementExprV2::PathPresent { path: path.clone() })
        }
        ObligationExpr::PathNonNull { path } => {
            Some(RequirementExprV2::PathNonNull { path: path.clone() })
        }
        ObligationExpr::OneOf { children } => Some(RequirementExprV2::AnyOf {
            children: children.iter().filter_map(expr_to_v2).collect(),
        }),
        ObligationExpr::AllOf { children } => {
            let children: Vec<_> = children.iter().filter_map(expr_to_v2).collect();
            (!children.is_empty()).then_some(RequirementExprV2::AllOf { children })
        }
        ObligationExpr::ForAll { .. }
        | ObligationExpr::Exists { .. }
        | ObligationExpr::ValueDomain { .. } => None,
    }
}

fn exprs_to_v2(obligations: &[Obligation]) -> Vec<RequirementExprV2> {
    obligations
        .iter()
        .filter_map(|o| expr_to_v2(&o.expr))
        .collect()
}

pub fn requirement_to_v2(schema: &RequirementSchema) -> RequirementSchemaV2 {
    RequirementSchemaV2 {
        root: node_to_v2(&schema.root),
        requirements: exprs_to_v2(&schema.obligations),
        opaque_regions: schema.opaque_regions.clone(),
    }
}

pub fn guarantee_to_v2(schema: &GuaranteeSchema) -> GuaranteeSchemaV2 {
    GuaranteeSchemaV2 {
        root: node_to_v2(&schema.root),
        guarantees: exprs_to_v2(&schema.obligations),
        opaque_regions: schema.opaque_regions.clone(),
        may_emit_null: schema.may_emit_null,
    }
}

pub fn to_v2(contract: &Contract) -> ContractV2 {
    ContractV2 {
        input: requirement_to_v2(&contract.input),
        output: guarantee_to_v2(&contract.output),
    }
}

// ---------------------------------------------------------------------------
// V2 -> current model
// ---------------------------------------------------------------------------

pub fn node_from_v2(node: &NodeV2) -> Node {
    let mut out = match node.kind {
        NodeKindV2::Any => Node::any(),
        NodeKindV2::Scalar => {
            Node::from_shape(node.shape.as_ref().unwrap_or(&ValueShape::Unknown), true)
        }
        NodeKindV2::Object => {
            let mut out = Node::object(node.open);
            for (name, child) in &node.children {
                out.children.insert(name.clone(), node_from_v2(child));
            }
            out
        }
        NodeKindV2::Array | NodeKindV2::Set => {
            let element = node
                .element
                .as_deref()
                .map(node_from_v2)
                .unwrap_or_else(Node::any);
            if node.kind == NodeKindV2::Array {
                Node::array(element)
            } else {
                Node::set(element)
            }
        }
    };
    if node.nullable && !out.admits_null() {
        out = Node::union(vec![Node::new(NodeKind::Null), out]);
    }
    out.required = node.required;
    out.origin = node.origin;
    out
}

pub fn expr_from_v2(expr: &RequirementExprV2) -> ObligationExpr {
    match expr {
        RequirementExprV2::PathPresent { path } => ObligationExpr::present(path.clone()),
        RequirementExprV2::PathNonNull { path } => ObligationExpr::non_null(path.clone()),
        RequirementExprV2::AnyOf { children } => ObligationExpr::OneOf {
            children: children.iter().map(expr_from_v2).collect(),
        },
        RequirementExprV2::AllOf { children } => ObligationExpr::AllOf {
            children: children.iter().map(expr_from_v2).collect(),
        },
    }
}

fn obligations_from_v2(exprs: &[RequirementExprV2]) -> Vec<Obligation> {
    exprs
        .iter()
        .map(|r| Obligation::certain(expr_from_v2(r), RULE_FROM_V2))
        .collect()
}

pub fn from_v2(contract: &ContractV2) -> Contract {
    Contract {
        input: RequirementSchema {
            root: node_from_v2(&contract.input.root),
            obligations: obligations_from_v2(&contract.input.requirements),
            opaque_regions: contract.input.opaque_regions.clone(),
        },
        output: GuaranteeSchema {
            root: node_from_v2(&contract.output.root),
            obligations: obligations_from_v2(&contract.output.guarantees),
            opaque_regions: contract.output.opaque_regions.clone(),
            may_emit_null: contract.output.may_emit_null,
        },
        source: ContractSource::Explicit,
        metadata: ContractMetadata::default(),
    }
}
