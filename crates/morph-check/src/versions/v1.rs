//! The first schema generation: a flat map of top-level fields plus
//! "at least one of these fields" groups.

use indexmap::IndexMap;
use morph_core::{AccessPath, AccessSegment, Node, ValueShape};
use serde::{Deserialize, Serialize};

use super::v2::{
    ContractV2, GuaranteeSchemaV2, NodeKindV2, NodeV2, RequirementExprV2, RequirementSchemaV2,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldV1 {
    pub shape: ValueShape,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaV1 {
    pub fields: IndexMap<String, FieldV1>,
    /// Each group names top-level fields of which at least one must be
    /// present and non-null.
    #[serde(default)]
    pub required_any_of: Vec<Vec<String>>,
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractV1 {
    pub input: SchemaV1,
    pub output: SchemaV1,
}

fn fields_of(root: &NodeV2) -> (IndexMap<String, FieldV1>, bool) {
    match root.kind {
        NodeKindV2::Object => {
            let fields = root
                .children
                .iter()
                .map(|(name, child)| {
                    (
                        name.clone(),
                        FieldV1 {
                            shape: child.to_shape(),
                            required: child.required,
                        },
                    )
                })
                .collect();
            (fields, root.open)
        }
        _ => (IndexMap::new(), true),
    }
}

/// Top-level field names mentioned by a requirement expression.
fn group_of(expr: &RequirementExprV2, out: &mut Vec<String>) {
    match expr {
        RequirementExprV2::PathPresent { path } | RequirementExprV2::PathNonNull { path } => {
            if let Some(name) = path.top_level_field() {
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
        }
        RequirementExprV2::AnyOf { children } | RequirementExprV2::AllOf { children } => {
            for child in children {
                group_of(child, out);
            }
        }
    }
}

/// One group per top-level `AnyOf`; other expressions have no V1 form.
fn groups_of(exprs: &[RequirementExprV2]) -> Vec<Vec<String>> {
    exprs
        .iter()
        .filter(|r| matches!(r, RequirementExprV2::AnyOf { .. }))
        .map(|r| {
            let mut group = Vec::new();
            group_of(r, &mut group);
            group
        })
        .collect()
}

fn any_of_exprs(groups: &[Vec<String>]) -> Vec<RequirementExprV2> {
    groups
        .iter()
        .map(|group| RequirementExprV2::AnyOf {
            children: group
                .iter()
                .map(|name| RequirementExprV2::PathNonNull {
                    path: AccessPath::from_segments([AccessSegment::Field(name.clone())]),
                })
                .collect(),
        })
        .collect()
}

pub fn requirement_to_v1(schema: &RequirementSchemaV2) -> SchemaV1 {
    let (fields, open) = fields_of(&schema.root);
    SchemaV1 {
        fields,
        required_any_of: groups_of(&schema.requirements),
        open,
    }
}

pub fn guarantee_to_v1(schema: &GuaranteeSchemaV2) -> SchemaV1 {
    let (fields, open) = fields_of(&schema.root);
    SchemaV1 {
        fields,
        required_any_of: groups_of(&schema.guarantees),
        open,
    }
}

pub fn v2_to_v1(contract: &ContractV2) -> ContractV1 {
    ContractV1 {
        input: requirement_to_v1(&contract.input),
        output: guarantee_to_v1(&contract.output),
    }
}

fn root_from_fields(schema: &SchemaV1) -> NodeV2 {
    let mut root = super::v2::node_to_v2(&Node::object(schema.open));
    for (name, field) in &schema.fields {
        let child = super::v2::node_to_v2(&Node::from_shape(&field.shape, field.required));
        root.children.insert(name.clone(), child);
    }
    root
}

pub fn v1_to_v2(contract: &ContractV1) -> ContractV2 {
    ContractV2 {
        input: RequirementSchemaV2 {
            root: root_from_fields(&contract.input),
            requirements: any_of_exprs(&contract.input.required_any_of),
            opaque_regions: Vec::new(),
        },
        output: GuaranteeSchemaV2 {
            root: root_from_fields(&contract.output),
            guarantees: any_of_exprs(&contract.output.required_any_of),
            opaque_regions: Vec::new(),
            may_emit_null: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_groups_become_field_name_lists() {
        let schema = RequirementSchemaV2 {
            root: root_from_fields(&SchemaV1 {
                fields: IndexMap::from([(
                    "a".to_string(),
                    FieldV1 {
                        shape: ValueShape::Unknown,
                        required: false,
                    },
                )]),
                required_any_of: Vec::new(),
                open: true,
            }),
            requirements: vec![RequirementExprV2::AnyOf {
                children: vec![
                    RequirementExprV2::PathNonNull {
                        path: AccessPath::parse("a.inner").unwrap(),
                    },
                    RequirementExprV2::PathPresent {
                        path: AccessPath::fields(&["b"]),
                    },
                ],
            }],
            opaque_regions: Vec::new(),
        };
        let v1 = requirement_to_v1(&schema);
        assert_eq!(v1.required_any_of, vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(v1.open);
        assert!(!v1.fields["a"].required);
    }

    #[test]
    fn non_object_root_has_no_fields() {
        let schema = GuaranteeSchemaV2 {
            root: NodeV2::any(true),
            guarantees: Vec::new(),
            opaque_regions: Vec::new(),
            may_emit_null: true,
        };
        let v1 = guarantee_to_v1(&schema);
        assert!(v1.fields.is_empty());
        assert!(v1.open);
    }

    #[test]
    fn output_groups_survive_v2() {
        let v1 = ContractV1 {
            input: SchemaV1::default(),
            output: SchemaV1 {
                fields: IndexMap::new(),
                required_any_of: vec![vec!["a".to_string()], Vec::new()],
                open: true,
            },
        };
        let v2 = v1_to_v2(&v1);
        assert_eq!(v2.output.guarantees.len(), 2);
        assert_eq!(v2_to_v1(&v2).output.required_any_of, v1.output.required_any_of);
    }
}
