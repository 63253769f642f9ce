//! Translation to and from older schema generations.
//!
//! Conversions go through the neighbouring generation: current <-> V2 <-> V1.
//! Each step downwards loses detail (unions, domains, element-wise
//! obligations, then everything below the top level); upwards is total.

pub mod v1;
pub mod v2;

use morph_core::Contract;

pub use v1::{ContractV1, FieldV1, SchemaV1};
pub use v2::{
    from_v2, to_v2, ContractV2, GuaranteeNodeV2, GuaranteeSchemaV2, NodeKindV2, NodeV2,
    RequirementExprV2, RequirementNodeV2, RequirementSchemaV2,
};

pub fn to_v1(contract: &Contract) -> ContractV1 {
    v1::v2_to_v1(&to_v2(contract))
}

pub fn from_v1(contract: &ContractV1) -> Contract {
    from_v2(&v1::v1_to_v2(contract))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use morph_core::{ObligationExpr, ValueShape};
    use proptest::prelude::*;

    fn field(shape: ValueShape, required: bool) -> FieldV1 {
        FieldV1 { shape, required }
    }

    #[test]
    fn from_v1_builds_one_of_obligations() {
        let v1 = ContractV1 {
            input: SchemaV1 {
                fields: IndexMap::from([
                    ("x".to_string(), field(ValueShape::Unknown, false)),
                    ("y".to_string(), field(ValueShape::Text, false)),
                ]),
                required_any_of: vec![vec!["x".into(), "y".into()]],
                open: true,
            },
            output: SchemaV1::default(),
        };
        let contract = from_v1(&v1);
        assert_eq!(contract.input.obligations.len(), 1);
        assert!(matches!(
            &contract.input.obligations[0].expr,
            ObligationExpr::OneOf { children } if children.len() == 2
        ));
        assert!(contract.input.root.open);
        assert_eq!(to_v1(&contract), v1);
    }

    #[test]
    fn output_groups_become_output_obligations() {
        let v1 = ContractV1 {
            input: SchemaV1::default(),
            output: SchemaV1 {
                fields: IndexMap::from([("a".to_string(), field(ValueShape::Text, false))]),
                required_any_of: vec![vec!["a".into()]],
                open: false,
            },
        };
        let contract = from_v1(&v1);
        assert!(contract.input.obligations.is_empty());
        assert_eq!(contract.output.obligations.len(), 1);
        assert_eq!(to_v1(&contract).output.required_any_of.len(), 1);
    }

    fn arb_scalar() -> impl Strategy<Value = ValueShape> {
        prop_oneof![
            Just(ValueShape::Unknown),
            Just(ValueShape::Text),
            Just(ValueShape::Number),
            Just(ValueShape::Boolean),
            Just(ValueShape::array(ValueShape::Text)),
        ]
    }

    fn arb_schema() -> impl Strategy<Value = SchemaV1> {
        (
            proptest::collection::vec(("[a-z]{1,6}", arb_scalar(), any::<bool>()), 0..6),
            proptest::collection::vec(proptest::collection::vec("[a-z]{1,6}", 0..3), 0..3),
            any::<bool>(),
        )
            .prop_map(|(fields, groups, open)| SchemaV1 {
                fields: fields
                    .into_iter()
                    .map(|(name, shape, required)| (name, field(shape, required)))
                    .collect(),
                required_any_of: groups,
                open,
            })
    }

    proptest! {
        #[test]
        fn v1_round_trip_keeps_names_and_group_count(
            input in arb_schema(),
            output in arb_schema(),
        ) {
            let v1 = ContractV1 { input, output };
            let back = to_v1(&from_v1(&v1));
            let keys = |s: &SchemaV1| s.fields.keys().cloned().collect::<Vec<_>>();
            prop_assert_eq!(keys(&back.input), keys(&v1.input));
            prop_assert_eq!(keys(&back.output), keys(&v1.output));
            prop_assert_eq!(back.input.required_any_of.len(), v1.input.required_any_of.len());
            prop_assert_eq!(back.output.required_any_of.len(), v1.output.required_any_of.len());
        }
    }
}
