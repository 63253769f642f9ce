//! Satisfiability checking: does a contract admit any value at all?

use morph_core::{Contract, SchemaSide, SchemaView};
use serde::{Deserialize, Serialize};

use super::generate;
use crate::config::ValidationOptions;
use crate::validate::validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatisfiabilityReport {
    pub satisfiable: bool,
    /// One line per residual violation, prefixed with the schema side.
    pub diagnostics: Vec<String>,
}

/// Generates a witness for each side of `contract` and validates it back
/// against the same side with every obligation enabled.
///
/// Blocking violations on a generated witness mean the schema contradicts
/// itself. Opaque-region warnings are informational and not reported.
pub fn check(contract: &Contract) -> SatisfiabilityReport {
    let mut diagnostics = Vec::new();
    check_side(&contract.input, SchemaSide::Input, &mut diagnostics);
    check_side(&contract.output, SchemaSide::Output, &mut diagnostics);

    if !diagnostics.is_empty() {
        tracing::debug!(
            transform = %contract.metadata.transform,
            count = diagnostics.len(),
            "contract is not satisfiable"
        );
    }
    SatisfiabilityReport {
        satisfiable: diagnostics.is_empty(),
        diagnostics,
    }
}

fn check_side<S: SchemaView + ?Sized>(schema: &S, side: SchemaSide, out: &mut Vec<String>) {
    let witness = generate(schema);
    let violations = validate(schema, &witness, &ValidationOptions::maximal());
    out.extend(
        violations
            .iter()
            .filter(|v| v.kind.is_blocking())
            .map(|v| format!("{side}: {v}")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::{
        AccessPath, ContractMetadata, ContractSource, GuaranteeSchema, Node, NodeKind, Obligation,
        ObligationExpr, RequirementSchema, ValueDomain,
    };

    fn contract(input: RequirementSchema, output: GuaranteeSchema) -> Contract {
        Contract {
            input,
            output,
            source: ContractSource::Inferred,
            metadata: ContractMetadata::default(),
        }
    }

    #[test]
    fn permissive_contract_is_satisfiable() {
        let report = check(&contract(RequirementSchema::permissive(), GuaranteeSchema::permissive()));
        assert!(report.satisfiable);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn closed_object_with_required_path_outside_it_is_not() {
        let input = RequirementSchema {
            root: Node::object(false).with_child("a", Node::new(NodeKind::Text)),
            obligations: vec![Obligation::certain(
                ObligationExpr::non_null(AccessPath::fields(&["b"])),
                "test",
            )],
            opaque_regions: Vec::new(),
        };
        let report = check(&contract(input, GuaranteeSchema::permissive()));
        assert!(!report.satisfiable);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].starts_with("input: "));
        assert!(report.diagnostics[0].contains("UNEXPECTED_FIELD"));
    }

    #[test]
    fn conflicting_domains_are_reported_on_the_output_side() {
        let output = GuaranteeSchema {
            root: Node::object(false).with_child(
                "status",
                Node::new(NodeKind::Text)
                    .with_domain(ValueDomain::enum_text(&["a"]))
                    .with_domain(ValueDomain::enum_text(&["b"])),
            ),
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
            may_emit_null: false,
        };
        let report = check(&contract(RequirementSchema::permissive(), output));
        assert!(!report.satisfiable);
        assert!(report.diagnostics.iter().all(|d| d.starts_with("output: ")));
    }
}
