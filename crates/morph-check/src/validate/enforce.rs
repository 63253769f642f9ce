//! Mode-gated enforcement at the transform boundary.

use morph_core::{Contract, SchemaSide, SchemaView, Value};

use super::validate;
use super::violation::{format_violations, Violation};
use crate::config::{EnforcementConfig, EnforcementMode, ValidationOptions};
use crate::error::ContractViolationError;

/// Validates `value` and acts on the result according to `mode`.
///
/// - `Off` skips validation and returns nothing.
/// - `Warn` logs and returns every violation.
/// - `Strict` fails with the full list if any violation is blocking;
///   otherwise it returns the (informational) violations like `Warn`.
pub fn enforce<S: SchemaView + ?Sized>(
    mode: EnforcementMode,
    side: SchemaSide,
    schema: &S,
    value: &Value,
    options: &ValidationOptions,
) -> Result<Vec<Violation>, ContractViolationError> {
    if mode == EnforcementMode::Off {
        return Ok(Vec::new());
    }

    let violations = validate(schema, value, options);
    if violations.is_empty() {
        return Ok(violations);
    }

    let blocking = violations.iter().filter(|v| v.kind.is_blocking()).count();
    if blocking == 0 {
        tracing::info!(
            side = %side,
            "{} opaque region(s) left unchecked",
            violations.len()
        );
        return Ok(violations);
    }

    match mode {
        EnforcementMode::Strict => Err(ContractViolationError { side, violations }),
        _ => {
            tracing::warn!(
                side = %side,
                blocking,
                "contract violated:\n{}",
                format_violations(&violations)
            );
            Ok(violations)
        }
    }
}

/// Enforces the input side of `contract`.
pub fn enforce_input(
    config: &EnforcementConfig,
    contract: &Contract,
    value: &Value,
) -> Result<Vec<Violation>, ContractViolationError> {
    enforce(
        config.mode,
        SchemaSide::Input,
        &contract.input,
        value,
        &config.options,
    )
}

/// Enforces the output side of `contract`.
pub fn enforce_output(
    config: &EnforcementConfig,
    contract: &Contract,
    value: &Value,
) -> Result<Vec<Violation>, ContractViolationError> {
    enforce(
        config.mode,
        SchemaSide::Output,
        &contract.output,
        value,
        &config.options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::violation::ViolationKind;
    use morph_core::{
        AccessPath, AccessSegment, Node, NodeKind, OpaqueReason, OpaqueRegion, RequirementSchema,
    };
    use serde_json::json;

    fn schema() -> RequirementSchema {
        RequirementSchema {
            root: Node::object(true).with_child("id", Node::new(NodeKind::Number)),
            obligations: vec![],
            opaque_regions: vec![OpaqueRegion::new(
                AccessPath::fields(&["bag"]).child(AccessSegment::Dynamic),
                OpaqueReason::Key,
            )],
        }
    }

    #[test]
    fn off_returns_nothing() {
        let result = enforce(
            EnforcementMode::Off,
            SchemaSide::Input,
            &schema(),
            &Value::from(json!({})),
            &ValidationOptions::default(),
        );
        assert_eq!(result, Ok(vec![]));
    }

    #[test]
    fn warn_returns_violations_unthrown() {
        let result = enforce(
            EnforcementMode::Warn,
            SchemaSide::Input,
            &schema(),
            &Value::from(json!({})),
            &ValidationOptions::default(),
        );
        let violations = result.unwrap();
        let kinds: Vec<ViolationKind> = violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ViolationKind::OpaqueRegionWarning, ViolationKind::MissingRequiredPath]
        );
        assert_eq!(violations[0].actual, "absent");
    }

    #[test]
    fn strict_rejects_blocking_violations() {
        let err = enforce(
            EnforcementMode::Strict,
            SchemaSide::Input,
            &schema(),
            &Value::from(json!({"id": "x"})),
            &ValidationOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.side, SchemaSide::Input);
        assert_eq!(err.blocking().count(), 1);
        let message = err.to_string();
        assert!(message.starts_with("input contract violated:\n"));
        assert!(message.contains("SHAPE_MISMATCH at $.id"));
    }

    #[test]
    fn strict_lets_opaque_warnings_through() {
        let result = enforce(
            EnforcementMode::Strict,
            SchemaSide::Input,
            &schema(),
            &Value::from(json!({"id": 1, "bag": {"k": true}})),
            &ValidationOptions::default(),
        );
        let violations = result.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::OpaqueRegionWarning);
    }
}
