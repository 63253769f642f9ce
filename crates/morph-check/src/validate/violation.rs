//! Violation records and the human-readable report format.

use std::fmt;

use morph_core::AccessPath;
use serde::{Deserialize, Serialize};

/// Most violations listed in a report before the `+N more` suffix.
pub const REPORT_LIMIT: usize = 25;

/// What went wrong at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required node is absent.
    MissingRequiredPath,
    /// An obligation evaluated to false.
    MissingConditionalGroup,
    /// A closed object carries a key it does not declare.
    UnexpectedField,
    /// The runtime type (or a value domain) does not match the node.
    ShapeMismatch,
    /// `null` where the node does not admit it.
    NullabilityMismatch,
    /// The value reaches into a region excluded from deep validation.
    OpaqueRegionWarning,
}

impl ViolationKind {
    /// Returns `false` only for informational kinds that never reject a value.
    pub fn is_blocking(self) -> bool {
        !matches!(self, ViolationKind::OpaqueRegionWarning)
    }

    pub fn name(self) -> &'static str {
        match self {
            ViolationKind::MissingRequiredPath => "MISSING_REQUIRED_PATH",
            ViolationKind::MissingConditionalGroup => "MISSING_CONDITIONAL_GROUP",
            ViolationKind::UnexpectedField => "UNEXPECTED_FIELD",
            ViolationKind::ShapeMismatch => "SHAPE_MISMATCH",
            ViolationKind::NullabilityMismatch => "NULLABILITY_MISMATCH",
            ViolationKind::OpaqueRegionWarning => "OPAQUE_REGION_WARNING",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One finding of the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: AccessPath,
    /// Description of what the schema expects at `path`.
    pub expected: String,
    /// Description of what the value holds at `path`.
    pub actual: String,
    pub rule_id: String,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        path: AccessPath,
        expected: impl Into<String>,
        actual: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Violation {
            kind,
            path,
            expected: expected.into(),
            actual: actual.into(),
            rule_id: rule_id.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} (expected={}, actual={}) [rule={}]",
            self.kind, self.path, self.expected, self.actual, self.rule_id
        )
    }
}

/// Sorts by `(path, kind, rule_id)` so reports are stable across runs.
pub fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}

/// One line per violation, capped at [`REPORT_LIMIT`] with a `+N more` line.
pub fn format_violations(violations: &[Violation]) -> String {
    let mut lines: Vec<String> = violations
        .iter()
        .take(REPORT_LIMIT)
        .map(Violation::to_string)
        .collect();
    if violations.len() > REPORT_LIMIT {
        lines.push(format!("+{} more", violations.len() - REPORT_LIMIT));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(name: &str) -> Violation {
        Violation::new(
            ViolationKind::MissingRequiredPath,
            AccessPath::fields(&[name]),
            "text",
            "absent",
            "required-path",
        )
    }

    #[test]
    fn line_format() {
        assert_eq!(
            missing("id").to_string(),
            "MISSING_REQUIRED_PATH at $.id (expected=text, actual=absent) [rule=required-path]"
        );
    }

    #[test]
    fn report_is_capped() {
        let violations: Vec<Violation> = (0..30).map(|i| missing(&format!("f{i}"))).collect();
        let report = format_violations(&violations);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), REPORT_LIMIT + 1);
        assert_eq!(lines.last(), Some(&"+5 more"));
    }

    #[test]
    fn sort_orders_by_path_then_kind() {
        let mut violations = vec![
            missing("b"),
            Violation::new(
                ViolationKind::UnexpectedField,
                AccessPath::fields(&["a"]),
                "absent",
                "number",
                "closed-object",
            ),
            missing("a"),
        ];
        sort_violations(&mut violations);
        assert_eq!(violations[0].kind, ViolationKind::MissingRequiredPath);
        assert_eq!(violations[0].path, AccessPath::fields(&["a"]));
        assert_eq!(violations[1].kind, ViolationKind::UnexpectedField);
        assert_eq!(violations[2].path, AccessPath::fields(&["b"]));
    }

    #[test]
    fn opaque_warnings_never_block() {
        assert!(!ViolationKind::OpaqueRegionWarning.is_blocking());
        assert!(ViolationKind::ShapeMismatch.is_blocking());
    }
}
