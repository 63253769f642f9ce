//! Error types for the contract engine.
//!
//! Almost everything here reports problems as data ([`Violation`]s,
//! diagnostics, `Unknown` shapes). The two exceptions are configuration
//! parsing and Strict enforcement.

use morph_core::SchemaSide;

use crate::validate::violation::{format_violations, Violation};

/// Malformed enforcement configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown enforcement mode '{value}': expected off, warn or strict")]
    UnknownEnforcementMode { value: String },

    #[error("invalid confidence threshold '{value}': expected a number in 0..=1")]
    InvalidConfidence { value: String },

    #[error("invalid boolean '{value}' for {key}")]
    InvalidFlag { key: String, value: String },
}

/// Raised by Strict enforcement when a value violates its contract.
///
/// Carries the full, deterministically sorted violation list, including
/// non-blocking warnings found alongside the blocking ones.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{side} contract violated:\n{}", format_violations(.violations))]
pub struct ContractViolationError {
    pub side: SchemaSide,
    pub violations: Vec<Violation>,
}

impl ContractViolationError {
    /// The violations that caused the rejection.
    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.kind.is_blocking())
    }
}
