//! Core error types for morph-core.
//!
//! Uses `thiserror` for structured, matchable error variants. The data model
//! itself is infallible; errors only arise when parsing textual forms.

use thiserror::Error;

/// Core errors produced by the morph-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An access path string could not be parsed.
    #[error("invalid access path '{input}': {reason}")]
    InvalidPath { input: String, reason: String },
}
