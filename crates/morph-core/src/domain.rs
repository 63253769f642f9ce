//! Value domains: refinements on scalar node kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A refinement on the values a scalar node may take.
///
/// Domains are checked independently of structure and only against values of
/// the matching dynamic type: an `EnumText` domain says nothing about a
/// number sitting at the same position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Text restricted to one of the listed values.
    EnumText { values: Vec<String> },
    /// Inclusive numeric bounds, optionally integer-only.
    NumberRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default)]
        integer_only: bool,
    },
    /// Text matching a regular expression.
    Regex { pattern: String },
}

impl ValueDomain {
    pub fn enum_text<S: AsRef<str>>(values: &[S]) -> Self {
        ValueDomain::EnumText {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        ValueDomain::NumberRange {
            min,
            max,
            integer_only: false,
        }
    }

    pub fn regex(pattern: &str) -> Self {
        ValueDomain::Regex {
            pattern: pattern.to_string(),
        }
    }

    /// Stable rule identifier suffix used in violation reports.
    pub fn rule_name(&self) -> &'static str {
        match self {
            ValueDomain::EnumText { .. } => "enum-text",
            ValueDomain::NumberRange { .. } => "number-range",
            ValueDomain::Regex { .. } => "regex",
        }
    }
}

impl fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDomain::EnumText { values } => {
                let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
                write!(f, "enum[{}]", quoted.join(", "))
            }
            ValueDomain::NumberRange {
                min,
                max,
                integer_only,
            } => {
                let kind = if *integer_only { "int" } else { "number" };
                let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".into());
                let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "+inf".into());
                write!(f, "{kind}[{lo}..{hi}]")
            }
            ValueDomain::Regex { pattern } => write!(f, "/{pattern}/"),
        }
    }
}
