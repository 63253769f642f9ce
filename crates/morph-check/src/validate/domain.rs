//! Value-domain checks.

use std::collections::HashMap;

use morph_core::{Value, ValueDomain};
use regex::Regex;

/// Result of checking one value against one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCheck {
    /// The domain does not constrain values of this dynamic type.
    NotApplicable,
    Pass,
    Fail,
}

/// Compiled patterns for the duration of one validation pass.
///
/// Invalid patterns are remembered as `None` and never fail a value: a broken
/// schema should not reject every input that reaches it.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl RegexCache {
    pub fn get(&mut self, pattern: &str) -> Option<&Regex> {
        self.compiled
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::debug!("ignoring invalid domain pattern /{pattern}/: {err}");
                    None
                }
            })
            .as_ref()
    }
}

/// Checks `value` against `domain`.
pub fn check_domain(domain: &ValueDomain, value: &Value, regexes: &mut RegexCache) -> DomainCheck {
    match (domain, value) {
        (ValueDomain::EnumText { values }, Value::Text(s)) => pass_if(values.iter().any(|v| v == s)),
        (
            ValueDomain::NumberRange {
                min,
                max,
                integer_only,
            },
            Value::Number(_),
        ) => {
            let Some(n) = value.as_f64() else {
                return DomainCheck::NotApplicable;
            };
            let in_range = min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi);
            pass_if(in_range && (!integer_only || value.is_integral()))
        }
        (ValueDomain::Regex { pattern }, Value::Text(s)) => match regexes.get(pattern) {
            Some(re) => pass_if(re.is_match(s)),
            None => DomainCheck::NotApplicable,
        },
        _ => DomainCheck::NotApplicable,
    }
}

fn pass_if(ok: bool) -> DomainCheck {
    if ok {
        DomainCheck::Pass
    } else {
        DomainCheck::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_text_accepts_listed_values_only() {
        let domain = ValueDomain::enum_text(&["error", "passing", "failing"]);
        let mut cache = RegexCache::default();
        for ok in ["error", "passing", "failing"] {
            assert_eq!(check_domain(&domain, &Value::text(ok), &mut cache), DomainCheck::Pass);
        }
        assert_eq!(
            check_domain(&domain, &Value::text("synthetic-status"), &mut cache),
            DomainCheck::Fail
        );
        assert_eq!(
            check_domain(&domain, &Value::int(1), &mut cache),
            DomainCheck::NotApplicable
        );
    }

    #[test]
    fn number_range_checks_bounds_and_integrality() {
        let domain = ValueDomain::NumberRange {
            min: Some(0.0),
            max: Some(10.0),
            integer_only: true,
        };
        let mut cache = RegexCache::default();
        assert_eq!(check_domain(&domain, &Value::int(10), &mut cache), DomainCheck::Pass);
        assert_eq!(check_domain(&domain, &Value::int(11), &mut cache), DomainCheck::Fail);
        assert_eq!(
            check_domain(&domain, &Value::from(json!(2.5)), &mut cache),
            DomainCheck::Fail
        );
    }

    #[test]
    fn regex_matches_text() {
        let domain = ValueDomain::regex("^[a-z]+-[0-9]+$");
        let mut cache = RegexCache::default();
        assert_eq!(check_domain(&domain, &Value::text("run-42"), &mut cache), DomainCheck::Pass);
        assert_eq!(check_domain(&domain, &Value::text("run"), &mut cache), DomainCheck::Fail);
    }

    #[test]
    fn invalid_pattern_is_not_applicable() {
        let domain = ValueDomain::regex("(unclosed");
        let mut cache = RegexCache::default();
        assert_eq!(
            check_domain(&domain, &Value::text("x"), &mut cache),
            DomainCheck::NotApplicable
        );
    }
}
