//! Obligation evaluation against a concrete root value.

use indexmap::IndexMap;
use morph_core::{AccessPath, AccessSegment, ObligationExpr, Value, ValueDomain};

use super::domain::{check_domain, DomainCheck, RegexCache};

/// Resolves `path` through `root`. Absent intermediate containers, out of
/// range indexes and dynamic segments all resolve to `None`.
pub fn resolve<'v>(root: &'v Value, path: &AccessPath) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match segment {
            AccessSegment::Field(name) => current.get(name)?,
            AccessSegment::Index(i) => {
                let index = usize::try_from(*i).ok()?;
                current.as_elements()?.get(index)?
            }
            AccessSegment::Dynamic => return None,
        };
    }
    Some(current)
}

/// Describes what sits at `path` for violation reports.
pub fn describe_at(root: &Value, path: &AccessPath) -> String {
    match resolve(root, path) {
        Some(value) => value.type_name().to_string(),
        None => "absent".to_string(),
    }
}

/// Evaluates an obligation tree to a boolean.
pub fn holds(expr: &ObligationExpr, root: &Value, regexes: &mut RegexCache) -> bool {
    match expr {
        ObligationExpr::PathPresent { path } => resolve(root, path).is_some(),
        ObligationExpr::PathNonNull { path } => resolve(root, path).is_some_and(|v| !v.is_null()),
        ObligationExpr::OneOf { children } => children.iter().any(|c| holds(c, root, regexes)),
        ObligationExpr::AllOf { children } => children.iter().all(|c| holds(c, root, regexes)),
        ObligationExpr::ForAll {
            path,
            required_fields,
            field_domains,
            require_any_of,
        } => failing_elements(
            root,
            path,
            required_fields,
            field_domains,
            require_any_of,
            regexes,
        )
        .is_empty(),
        ObligationExpr::Exists { path, min_count } => resolve(root, path)
            .and_then(Value::as_elements)
            .is_some_and(|items| items.len() >= *min_count),
        ObligationExpr::ValueDomain { path, domain } => match resolve(root, path) {
            None | Some(Value::Null) => true,
            Some(value) => check_domain(domain, value, regexes) != DomainCheck::Fail,
        },
    }
}

/// Indexes of the elements at `path` that fail the per-element constraints.
///
/// An absent or null container has no failing elements. A present value that
/// is not a container is left to the structural check.
pub fn failing_elements(
    root: &Value,
    path: &AccessPath,
    required_fields: &[String],
    field_domains: &IndexMap<String, Vec<ValueDomain>>,
    require_any_of: &[Vec<String>],
    regexes: &mut RegexCache,
) -> Vec<usize> {
    let Some(items) = resolve(root, path).and_then(Value::as_elements) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| {
            !element_satisfies(item, required_fields, field_domains, require_any_of, regexes)
        })
        .map(|(i, _)| i)
        .collect()
}

fn element_satisfies(
    item: &Value,
    required_fields: &[String],
    field_domains: &IndexMap<String, Vec<ValueDomain>>,
    require_any_of: &[Vec<String>],
    regexes: &mut RegexCache,
) -> bool {
    let constrains_fields =
        !required_fields.is_empty() || !field_domains.is_empty() || !require_any_of.is_empty();
    let Some(fields) = item.as_object() else {
        return !constrains_fields;
    };

    if !required_fields.iter().all(|f| fields.contains_key(f)) {
        return false;
    }

    for (field, domains) in field_domains {
        let Some(value) = fields.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        if domains
            .iter()
            .any(|d| check_domain(d, value, regexes) == DomainCheck::Fail)
        {
            return false;
        }
    }

    require_any_of.iter().all(|group| {
        group
            .iter()
            .any(|f| fields.get(f).is_some_and(|v| !v.is_null()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(text: &str) -> AccessPath {
        AccessPath::parse(text).unwrap()
    }

    #[test]
    fn resolve_tolerates_missing_containers() {
        let root = Value::from(json!({"a": {"b": [10, 20]}}));
        assert_eq!(resolve(&root, &path("a.b[1]")), Some(&Value::int(20)));
        assert!(resolve(&root, &path("a.c.d")).is_none());
        assert!(resolve(&root, &path("a.b[5]")).is_none());
        assert!(resolve(&root, &path("a.b[*]")).is_none());
    }

    #[test]
    fn one_of_non_null() {
        let expr = ObligationExpr::OneOf {
            children: vec![
                ObligationExpr::non_null(path("testsuites")),
                ObligationExpr::non_null(path("testsuite")),
            ],
        };
        let mut cache = RegexCache::default();
        assert!(!holds(&expr, &Value::from(json!({})), &mut cache));
        assert!(!holds(&expr, &Value::from(json!({"testsuites": null})), &mut cache));
        assert!(holds(&expr, &Value::from(json!({"testsuite": {}})), &mut cache));
    }

    #[test]
    fn for_all_reports_failing_indexes() {
        let root = Value::from(json!({"rows": [{"name": "a"}, {}, {"name": "c"}]}));
        let failing = failing_elements(
            &root,
            &path("rows"),
            &["name".to_string()],
            &IndexMap::new(),
            &[],
            &mut RegexCache::default(),
        );
        assert_eq!(failing, vec![1]);
    }

    #[test]
    fn for_all_is_vacuous_when_absent() {
        let expr = ObligationExpr::for_all_required(path("rows"), &["name"]);
        assert!(holds(&expr, &Value::from(json!({})), &mut RegexCache::default()));
    }

    #[test]
    fn for_all_checks_domains_and_any_of_groups() {
        let expr = ObligationExpr::ForAll {
            path: path("rows"),
            required_fields: vec![],
            field_domains: IndexMap::from([(
                "status".to_string(),
                vec![ValueDomain::enum_text(&["ok", "bad"])],
            )]),
            require_any_of: vec![vec!["id".to_string(), "key".to_string()]],
        };
        let mut cache = RegexCache::default();
        let good = Value::from(json!({"rows": [{"status": "ok", "key": 1}]}));
        let bad_domain = Value::from(json!({"rows": [{"status": "meh", "id": 1}]}));
        let bad_group = Value::from(json!({"rows": [{"status": "ok", "id": null}]}));
        assert!(holds(&expr, &good, &mut cache));
        assert!(!holds(&expr, &bad_domain, &mut cache));
        assert!(!holds(&expr, &bad_group, &mut cache));
    }

    #[test]
    fn exists_counts_elements() {
        let expr = ObligationExpr::Exists {
            path: path("items"),
            min_count: 2,
        };
        let mut cache = RegexCache::default();
        assert!(!holds(&expr, &Value::from(json!({"items": [1]})), &mut cache));
        assert!(holds(&expr, &Value::from(json!({"items": [1, 2]})), &mut cache));
        assert!(!holds(&expr, &Value::from(json!({})), &mut cache));
    }
}
