//! Obligations applied to a witness skeleton as in-place patches.

use indexmap::IndexMap;
use morph_core::{AccessPath, AccessSegment, Node, ObligationExpr, Value, ValueDomain};

use super::{minimal, non_null_witness, scalar_for};
use crate::validate::domain::{check_domain, DomainCheck, RegexCache};
use crate::validate::obligations::holds;

/// Largest array a patch will grow, for literal indexes and `Exists` counts.
pub const MAX_PATCHED_ELEMENTS: usize = 4096;

pub(super) fn apply(value: &mut Value, schema: &Node, expr: &ObligationExpr, regexes: &mut RegexCache) {
    match expr {
        ObligationExpr::PathPresent { path } => ensure(value, Some(schema), path.segments(), false),
        ObligationExpr::PathNonNull { path } => ensure(value, Some(schema), path.segments(), true),
        ObligationExpr::OneOf { children } => {
            if holds(expr, value, regexes) {
                return;
            }
            if let Some(first) = children.first() {
                apply(value, schema, first, regexes);
            }
        }
        ObligationExpr::AllOf { children } => {
            for child in children {
                apply(value, schema, child, regexes);
            }
        }
        ObligationExpr::Exists { path, min_count } => {
            if *min_count > MAX_PATCHED_ELEMENTS {
                tracing::debug!(path = %path, min_count, "element count too large to patch");
                return;
            }
            ensure(value, Some(schema), path.segments(), true);
            let element = schema.node_at(&path.child(AccessSegment::Dynamic));
            match resolve_mut(value, path) {
                Some(target) if target.as_elements().is_some() => {}
                Some(target) => *target = Value::Array(Vec::new()),
                None => return,
            }
            if let Some(items) = resolve_mut(value, path).and_then(Value::as_elements_mut) {
                while items.len() < *min_count {
                    items.push(non_null_witness(element));
                }
            }
        }
        ObligationExpr::ForAll {
            path,
            required_fields,
            field_domains,
            require_any_of,
        } => {
            let element = schema.node_at(&path.child(AccessSegment::Dynamic));
            let Some(items) = resolve_mut(value, path).and_then(Value::as_elements_mut) else {
                return;
            };
            for item in items {
                patch_element(item, element, required_fields, field_domains, require_any_of, regexes);
            }
        }
        ObligationExpr::ValueDomain { path, domain } => {
            let Some(target) = resolve_mut(value, path) else {
                return;
            };
            if !target.is_null() && check_domain(domain, target, regexes) == DomainCheck::Fail {
                if let Some(replacement) = scalar_for(std::slice::from_ref(domain)) {
                    *target = replacement;
                }
            }
        }
    }
}

/// Creates every missing step of `segments`. A created leaf is non-null; an
/// existing null leaf is replaced only when `non_null` is set. Dynamic
/// segments cannot be created and stop the walk.
fn ensure(value: &mut Value, node: Option<&Node>, segments: &[AccessSegment], non_null: bool) {
    let Some((segment, rest)) = segments.split_first() else {
        if non_null && value.is_null() {
            *value = non_null_witness(node);
        }
        return;
    };
    let child = node.and_then(|n| n.node_at(&AccessPath::from_segments([segment.clone()])));
    match segment {
        AccessSegment::Field(name) => {
            if value.as_object().is_none() {
                *value = Value::empty_object();
            }
            let Some(fields) = value.as_object_mut() else {
                return;
            };
            let slot = fields.entry(name.clone()).or_insert_with(|| {
                if rest.is_empty() {
                    non_null_witness(child)
                } else {
                    Value::Null
                }
            });
            ensure(slot, child, rest, non_null);
        }
        AccessSegment::Index(index) => {
            let Some(index) = usize::try_from(*index)
                .ok()
                .filter(|i| *i < MAX_PATCHED_ELEMENTS)
            else {
                tracing::debug!(index, "index out of patchable range");
                return;
            };
            if value.as_elements().is_none() {
                *value = Value::Array(Vec::new());
            }
            let Some(items) = value.as_elements_mut() else {
                return;
            };
            while items.len() <= index {
                items.push(non_null_witness(child));
            }
            ensure(&mut items[index], child, rest, non_null);
        }
        AccessSegment::Dynamic => {}
    }
}

fn patch_element(
    item: &mut Value,
    node: Option<&Node>,
    required_fields: &[String],
    field_domains: &IndexMap<String, Vec<ValueDomain>>,
    require_any_of: &[Vec<String>],
    regexes: &mut RegexCache,
) {
    if required_fields.is_empty() && field_domains.is_empty() && require_any_of.is_empty() {
        return;
    }
    if item.as_object().is_none() {
        *item = Value::empty_object();
    }
    let child_node = |name: &str| node.and_then(|n| n.node_at(&AccessPath::fields(&[name])));
    let Some(fields) = item.as_object_mut() else {
        return;
    };

    for name in required_fields {
        if !fields.contains_key(name) {
            let value = child_node(name).map(minimal).unwrap_or(Value::Null);
            fields.insert(name.clone(), value);
        }
    }

    for group in require_any_of {
        let satisfied = group
            .iter()
            .any(|f| fields.get(f).is_some_and(|v| !v.is_null()));
        if let (false, Some(first)) = (satisfied, group.first()) {
            fields.insert(first.clone(), non_null_witness(child_node(first)));
        }
    }

    for (name, domains) in field_domains {
        let Some(value) = fields.get_mut(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let failing = domains
            .iter()
            .any(|d| check_domain(d, value, regexes) == DomainCheck::Fail);
        if failing {
            if let Some(replacement) = scalar_for(domains) {
                *value = replacement;
            }
        }
    }
}

fn resolve_mut<'v>(root: &'v mut Value, path: &AccessPath) -> Option<&'v mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |target, segment| match segment {
            AccessSegment::Field(name) => target.as_object_mut()?.get_mut(name),
            AccessSegment::Index(index) => {
                let index = usize::try_from(*index).ok()?;
                target.as_elements_mut()?.get_mut(index)
            }
            AccessSegment::Dynamic => None,
        })
}
