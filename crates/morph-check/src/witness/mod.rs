//! Witness generation: synthesizing a small value that should satisfy a
//! schema.
//!
//! [`generate`] builds the minimal skeleton a node tree describes (required
//! children only, at most one element per container) and then applies every
//! obligation as a patch. The result is fed back through the validator by
//! [`check`] to detect self-contradictory schemas.

pub mod check;
mod patch;
pub mod regex_sample;
pub mod sampler;

use morph_core::{Node, NodeKind, SchemaView, Value, ValueDomain};
use serde_json::Number;

use crate::validate::domain::{check_domain, DomainCheck, RegexCache};

/// Builds a value for `schema`: the minimal tree, patched by its obligations.
pub fn generate<S: SchemaView + ?Sized>(schema: &S) -> Value {
    let mut value = minimal(schema.root());
    let mut regexes = RegexCache::default();
    for obligation in schema.obligations() {
        patch::apply(&mut value, schema.root(), &obligation.expr, &mut regexes);
    }
    value
}

/// The smallest value `node` accepts.
///
/// Nodes that admit null produce null, so optional-looking positions stay
/// empty. Obligations that need something there patch it in afterwards.
pub fn minimal(node: &Node) -> Value {
    match node.kind {
        NodeKind::Any | NodeKind::Never | NodeKind::Null => Value::Null,
        NodeKind::Boolean => Value::Bool(false),
        NodeKind::Number => number_for(&node.domains),
        NodeKind::Bytes => Value::Bytes(Vec::new()),
        NodeKind::Text => text_for(&node.domains),
        NodeKind::Object => Value::Object(
            node.children
                .iter()
                .filter(|(_, child)| child.required)
                .map(|(name, child)| (name.clone(), minimal(child)))
                .collect(),
        ),
        NodeKind::Array => Value::Array(representative_elements(node)),
        NodeKind::Set => Value::Set(representative_elements(node)),
        NodeKind::Union => {
            if node.admits_null() {
                return Value::Null;
            }
            node.options
                .iter()
                .find(|o| o.kind != NodeKind::Never)
                .map(minimal)
                .unwrap_or(Value::Null)
        }
    }
}

/// Like [`minimal`], but avoids null wherever the node allows something else.
///
/// Positions the schema knows nothing about get an empty object.
pub fn non_null_witness(node: Option<&Node>) -> Value {
    let Some(node) = node else {
        return Value::empty_object();
    };
    match node.kind {
        NodeKind::Any => Value::empty_object(),
        NodeKind::Null | NodeKind::Never => Value::Null,
        NodeKind::Union => node
            .options
            .iter()
            .find(|o| !matches!(o.kind, NodeKind::Null | NodeKind::Never))
            .map(|o| non_null_witness(Some(o)))
            .unwrap_or(Value::Null),
        _ => minimal(node),
    }
}

fn representative_elements(node: &Node) -> Vec<Value> {
    match node.element.as_deref() {
        Some(element) if !node.element_unconstrained() => vec![minimal(element)],
        _ => Vec::new(),
    }
}

/// A scalar satisfying `domains`: text for enum/regex domains, a number for
/// ranges. `None` when no domain says which.
pub(crate) fn scalar_for(domains: &[ValueDomain]) -> Option<Value> {
    if domains
        .iter()
        .any(|d| matches!(d, ValueDomain::EnumText { .. } | ValueDomain::Regex { .. }))
    {
        return Some(text_for(domains));
    }
    if domains
        .iter()
        .any(|d| matches!(d, ValueDomain::NumberRange { .. }))
    {
        return Some(number_for(domains));
    }
    None
}

/// The first candidate text that passes every domain: declared enum values
/// in order, then a regex sample, then the empty string.
fn text_for(domains: &[ValueDomain]) -> Value {
    let mut candidates: Vec<String> = Vec::new();
    for domain in domains {
        match domain {
            ValueDomain::EnumText { values } => candidates.extend(values.iter().cloned()),
            ValueDomain::Regex { pattern } => {
                candidates.extend(regex_sample::sample_matching(pattern))
            }
            ValueDomain::NumberRange { .. } => {}
        }
    }
    candidates.push(String::new());

    let mut regexes = RegexCache::default();
    let chosen = candidates
        .iter()
        .find(|c| {
            let value = Value::text(c.as_str());
            domains
                .iter()
                .all(|d| check_domain(d, &value, &mut regexes) != DomainCheck::Fail)
        })
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_default();
    Value::Text(chosen)
}

fn number_for(domains: &[ValueDomain]) -> Value {
    let range = domains.iter().find_map(|d| match d {
        ValueDomain::NumberRange {
            min,
            max,
            integer_only,
        } => Some((*min, *max, *integer_only)),
        _ => None,
    });
    let Some((min, max, integer_only)) = range else {
        return Value::int(0);
    };
    let n = match (min, max) {
        (Some(lo), _) if integer_only => lo.ceil(),
        (Some(lo), _) => lo,
        (None, Some(hi)) if hi < 0.0 && integer_only => hi.floor(),
        (None, Some(hi)) if hi < 0.0 => hi,
        _ => 0.0,
    };
    number_value(n)
}

pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::int(n as i64);
    }
    Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or_else(|| Value::int(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::{
        AccessPath, GuaranteeSchema, Obligation, ObligationExpr, RequirementSchema,
    };
    use serde_json::json;

    use crate::config::ValidationOptions;
    use crate::validate::validate;

    fn requirement(root: Node, obligations: Vec<ObligationExpr>) -> RequirementSchema {
        RequirementSchema {
            root,
            obligations: obligations
                .into_iter()
                .map(|expr| Obligation::certain(expr, "test"))
                .collect(),
            opaque_regions: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Minimal skeleton
    // -----------------------------------------------------------------------

    #[test]
    fn objects_keep_only_required_children() {
        let root = Node::object(false)
            .with_child("id", Node::new(NodeKind::Number))
            .with_child("note", Node::new(NodeKind::Text).optional());
        assert_eq!(minimal(&root), Value::from(json!({"id": 0})));
    }

    #[test]
    fn containers_get_one_element_only_when_constrained() {
        assert_eq!(minimal(&Node::array(Node::any())), Value::Array(Vec::new()));
        assert_eq!(
            minimal(&Node::set(Node::new(NodeKind::Boolean))),
            Value::Set(vec![Value::Bool(false)])
        );
    }

    #[test]
    fn domains_pick_the_first_declared_value() {
        let status = Node::new(NodeKind::Text).with_domain(ValueDomain::enum_text(&["ok", "failed"]));
        assert_eq!(minimal(&status), Value::text("ok"));

        let count = Node::new(NodeKind::Number).with_domain(ValueDomain::NumberRange {
            min: Some(2.5),
            max: None,
            integer_only: true,
        });
        assert_eq!(minimal(&count), Value::int(3));

        let negative = Node::new(NodeKind::Number).with_domain(ValueDomain::range(None, Some(-4.0)));
        assert_eq!(minimal(&negative), Value::int(-4));
    }

    #[test]
    fn nullable_unions_produce_null() {
        let node = Node::union(vec![Node::new(NodeKind::Null), Node::new(NodeKind::Text)]);
        assert_eq!(minimal(&node), Value::Null);
        assert_eq!(non_null_witness(Some(&node)), Value::text(""));
        assert_eq!(non_null_witness(None), Value::empty_object());
    }

    // -----------------------------------------------------------------------
    // Generation with obligations
    // -----------------------------------------------------------------------

    #[test]
    fn one_of_patches_only_the_first_alternative() {
        let root = Node::object(true)
            .with_child("a", Node::any().optional())
            .with_child("b", Node::any().optional());
        let schema = requirement(
            root,
            vec![ObligationExpr::OneOf {
                children: vec![
                    ObligationExpr::non_null(AccessPath::fields(&["a"])),
                    ObligationExpr::non_null(AccessPath::fields(&["b"])),
                ],
            }],
        );
        let value = generate(&schema);
        assert_eq!(value, Value::from(json!({"a": {}})));
        assert!(validate(&schema, &value, &ValidationOptions::maximal()).is_empty());
    }

    #[test]
    fn nested_paths_are_created_through_missing_parents() {
        let schema = requirement(
            Node::object(true),
            vec![ObligationExpr::present(AccessPath::parse("a.b[1].c").unwrap())],
        );
        let value = generate(&schema);
        assert_eq!(value, Value::from(json!({"a": {"b": [{}, {"c": {}}]}})));
        assert!(validate(&schema, &value, &ValidationOptions::maximal()).is_empty());
    }

    #[test]
    fn exists_and_for_all_patch_elements() {
        let item = Node::object(true)
            .with_child("name", Node::new(NodeKind::Text))
            .with_child(
                "kind",
                Node::new(NodeKind::Text)
                    .with_domain(ValueDomain::enum_text(&["x", "y"]))
                    .optional(),
            );
        let root = Node::object(true).with_child("items", Node::array(item));
        let mut for_all = ObligationExpr::for_all_required(AccessPath::fields(&["items"]), &["name"]);
        if let ObligationExpr::ForAll { require_any_of, .. } = &mut for_all {
            require_any_of.push(vec!["kind".to_string()]);
        }
        let schema = requirement(
            root,
            vec![
                ObligationExpr::Exists {
                    path: AccessPath::fields(&["items"]),
                    min_count: 2,
                },
                for_all,
            ],
        );
        let value = generate(&schema);
        let items = value.get("items").and_then(Value::as_elements).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.get("kind") == Some(&Value::text("x"))));
        assert!(validate(&schema, &value, &ValidationOptions::maximal()).is_empty());
    }

    #[test]
    fn output_schemas_generate_through_the_same_path() {
        let schema = GuaranteeSchema {
            root: Node::object(false).with_child("total", Node::new(NodeKind::Number)),
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
            may_emit_null: false,
        };
        assert_eq!(generate(&schema), Value::from(json!({"total": 0})));
    }
}
