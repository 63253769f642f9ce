//! Best-effort coercion of loosely-typed input against a schema.
//!
//! Wire formats without a bytes or set type deliver base64 text and plain
//! lists. Where the schema says `Bytes` or `Set`, those are converted:
//!
//! - Text under a `Bytes` node is decoded as standard base64
//! - A list under a `Set` node is deduplicated by canonical key, keeping the
//!   first occurrence
//!
//! A value that cannot be converted passes through unchanged; the validator
//! then reports the mismatch against the original value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use morph_core::{Node, NodeKind, SchemaView, Value};

/// Coerces `value` to the representation `node` describes, recursively.
pub fn coerce(node: &Node, value: Value) -> Value {
    match (node.kind, value) {
        (NodeKind::Bytes, Value::Text(text)) => match STANDARD.decode(text.as_bytes()) {
            Ok(bytes) => Value::Bytes(bytes),
            Err(err) => {
                tracing::debug!("leaving text as is, not valid base64: {err}");
                Value::Text(text)
            }
        },
        (NodeKind::Set, Value::Array(items) | Value::Set(items)) => {
            Value::Set(dedup(coerce_elements(node, items)))
        }
        (NodeKind::Array, Value::Array(items)) => Value::Array(coerce_elements(node, items)),
        (NodeKind::Object, Value::Object(fields)) => Value::Object(
            fields
                .into_iter()
                .map(|(name, value)| match node.children.get(&name) {
                    Some(child) => {
                        let value = coerce(child, value);
                        (name, value)
                    }
                    None => (name, value),
                })
                .collect(),
        ),
        (NodeKind::Union, value) => {
            let option = node
                .options
                .iter()
                .find(|o| o.kind != NodeKind::Union && o.kind.matches(&value))
                .or_else(|| node.options.iter().find(|o| convertible(o.kind, &value)));
            match option {
                Some(option) => coerce(option, value),
                None => value,
            }
        }
        (_, value) => value,
    }
}

/// Coerces a whole input value against a requirement (or guarantee) schema.
pub fn coerce_input<S: SchemaView + ?Sized>(schema: &S, value: Value) -> Value {
    coerce(schema.root(), value)
}

fn convertible(kind: NodeKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (NodeKind::Bytes, Value::Text(_)) | (NodeKind::Set, Value::Array(_))
    )
}

fn coerce_elements(node: &Node, items: Vec<Value>) -> Vec<Value> {
    match node.element.as_deref() {
        Some(element) => items.into_iter().map(|item| coerce(element, item)).collect(),
        None => items,
    }
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.canonical_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base64_text_becomes_bytes() {
        let node = Node::new(NodeKind::Bytes);
        assert_eq!(
            coerce(&node, Value::text("aGVsbG8=")),
            Value::Bytes(b"hello".to_vec())
        );
    }

    #[test]
    fn invalid_base64_passes_through() {
        let node = Node::new(NodeKind::Bytes);
        assert_eq!(coerce(&node, Value::text("not base64!")), Value::text("not base64!"));
    }

    #[test]
    fn lists_become_deduplicated_sets() {
        let node = Node::set(Node::any());
        let value = Value::from(json!([{"a": 1, "b": 2}, 3, {"b": 2, "a": 1}, 3, "3"]));
        assert_eq!(
            coerce(&node, value),
            Value::Set(vec![
                Value::from(json!({"a": 1, "b": 2})),
                Value::int(3),
                Value::text("3"),
            ])
        );
    }

    #[test]
    fn nested_fields_are_coerced_and_unknown_fields_kept() {
        let root = Node::object(true)
            .with_child("payload", Node::new(NodeKind::Bytes))
            .with_child("tags", Node::array(Node::new(NodeKind::Bytes)));
        let value = Value::from(json!({"payload": "AQI=", "tags": ["AA=="], "extra": "AQI="}));
        let coerced = coerce(&root, value);
        assert_eq!(coerced.get("payload"), Some(&Value::Bytes(vec![1, 2])));
        assert_eq!(
            coerced.get("tags"),
            Some(&Value::Array(vec![Value::Bytes(vec![0])]))
        );
        assert_eq!(coerced.get("extra"), Some(&Value::text("AQI=")));
    }

    #[test]
    fn unions_prefer_an_option_that_already_matches() {
        let node = Node::union(vec![Node::new(NodeKind::Text), Node::new(NodeKind::Bytes)]);
        assert_eq!(coerce(&node, Value::text("AQI=")), Value::text("AQI="));

        let node = Node::union(vec![Node::new(NodeKind::Null), Node::new(NodeKind::Bytes)]);
        assert_eq!(coerce(&node, Value::text("AQI=")), Value::Bytes(vec![1, 2]));
        assert_eq!(coerce(&node, Value::Null), Value::Null);
    }
}
