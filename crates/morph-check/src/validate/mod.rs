//! Validation of concrete values against requirement/guarantee schemas.
//!
//! [`validate`] walks the node tree alongside the value, then evaluates the
//! schema's obligations against the root, then reports every opaque region
//! with what the value holds at its static prefix. It only reads the schema, so one contract can
//! be validated against from many threads at once.

pub mod domain;
pub mod enforce;
pub mod obligations;
pub mod violation;

use morph_core::{AccessPath, AccessSegment, Node, NodeKind, ObligationExpr, SchemaView, Value};

use crate::config::ValidationOptions;
use domain::{check_domain, DomainCheck, RegexCache};
use obligations::{describe_at, failing_elements, holds, resolve};
use violation::{sort_violations, Violation, ViolationKind};

pub const RULE_REQUIRED: &str = "required-path";
pub const RULE_CLOSED: &str = "closed-object";
pub const RULE_SHAPE: &str = "shape";
pub const RULE_NULLABILITY: &str = "nullability";
pub const RULE_DOMAIN: &str = "value-domain";

/// Validates `value` against `schema`, returning violations sorted by
/// `(path, kind, rule_id)`.
pub fn validate<S: SchemaView + ?Sized>(
    schema: &S,
    value: &Value,
    options: &ValidationOptions,
) -> Vec<Violation> {
    let mut walker = Walker::default();
    let root = AccessPath::root();

    if !(value.is_null() && schema.accepts_null_root()) {
        walker.check_node(schema.root(), value, &root);
    }

    for obligation in schema.obligations() {
        if obligation.confidence < options.confidence_threshold {
            continue;
        }
        if obligation.heuristic && !options.include_heuristic {
            continue;
        }
        walker.check_obligation(&obligation.expr, &obligation.rule_id, value);
    }

    for region in schema.opaque_regions() {
        let reached = resolve(value, &region.path.static_prefix())
            .map(|v| v.type_name())
            .unwrap_or("absent");
        walker.out.push(Violation::new(
            ViolationKind::OpaqueRegionWarning,
            region.path.clone(),
            "opaque",
            reached,
            format!("opaque-{}", region.reason),
        ));
    }

    let mut violations = walker.out;
    sort_violations(&mut violations);
    violations
}

#[derive(Default)]
struct Walker {
    out: Vec<Violation>,
    regexes: RegexCache,
}

impl Walker {
    fn check_node(&mut self, node: &Node, value: &Value, path: &AccessPath) {
        if value.is_null() {
            // Never is unreachable; null stands in for "no value".
            if !node.admits_null() && node.kind != NodeKind::Never {
                self.push(ViolationKind::NullabilityMismatch, path, node, value, RULE_NULLABILITY);
            }
            return;
        }

        let node = if node.kind == NodeKind::Union {
            match node.options.iter().find(|o| o.kind.matches(value)) {
                Some(option) => option,
                None => {
                    self.push(ViolationKind::ShapeMismatch, path, node, value, RULE_SHAPE);
                    return;
                }
            }
        } else {
            node
        };

        if !node.kind.matches(value) {
            self.push(ViolationKind::ShapeMismatch, path, node, value, RULE_SHAPE);
            return;
        }

        for domain in &node.domains {
            if check_domain(domain, value, &mut self.regexes) == DomainCheck::Fail {
                self.out.push(Violation::new(
                    ViolationKind::ShapeMismatch,
                    path.clone(),
                    domain.to_string(),
                    describe_value(value),
                    RULE_DOMAIN,
                ));
            }
        }

        match value {
            Value::Object(fields) if node.kind == NodeKind::Object => {
                for (name, child) in &node.children {
                    let child_path = path.field(name);
                    match fields.get(name) {
                        Some(v) => self.check_node(child, v, &child_path),
                        None if child.required => self.out.push(Violation::new(
                            ViolationKind::MissingRequiredPath,
                            child_path,
                            child.to_string(),
                            "absent",
                            RULE_REQUIRED,
                        )),
                        None => {}
                    }
                }
                if !node.open {
                    for (key, v) in fields {
                        if !node.children.contains_key(key) {
                            self.out.push(Violation::new(
                                ViolationKind::UnexpectedField,
                                path.field(key),
                                "absent",
                                v.type_name(),
                                RULE_CLOSED,
                            ));
                        }
                    }
                }
            }
            Value::Array(items) | Value::Set(items) => {
                if let Some(element) = &node.element {
                    for (i, item) in items.iter().enumerate() {
                        let index = i64::try_from(i).unwrap_or(i64::MAX);
                        self.check_node(element, item, &path.child(AccessSegment::Index(index)));
                    }
                }
            }
            _ => {}
        }
    }

    fn check_obligation(&mut self, expr: &ObligationExpr, rule_id: &str, root: &Value) {
        // A top-level ForAll reports each failing element on its own.
        if let ObligationExpr::ForAll {
            path,
            required_fields,
            field_domains,
            require_any_of,
        } = expr
        {
            let failing = failing_elements(
                root,
                path,
                required_fields,
                field_domains,
                require_any_of,
                &mut self.regexes,
            );
            for index in failing {
                let element_path = path.child(AccessSegment::Index(i64::try_from(index).unwrap_or(i64::MAX)));
                self.out.push(Violation::new(
                    ViolationKind::MissingConditionalGroup,
                    element_path.clone(),
                    expr.to_string(),
                    describe_at(root, &element_path),
                    rule_id,
                ));
            }
            return;
        }

        if !holds(expr, root, &mut self.regexes) {
            let anchor = expr.anchor_path();
            self.out.push(Violation::new(
                ViolationKind::MissingConditionalGroup,
                anchor.clone(),
                expr.to_string(),
                describe_at(root, &anchor),
                rule_id,
            ));
        }
    }

    fn push(
        &mut self,
        kind: ViolationKind,
        path: &AccessPath,
        node: &Node,
        value: &Value,
        rule_id: &str,
    ) {
        self.out.push(Violation::new(
            kind,
            path.clone(),
            node.to_string(),
            value.type_name(),
            rule_id,
        ));
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("\"{s}\""),
        Value::Number(n) => n.to_string(),
        other => other.type_name().to_string(),
    }
}
