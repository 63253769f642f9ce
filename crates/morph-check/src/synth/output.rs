//! Turning the accumulated output value into a guarantee schema.

use indexmap::IndexMap;
use morph_core::{
    AccessPath, GuaranteeSchema, Node, NodeKind, Obligation, ObligationExpr, OpaqueRegion,
    ValueDomain, ValueShape,
};

use super::env::{AbstractValue, Evidence};
use super::RULE_OUTPUT_FOR_ALL;

pub(super) fn finish_output(output: Option<AbstractValue>, null_exit: bool) -> GuaranteeSchema {
    let value = output.unwrap_or_else(|| AbstractValue::of(ValueShape::Never));

    let mut root = Node::from_shape(&value.shape, true);
    apply_evidence(&mut root, &value.evidence);

    let mut obligations = Vec::new();
    collect_for_all(&root, &AccessPath::root(), &mut obligations);

    let mut opaque_regions: Vec<OpaqueRegion> = Vec::new();
    for (path, reason) in &value.opaque {
        if !opaque_regions.iter().any(|r| r.path == *path) {
            opaque_regions.push(OpaqueRegion::new(path.clone(), *reason));
        }
    }
    opaque_regions.sort();

    GuaranteeSchema {
        root,
        obligations,
        opaque_regions,
        may_emit_null: null_exit || value.shape.admits_null(),
    }
}

/// Puts `EnumText` domains on text nodes that only ever received literals.
fn apply_evidence(node: &mut Node, evidence: &Evidence) {
    match node.kind {
        NodeKind::Text => {
            if let Evidence::TextLiterals(values) = evidence {
                let values: Vec<&String> = values.iter().collect();
                if !values.is_empty() {
                    node.domains.push(ValueDomain::enum_text(&values));
                }
            }
        }
        NodeKind::Union => {
            for option in &mut node.options {
                apply_evidence(option, evidence);
            }
        }
        NodeKind::Object => {
            for (name, child) in &mut node.children {
                apply_evidence(child, &evidence.field(name));
            }
        }
        NodeKind::Array | NodeKind::Set => {
            if let Some(element) = &mut node.element {
                apply_evidence(element, &evidence.element());
            }
        }
        _ => {}
    }
}

/// Every emitted list of objects carries the same required fields.
fn collect_for_all(node: &Node, path: &AccessPath, out: &mut Vec<Obligation>) {
    match node.kind {
        NodeKind::Object => {
            for (name, child) in &node.children {
                collect_for_all(child, &path.field(name), out);
            }
        }
        NodeKind::Union => {
            for option in &node.options {
                collect_for_all(option, path, out);
            }
        }
        NodeKind::Array | NodeKind::Set => {
            let Some(element) = node.element.as_deref() else {
                return;
            };
            if element.kind != NodeKind::Object {
                return;
            }
            let required: Vec<&String> = element
                .children
                .iter()
                .filter(|(_, child)| child.required)
                .map(|(name, _)| name)
                .collect();
            if required.is_empty() {
                return;
            }
            let field_domains: IndexMap<String, Vec<ValueDomain>> = element
                .children
                .iter()
                .filter(|(_, child)| !child.domains.is_empty())
                .map(|(name, child)| (name.clone(), child.domains.clone()))
                .collect();
            let mut expr = ObligationExpr::for_all_required(path.clone(), &required);
            if let ObligationExpr::ForAll {
                field_domains: domains,
                ..
            } = &mut expr
            {
                *domains = field_domains;
            }
            out.push(Obligation::certain(expr, RULE_OUTPUT_FOR_ALL).with_confidence(0.75));
        }
        _ => {}
    }
}
