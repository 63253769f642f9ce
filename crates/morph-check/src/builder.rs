//! Contract construction: declared signatures reconciled with inference.
//!
//! - No signature: the contract is whatever synthesis infers.
//! - A signature with a concrete output type: the declaration is taken as
//!   authoritative and the body is not analyzed.
//! - A signature whose output is the wildcard `any`/`any?`: synthesis runs,
//!   seeded with the declared input type, and the declared input tree is
//!   merged with the inferred one. Declared concrete types win; declared
//!   wildcards are narrowed to what the body actually reads.

use morph_core::ast::{Signature, Transform, TypeRef};
use morph_core::{
    Contract, ContractMetadata, ContractSource, GuaranteeSchema, Node, NodeKind, Obligation,
    OpaqueRegion, RequirementSchema, ValueDomain,
};

use crate::config::SynthesisConfig;
use crate::synth::{synthesize_with_config, HostSignature};

/// Builds the contract of `transform` with the default synthesis settings.
pub fn build(transform: &Transform, hosts: &[HostSignature]) -> Contract {
    build_with_config(transform, hosts, &SynthesisConfig::default())
}

pub fn build_with_config(
    transform: &Transform,
    hosts: &[HostSignature],
    config: &SynthesisConfig,
) -> Contract {
    let contract = match &transform.signature {
        None => {
            let inferred = synthesize_with_config(&transform.body, hosts, None, config);
            Contract {
                input: inferred.input,
                output: inferred.output,
                source: ContractSource::Inferred,
                metadata: ContractMetadata {
                    transform: transform.name.clone(),
                    declared_signature: false,
                    seeded_input: false,
                },
            }
        }
        Some(signature) if !signature.output.is_wildcard() => explicit(transform, signature),
        Some(signature) => reconciled(transform, signature, hosts, config),
    };
    tracing::debug!(
        transform = %transform.name,
        source = ?contract.source,
        input_obligations = contract.input.obligations.len(),
        output_obligations = contract.output.obligations.len(),
        "contract built"
    );
    contract
}

fn explicit(transform: &Transform, signature: &Signature) -> Contract {
    let output = type_ref_to_node(&signature.output, true);
    Contract {
        input: RequirementSchema {
            root: type_ref_to_node(&signature.input, true),
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
        },
        output: GuaranteeSchema {
            may_emit_null: output.admits_null(),
            root: output,
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
        },
        source: ContractSource::Explicit,
        metadata: ContractMetadata {
            transform: transform.name.clone(),
            declared_signature: true,
            seeded_input: false,
        },
    }
}

fn reconciled(
    transform: &Transform,
    signature: &Signature,
    hosts: &[HostSignature],
    config: &SynthesisConfig,
) -> Contract {
    let seed = (!signature.input.is_wildcard()).then(|| signature.input.to_shape());
    let inferred = synthesize_with_config(&transform.body, hosts, seed.as_ref(), config);

    let mut root = merge_declared(&signature.input, &inferred.input.root);
    root.required = true;

    let mut output = inferred.output;
    if signature.output.is_nullable_wildcard() {
        output.may_emit_null = true;
    }
    output.obligations = dedup_obligations(output.obligations);
    output.opaque_regions = dedup_regions(output.opaque_regions);

    Contract {
        input: RequirementSchema {
            root,
            obligations: dedup_obligations(inferred.input.obligations),
            opaque_regions: dedup_regions(inferred.input.opaque_regions),
        },
        output,
        source: ContractSource::Inferred,
        metadata: ContractMetadata {
            transform: transform.name.clone(),
            declared_signature: true,
            seeded_input: seed.is_some(),
        },
    }
}

/// Merges a declared input type with the inferred requirement tree.
///
/// Declared fields win. An open declared object also keeps the inferred
/// children it does not name.
fn merge_declared(declared: &TypeRef, inferred: &Node) -> Node {
    match declared {
        TypeRef::Any => inferred.clone(),
        TypeRef::Nullable(inner) if matches!(**inner, TypeRef::Any) => nullable_node(inferred.clone()),
        TypeRef::Object { fields, open } => {
            let inferred_object = inferred.option_of_kind(NodeKind::Object);
            let mut node = Node::object(*open);
            for (name, field) in fields {
                let mut child = match inferred_object.and_then(|o| o.children.get(name)) {
                    Some(inferred_child) => merge_declared(&field.ty, inferred_child),
                    None => type_ref_to_node(&field.ty, true),
                };
                child.required = !field.optional;
                node.children.insert(name.clone(), child);
            }
            if let Some(inferred_object) = inferred_object.filter(|_| *open) {
                for (name, child) in &inferred_object.children {
                    if !fields.contains_key(name) {
                        node.children.insert(name.clone(), child.clone());
                    }
                }
            }
            node
        }
        other => type_ref_to_node(other, true),
    }
}

/// The node tree a declared type describes.
pub fn type_ref_to_node(ty: &TypeRef, required: bool) -> Node {
    let mut node = match ty {
        TypeRef::Any => Node::any(),
        TypeRef::Null => Node::new(NodeKind::Null),
        TypeRef::Boolean => Node::new(NodeKind::Boolean),
        TypeRef::Number => Node::new(NodeKind::Number),
        TypeRef::Bytes => Node::new(NodeKind::Bytes),
        TypeRef::Text => Node::new(NodeKind::Text),
        TypeRef::TextEnum(values) => {
            Node::new(NodeKind::Text).with_domain(ValueDomain::enum_text(values))
        }
        TypeRef::Array(inner) => Node::array(type_ref_to_node(inner, true)),
        TypeRef::Set(inner) => Node::set(type_ref_to_node(inner, true)),
        TypeRef::Object { fields, open } => {
            let mut node = Node::object(*open);
            for (name, field) in fields {
                node.children
                    .insert(name.clone(), type_ref_to_node(&field.ty, !field.optional));
            }
            node
        }
        TypeRef::Union(options) => {
            Node::union(options.iter().map(|o| type_ref_to_node(o, true)).collect())
        }
        TypeRef::Nullable(inner) => nullable_node(type_ref_to_node(inner, true)),
    };
    node.required = required;
    node
}

/// `node` also admitting null.
fn nullable_node(node: Node) -> Node {
    if node.admits_null() {
        return node;
    }
    let required = node.required;
    let mut options = vec![Node::new(NodeKind::Null)];
    if node.kind == NodeKind::Union {
        options.extend(node.options);
    } else {
        options.push(node);
    }
    let mut union = Node::union(options);
    union.required = required;
    union
}

fn dedup_obligations(obligations: Vec<Obligation>) -> Vec<Obligation> {
    let mut out: Vec<Obligation> = Vec::with_capacity(obligations.len());
    for obligation in obligations {
        if !out.contains(&obligation) {
            out.push(obligation);
        }
    }
    out
}

fn dedup_regions(regions: Vec<OpaqueRegion>) -> Vec<OpaqueRegion> {
    let mut out: Vec<OpaqueRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        if !out.contains(&region) {
            out.push(region);
        }
    }
    out
}
