//! External JSON representation of contracts, for documentation and tooling.
//!
//! Every rendering carries a `version` tag naming the schema generation that
//! produced it: 3 for the current node tree, 2 and 1 for the older
//! generations in [`versions`](crate::versions). The standard rendering of
//! the current generation hides provenance; `debug` adds node origins and
//! obligation confidence, heuristic flag and rule id.

use morph_core::{Contract, Node, NodeKind, Obligation, OpaqueRegion, SchemaView, ValueDomain};
use serde_json::{json, Map, Value as Json};

use crate::versions::{ContractV1, ContractV2};

pub const VERSION_V1: u32 = 1;
pub const VERSION_V2: u32 = 2;
pub const VERSION_CURRENT: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub debug: bool,
}

impl RenderOptions {
    pub fn debug() -> Self {
        RenderOptions { debug: true }
    }
}

pub fn render_contract(contract: &Contract, options: &RenderOptions) -> Json {
    let mut out = Map::new();
    out.insert("version".into(), json!(VERSION_CURRENT));
    out.insert("source".into(), json!(contract.source));
    out.insert("input".into(), render_schema(&contract.input, options));
    let mut output = render_schema(&contract.output, options);
    if let Some(fields) = output.as_object_mut() {
        fields.insert("may_emit_null".into(), json!(contract.output.may_emit_null));
    }
    out.insert("output".into(), output);
    if options.debug {
        out.insert("metadata".into(), json!(contract.metadata));
    }
    Json::Object(out)
}

/// Renders one side of a contract, without the version tag.
pub fn render_schema<S: SchemaView + ?Sized>(schema: &S, options: &RenderOptions) -> Json {
    let obligations: Vec<Json> = schema
        .obligations()
        .iter()
        .map(|o| render_obligation(o, options))
        .collect();
    let opaque: Vec<Json> = schema.opaque_regions().iter().map(render_region).collect();
    json!({
        "root": render_node(schema.root(), options),
        "obligations": obligations,
        "opaque_regions": opaque,
    })
}

pub fn render_node(node: &Node, options: &RenderOptions) -> Json {
    let mut out = Map::new();
    out.insert("kind".into(), json!(node.kind.name()));
    out.insert("required".into(), json!(node.required));
    match node.kind {
        NodeKind::Object => {
            out.insert("open".into(), json!(node.open));
            let children: Map<String, Json> = node
                .children
                .iter()
                .map(|(name, child)| (name.clone(), render_node(child, options)))
                .collect();
            out.insert("children".into(), Json::Object(children));
        }
        NodeKind::Array | NodeKind::Set => {
            if let Some(element) = &node.element {
                out.insert("element".into(), render_node(element, options));
            }
        }
        NodeKind::Union => {
            let rendered: Vec<Json> = node.options.iter().map(|o| render_node(o, options)).collect();
            out.insert("options".into(), Json::Array(rendered));
        }
        _ => {}
    }
    if !node.domains.is_empty() {
        let domains: Vec<Json> = node.domains.iter().map(render_domain).collect();
        out.insert("domains".into(), Json::Array(domains));
    }
    if options.debug {
        if let Some(origin) = node.origin {
            out.insert("origin".into(), json!(origin.to_string()));
        }
    }
    Json::Object(out)
}

fn render_domain(domain: &ValueDomain) -> Json {
    match domain {
        ValueDomain::EnumText { values } => json!({ "enum": values }),
        ValueDomain::NumberRange {
            min,
            max,
            integer_only,
        } => {
            let mut out = Map::new();
            if let Some(min) = min {
                out.insert("min".into(), json!(min));
            }
            if let Some(max) = max {
                out.insert("max".into(), json!(max));
            }
            out.insert("integer_only".into(), json!(integer_only));
            Json::Object(out)
        }
        ValueDomain::Regex { pattern } => json!({ "regex": pattern }),
    }
}

fn render_obligation(obligation: &Obligation, options: &RenderOptions) -> Json {
    let mut out = Map::new();
    out.insert("expr".into(), json!(obligation.expr.to_string()));
    if options.debug {
        out.insert("confidence".into(), json!(obligation.confidence));
        out.insert("heuristic".into(), json!(obligation.heuristic));
        out.insert("rule_id".into(), json!(obligation.rule_id));
    }
    Json::Object(out)
}

fn render_region(region: &OpaqueRegion) -> Json {
    json!({
        "path": region.path.to_string(),
        "reason": region.reason.to_string(),
    })
}

pub fn render_v2(contract: &ContractV2) -> serde_json::Result<Json> {
    Ok(tagged(VERSION_V2, serde_json::to_value(contract)?))
}

pub fn render_v1(contract: &ContractV1) -> serde_json::Result<Json> {
    Ok(tagged(VERSION_V1, serde_json::to_value(contract)?))
}

fn tagged(version: u32, body: Json) -> Json {
    let mut out = Map::new();
    out.insert("version".into(), json!(version));
    match body {
        Json::Object(fields) => out.extend(fields),
        other => {
            out.insert("contract".into(), other);
        }
    }
    Json::Object(out)
}
