//! Requirement and guarantee schemas, and the contract that pairs them.
//!
//! A [`Contract`] is built once per compiled transform and treated as
//! immutable afterwards; every consumer (renderer, enforcer, witness
//! generator) reads it through shared references only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::obligation::Obligation;
use crate::path::OpaqueRegion;

/// What the transform requires of its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSchema {
    pub root: Node,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub opaque_regions: Vec<OpaqueRegion>,
}

/// What the transform guarantees about its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeSchema {
    pub root: Node,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub opaque_regions: Vec<OpaqueRegion>,
    /// Some path may finish without emitting, or emit `null`.
    #[serde(default)]
    pub may_emit_null: bool,
}

/// Read access shared by both schema sides.
///
/// The validator, witness generator and renderer are written against this
/// trait so they treat requirements and guarantees uniformly.
pub trait SchemaView {
    fn root(&self) -> &Node;
    fn obligations(&self) -> &[Obligation];
    fn opaque_regions(&self) -> &[OpaqueRegion];

    /// Whether a `null` root value is acceptable regardless of the tree.
    fn accepts_null_root(&self) -> bool {
        false
    }
}

impl SchemaView for RequirementSchema {
    fn root(&self) -> &Node {
        &self.root
    }

    fn obligations(&self) -> &[Obligation] {
        &self.obligations
    }

    fn opaque_regions(&self) -> &[OpaqueRegion] {
        &self.opaque_regions
    }
}

impl SchemaView for GuaranteeSchema {
    fn root(&self) -> &Node {
        &self.root
    }

    fn obligations(&self) -> &[Obligation] {
        &self.obligations
    }

    fn opaque_regions(&self) -> &[OpaqueRegion] {
        &self.opaque_regions
    }

    fn accepts_null_root(&self) -> bool {
        self.may_emit_null
    }
}

impl RequirementSchema {
    /// A schema that accepts any input.
    pub fn permissive() -> Self {
        RequirementSchema {
            root: Node::any(),
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
        }
    }
}

impl GuaranteeSchema {
    /// A schema that promises nothing about the output.
    pub fn permissive() -> Self {
        GuaranteeSchema {
            root: Node::any(),
            obligations: Vec::new(),
            opaque_regions: Vec::new(),
            may_emit_null: true,
        }
    }
}

/// Where a contract came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractSource {
    /// Taken verbatim from a declared signature.
    Explicit,
    /// Produced (at least in part) by shape synthesis.
    Inferred,
}

/// Bookkeeping about how a contract was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    /// Name of the transform the contract describes.
    pub transform: String,
    /// The transform declared a signature.
    #[serde(default)]
    pub declared_signature: bool,
    /// Synthesis was seeded with the declared input type.
    #[serde(default)]
    pub seeded_input: bool,
}

/// The structural contract of one transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub input: RequirementSchema,
    pub output: GuaranteeSchema,
    pub source: ContractSource,
    #[serde(default)]
    pub metadata: ContractMetadata,
}

/// Which side of a contract something refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSide {
    Input,
    Output,
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSide::Input => f.write_str("input"),
            SchemaSide::Output => f.write_str("output"),
        }
    }
}
