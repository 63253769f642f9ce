pub mod ast;
pub mod domain;
pub mod error;
pub mod node;
pub mod obligation;
pub mod path;
pub mod schema;
pub mod shape;
pub mod value;

// Re-export commonly used types
pub use ast::{Expr, Signature, Stmt, Transform, TypeRef};
pub use domain::ValueDomain;
pub use error::CoreError;
pub use node::{Node, NodeKind};
pub use obligation::{Obligation, ObligationExpr};
pub use path::{AccessPath, AccessSegment, OpaqueReason, OpaqueRegion};
pub use schema::{
    Contract, ContractMetadata, ContractSource, GuaranteeSchema, RequirementSchema, SchemaSide,
    SchemaView,
};
pub use shape::{FieldShape, ObjectShape, Origin, ValueShape};
pub use value::Value;
