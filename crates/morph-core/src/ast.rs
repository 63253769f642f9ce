//! The transform-language AST as produced by the external parser.
//!
//! The contract engine only reads these nodes; it never executes them. The
//! constructor helpers at the bottom exist for embedders and tests that build
//! trees by hand instead of parsing source text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::path::AccessSegment;
use crate::shape::{FieldShape, ObjectShape, ValueShape};

/// A parsed transform: optional declared signature plus a statement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    pub body: Vec<Stmt>,
}

/// A declared `input -> output` type signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub input: TypeRef,
    pub output: TypeRef,
}

/// A declared type as written in a transform signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    /// The wildcard `any`.
    Any,
    Null,
    Boolean,
    Number,
    Bytes,
    Text,
    /// Text restricted to literal values (`"a" | "b"`).
    TextEnum(Vec<String>),
    Array(Box<TypeRef>),
    Set(Box<TypeRef>),
    Object {
        fields: IndexMap<String, FieldTypeRef>,
        /// Declared with a trailing `...`: extra keys allowed.
        open: bool,
    },
    Union(Vec<TypeRef>),
    /// `T?`
    Nullable(Box<TypeRef>),
}

/// One declared object field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTypeRef {
    pub ty: TypeRef,
    #[serde(default)]
    pub optional: bool,
}

impl TypeRef {
    /// `any` or `any?`.
    pub fn is_wildcard(&self) -> bool {
        match self {
            TypeRef::Any => true,
            TypeRef::Nullable(inner) => matches!(**inner, TypeRef::Any),
            _ => false,
        }
    }

    /// `any?` specifically.
    pub fn is_nullable_wildcard(&self) -> bool {
        matches!(self, TypeRef::Nullable(inner) if matches!(**inner, TypeRef::Any))
    }

    /// The structural shape this declaration describes. Text enums become
    /// plain text; the literal set survives only in the node tree.
    pub fn to_shape(&self) -> ValueShape {
        match self {
            TypeRef::Any => ValueShape::Unknown,
            TypeRef::Null => ValueShape::Null,
            TypeRef::Boolean => ValueShape::Boolean,
            TypeRef::Number => ValueShape::Number,
            TypeRef::Bytes => ValueShape::Bytes,
            TypeRef::Text | TypeRef::TextEnum(_) => ValueShape::Text,
            TypeRef::Array(elem) => ValueShape::array(elem.to_shape()),
            TypeRef::Set(elem) => ValueShape::set(elem.to_shape()),
            TypeRef::Object { fields, open } => {
                let mut object = ObjectShape {
                    fields: IndexMap::new(),
                    closed: !open,
                };
                for (name, field) in fields {
                    let shape = field.ty.to_shape();
                    let field_shape = if field.optional {
                        FieldShape::optional(shape)
                    } else {
                        FieldShape::required(shape)
                    };
                    object.fields.insert(name.clone(), field_shape);
                }
                ValueShape::Object(object)
            }
            TypeRef::Union(options) => ValueShape::union(options.iter().map(TypeRef::to_shape)),
            TypeRef::Nullable(inner) => inner.to_shape().nullable(),
        }
    }
}

/// Statements of a transform body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// `LET name = value`
    Let { name: String, value: Expr },
    /// `SET name = value` on a plain variable.
    SetVar { name: String, value: Expr },
    /// `APPEND value TO name`
    AppendToVar { name: String, value: Expr },
    /// `SET base.path = value`
    Set { target: Target, value: Expr },
    /// `APPEND value TO base.path`
    AppendTo { target: Target, value: Expr },
    /// `MODIFY base.path WITH { ... }`
    Modify { target: Target, updates: Expr },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_branch: Option<Vec<Stmt>>,
    },
    ForEach {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    TryCatch {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_binding: Option<String>,
        fallback: Vec<Stmt>,
    },
    Output { value: Expr },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
    Abort {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Expr>,
    },
}

/// Write target of `SET`/`APPEND TO`/`MODIFY`: a base variable and a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub base: String,
    #[serde(default)]
    pub segments: Vec<AccessExpr>,
}

impl Target {
    pub fn var(base: &str) -> Self {
        Target {
            base: base.to_string(),
            segments: Vec::new(),
        }
    }

    pub fn path<S: AsRef<str>>(base: &str, fields: &[S]) -> Self {
        Target {
            base: base.to_string(),
            segments: fields
                .iter()
                .map(|f| AccessExpr::Field(f.as_ref().to_string()))
                .collect(),
        }
    }

    pub fn dot(mut self, name: &str) -> Self {
        self.segments.push(AccessExpr::Field(name.to_string()));
        self
    }

    pub fn dynamic(mut self, key: Expr) -> Self {
        self.segments.push(AccessExpr::Dynamic(Box::new(key)));
        self
    }
}

/// One step of a member access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessExpr {
    Field(String),
    Index(i64),
    /// `base[expr]` with a computed key or index.
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Literal {
    pub fn shape(&self) -> ValueShape {
        match self {
            Literal::Null => ValueShape::Null,
            Literal::Bool(_) => ValueShape::Boolean,
            Literal::Number(_) => ValueShape::Number,
            Literal::Text(_) => ValueShape::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `a ?? b`
    Coalesce,
}

/// One `key: value` entry of an object literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKey {
    Static(String),
    /// `[expr]: value`
    Computed(Expr),
}

/// `WHEN condition THEN value` arm of a `CASE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    pub when: Expr,
    pub then: Expr,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Identifier(String),
    Access {
        base: Box<Expr>,
        segment: AccessExpr,
    },
    Literal(Literal),
    Object(Vec<ObjectEntry>),
    Array(Vec<Expr>),
    /// `[mapper FOR binding IN iterable IF filter]`
    Comprehension {
        binding: String,
        iterable: Box<Expr>,
        mapper: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Box<Expr>>,
    },
    /// Call of a named built-in or host function.
    Call { name: String, args: Vec<Expr> },
    /// Call of a computed callee (lambda value).
    Invoke { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Case {
        arms: Vec<CaseArm>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Expr>>,
    },
    /// `TRY body CATCH fallback`
    TryCatch { body: Box<Expr>, fallback: Box<Expr> },
}

impl Expr {
    pub fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    /// `base.name`
    pub fn dot(self, name: &str) -> Expr {
        Expr::Access {
            base: Box::new(self),
            segment: AccessExpr::Field(name.to_string()),
        }
    }

    /// `base[index]` with a literal index.
    pub fn at(self, index: i64) -> Expr {
        Expr::Access {
            base: Box::new(self),
            segment: AccessExpr::Index(index),
        }
    }

    /// `base[key]` with a computed key.
    pub fn dynamic(self, key: Expr) -> Expr {
        Expr::Access {
            base: Box::new(self),
            segment: AccessExpr::Dynamic(Box::new(key)),
        }
    }

    /// `root.a.b.c` from a dotted list of field names.
    pub fn path<S: AsRef<str>>(root: &str, fields: &[S]) -> Expr {
        fields
            .iter()
            .fold(Expr::ident(root), |acc, f| acc.dot(f.as_ref()))
    }

    pub fn null() -> Expr {
        Expr::Literal(Literal::Null)
    }

    pub fn boolean(b: bool) -> Expr {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn number(n: i64) -> Expr {
        Expr::Literal(Literal::Number(Number::from(n)))
    }

    pub fn text(s: &str) -> Expr {
        Expr::Literal(Literal::Text(s.to_string()))
    }

    /// Object literal with static keys.
    pub fn object<'a>(entries: impl IntoIterator<Item = (&'a str, Expr)>) -> Expr {
        Expr::Object(
            entries
                .into_iter()
                .map(|(k, v)| ObjectEntry {
                    key: ObjectKey::Static(k.to_string()),
                    value: v,
                })
                .collect(),
        )
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::NotEq, left, right)
    }

    pub fn not(operand: Expr) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    /// `a ?? b ?? c`, nested to the right.
    pub fn coalesce(operands: Vec<Expr>) -> Expr {
        let mut iter = operands.into_iter().rev();
        let last = iter.next().unwrap_or_else(Expr::null);
        iter.fold(last, |acc, e| Expr::binary(BinaryOp::Coalesce, e, acc))
    }

    pub fn ternary(condition: Expr, then_value: Expr, else_value: Expr) -> Expr {
        Expr::Ternary {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Decomposes an identifier/access chain with only static segments into
    /// its root name and segments. Returns `None` if any step is dynamic or
    /// the chain is rooted in something other than an identifier.
    pub fn static_path(&self) -> Option<(&str, Vec<AccessSegment>)> {
        match self {
            Expr::Identifier(name) => Some((name, Vec::new())),
            Expr::Access { base, segment } => {
                let (root, mut segments) = base.static_path()?;
                match segment {
                    AccessExpr::Field(name) => segments.push(AccessSegment::Field(name.clone())),
                    AccessExpr::Index(i) => segments.push(AccessSegment::Index(*i)),
                    AccessExpr::Dynamic(_) => return None,
                }
                Some((root, segments))
            }
            _ => None,
        }
    }
}
