//! Known signatures of built-in and host functions.
//!
//! Built-ins are grouped in families (text, numeric, collection, predicate,
//! bytes). Each entry says what its arguments are expected to be, which is
//! back-propagated onto the arguments' input provenance, and how its result
//! shape is derived.

use morph_core::ValueShape;
use serde::{Deserialize, Serialize};

/// Signature of a host function supplied by the embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSignature {
    pub name: String,
    /// Expected shape per positional argument. `Unknown` places no constraint.
    pub params: Vec<ValueShape>,
    pub returns: ValueShape,
}

impl HostSignature {
    pub fn new(name: &str, params: Vec<ValueShape>, returns: ValueShape) -> Self {
        HostSignature {
            name: name.to_string(),
            params,
            returns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Text,
    Numeric,
    Collection,
    Predicate,
    Bytes,
}

/// Expected shape of arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRule {
    Free,
    Text,
    Number,
    Iterable,
    NumberList,
    Object,
}

impl ArgRule {
    pub fn shape(self) -> Option<ValueShape> {
        match self {
            ArgRule::Free => None,
            ArgRule::Text => Some(ValueShape::Text),
            ArgRule::Number => Some(ValueShape::Number),
            ArgRule::Iterable => Some(iterable()),
            ArgRule::NumberList => Some(ValueShape::array(ValueShape::Number)),
            ArgRule::Object => Some(ValueShape::open_object()),
        }
    }
}

/// How the result shape is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnRule {
    Text,
    Number,
    Boolean,
    Bytes,
    TextList,
    /// Same shape as the first argument.
    FirstArg,
    /// An element of the first argument, or null when it is empty.
    ElementOfFirst,
    /// An array of the first argument's elements.
    ElementsOfFirst,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub family: Family,
    /// Rule for the first argument; the rest are unconstrained.
    pub first_arg: ArgRule,
    pub returns: ReturnRule,
}

const fn builtin(name: &'static str, family: Family, first_arg: ArgRule, returns: ReturnRule) -> Builtin {
    Builtin {
        name,
        family,
        first_arg,
        returns,
    }
}

pub const BUILTINS: &[Builtin] = &[
    // text
    builtin("UPPER", Family::Text, ArgRule::Text, ReturnRule::Text),
    builtin("LOWER", Family::Text, ArgRule::Text, ReturnRule::Text),
    builtin("TRIM", Family::Text, ArgRule::Text, ReturnRule::Text),
    builtin("SUBSTRING", Family::Text, ArgRule::Text, ReturnRule::Text),
    builtin("REPLACE", Family::Text, ArgRule::Text, ReturnRule::Text),
    builtin("CONCAT", Family::Text, ArgRule::Free, ReturnRule::Text),
    builtin("TEXT", Family::Text, ArgRule::Free, ReturnRule::Text),
    builtin("STRING", Family::Text, ArgRule::Free, ReturnRule::Text),
    builtin("SPLIT", Family::Text, ArgRule::Text, ReturnRule::TextList),
    builtin("JOIN", Family::Text, ArgRule::Iterable, ReturnRule::Text),
    builtin("FORMAT_DATE", Family::Text, ArgRule::Free, ReturnRule::Text),
    // numeric
    builtin("NUMBER", Family::Numeric, ArgRule::Number, ReturnRule::Number),
    builtin("ABS", Family::Numeric, ArgRule::Number, ReturnRule::Number),
    builtin("ROUND", Family::Numeric, ArgRule::Number, ReturnRule::Number),
    builtin("FLOOR", Family::Numeric, ArgRule::Number, ReturnRule::Number),
    builtin("CEIL", Family::Numeric, ArgRule::Number, ReturnRule::Number),
    builtin("MIN", Family::Numeric, ArgRule::Free, ReturnRule::Number),
    builtin("MAX", Family::Numeric, ArgRule::Free, ReturnRule::Number),
    builtin("SUM", Family::Numeric, ArgRule::NumberList, ReturnRule::Number),
    builtin("AVG", Family::Numeric, ArgRule::NumberList, ReturnRule::Number),
    builtin("LENGTH", Family::Numeric, ArgRule::Free, ReturnRule::Number),
    builtin("COUNT", Family::Numeric, ArgRule::Iterable, ReturnRule::Number),
    // collections
    builtin("KEYS", Family::Collection, ArgRule::Object, ReturnRule::TextList),
    builtin("VALUES", Family::Collection, ArgRule::Object, ReturnRule::Unknown),
    builtin("SORT", Family::Collection, ArgRule::Iterable, ReturnRule::FirstArg),
    builtin("REVERSE", Family::Collection, ArgRule::Iterable, ReturnRule::FirstArg),
    builtin("DISTINCT", Family::Collection, ArgRule::Iterable, ReturnRule::ElementsOfFirst),
    builtin("FIRST", Family::Collection, ArgRule::Iterable, ReturnRule::ElementOfFirst),
    builtin("LAST", Family::Collection, ArgRule::Iterable, ReturnRule::ElementOfFirst),
    builtin("FLATTEN", Family::Collection, ArgRule::Iterable, ReturnRule::Unknown),
    // predicates
    builtin("IS_OBJECT", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("IS_ARRAY", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("IS_NULL", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("IS_TEXT", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("IS_NUMBER", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("CONTAINS", Family::Predicate, ArgRule::Free, ReturnRule::Boolean),
    builtin("STARTS_WITH", Family::Predicate, ArgRule::Text, ReturnRule::Boolean),
    builtin("ENDS_WITH", Family::Predicate, ArgRule::Text, ReturnRule::Boolean),
    builtin("MATCHES", Family::Predicate, ArgRule::Text, ReturnRule::Boolean),
    // bytes
    builtin("BASE64_DECODE", Family::Bytes, ArgRule::Text, ReturnRule::Bytes),
    builtin("BASE64_ENCODE", Family::Bytes, ArgRule::Free, ReturnRule::Text),
];

/// Looks up a built-in by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

/// `Array<Unknown> | Set<Unknown>`
pub fn iterable() -> ValueShape {
    ValueShape::union([
        ValueShape::array(ValueShape::Unknown),
        ValueShape::set(ValueShape::Unknown),
    ])
}

impl Builtin {
    /// Result shape given the shape of the first argument.
    pub fn result_shape(&self, first: Option<&ValueShape>) -> ValueShape {
        let first = first.cloned().unwrap_or(ValueShape::Unknown);
        match self.returns {
            ReturnRule::Text => ValueShape::Text,
            ReturnRule::Number => ValueShape::Number,
            ReturnRule::Boolean => ValueShape::Boolean,
            ReturnRule::Bytes => ValueShape::Bytes,
            ReturnRule::TextList => ValueShape::array(ValueShape::Text),
            ReturnRule::FirstArg => first,
            ReturnRule::ElementOfFirst => match first.element_shape() {
                ValueShape::Unknown => ValueShape::Unknown,
                element => element.nullable(),
            },
            ReturnRule::ElementsOfFirst => ValueShape::array(first.element_shape()),
            ReturnRule::Unknown => ValueShape::Unknown,
        }
    }

    /// Whether the result is the first argument transformed in kind, so
    /// constraints on the result also hold for the argument's source.
    pub fn threads_provenance(&self) -> bool {
        matches!(
            (self.first_arg, self.returns),
            (ArgRule::Text, ReturnRule::Text)
                | (ArgRule::Number, ReturnRule::Number)
                | (
                    ArgRule::Iterable,
                    ReturnRule::FirstArg | ReturnRule::ElementsOfFirst
                )
        )
    }
}
