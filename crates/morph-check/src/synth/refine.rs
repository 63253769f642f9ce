//! Refinement rules derived from branch conditions.
//!
//! Recognized patterns: `x == null`, `null == x`, `x != null`, `IS_OBJECT(x)`,
//! combined with `AND`, `OR` and `NOT`. Each condition yields the rules that
//! hold in its true branch and in its false branch.

use morph_core::ast::{BinaryOp, Expr, Literal, UnaryOp};
use morph_core::{AccessPath, AccessSegment, ValueShape};

/// How a condition narrows its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrowing {
    NonNull,
    OnlyNull,
    ObjectOnly,
    NotObject,
}

impl Narrowing {
    pub fn apply(self, shape: &ValueShape) -> ValueShape {
        match self {
            Narrowing::NonNull => shape.without_null(),
            Narrowing::OnlyNull => shape.only_null(),
            Narrowing::ObjectOnly => shape.object_part(),
            Narrowing::NotObject => shape.without_object(),
        }
    }

    fn negate(self) -> Narrowing {
        match self {
            Narrowing::NonNull => Narrowing::OnlyNull,
            Narrowing::OnlyNull => Narrowing::NonNull,
            Narrowing::ObjectOnly => Narrowing::NotObject,
            Narrowing::NotObject => Narrowing::ObjectOnly,
        }
    }
}

/// What a rule narrows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineTarget {
    /// A local variable, or a static field path inside one.
    Local {
        name: String,
        segments: Vec<AccessSegment>,
    },
    /// A static input path.
    Input(AccessPath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub target: RefineTarget,
    pub narrowing: Narrowing,
}

/// Rules for the true and false outcomes of a condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refinements {
    pub then_rules: Vec<Rule>,
    pub else_rules: Vec<Rule>,
}

impl Refinements {
    fn single(target: RefineTarget, narrowing: Narrowing) -> Self {
        Refinements {
            then_rules: vec![Rule {
                target: target.clone(),
                narrowing,
            }],
            else_rules: vec![Rule {
                target,
                narrowing: narrowing.negate(),
            }],
        }
    }

    fn swap(self) -> Self {
        Refinements {
            then_rules: self.else_rules,
            else_rules: self.then_rules,
        }
    }
}

/// Derives refinements from `condition`.
///
/// `is_local` tells locals apart from free identifiers, which name top-level
/// input fields; `input_alias` names the input root.
pub fn derive(condition: &Expr, is_local: &dyn Fn(&str) -> bool, input_alias: &str) -> Refinements {
    match condition {
        Expr::Binary { op, left, right } => match op {
            BinaryOp::Eq | BinaryOp::NotEq => {
                let subject = match (left.as_ref(), right.as_ref()) {
                    (Expr::Literal(Literal::Null), other) | (other, Expr::Literal(Literal::Null)) => {
                        target_of(other, is_local, input_alias)
                    }
                    _ => None,
                };
                let Some(target) = subject else {
                    return Refinements::default();
                };
                let refinements = Refinements::single(target, Narrowing::OnlyNull);
                if *op == BinaryOp::Eq {
                    refinements
                } else {
                    refinements.swap()
                }
            }
            BinaryOp::And => {
                let l = derive(left, is_local, input_alias);
                let r = derive(right, is_local, input_alias);
                Refinements {
                    then_rules: [l.then_rules, r.then_rules].concat(),
                    else_rules: Vec::new(),
                }
            }
            BinaryOp::Or => {
                let l = derive(left, is_local, input_alias);
                let r = derive(right, is_local, input_alias);
                Refinements {
                    then_rules: Vec::new(),
                    else_rules: [l.else_rules, r.else_rules].concat(),
                }
            }
            _ => Refinements::default(),
        },
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => derive(operand, is_local, input_alias).swap(),
        Expr::Call { name, args } if name.eq_ignore_ascii_case("IS_OBJECT") && args.len() == 1 => {
            match target_of(&args[0], is_local, input_alias) {
                Some(target) => Refinements::single(target, Narrowing::ObjectOnly),
                None => Refinements::default(),
            }
        }
        _ => Refinements::default(),
    }
}

/// Resolves a static access chain to the thing a rule would narrow.
pub fn target_of(expr: &Expr, is_local: &dyn Fn(&str) -> bool, input_alias: &str) -> Option<RefineTarget> {
    let (root, segments) = expr.static_path()?;
    if is_local(root) {
        return Some(RefineTarget::Local {
            name: root.to_string(),
            segments,
        });
    }
    if root == input_alias {
        if segments.is_empty() {
            return None;
        }
        return Some(RefineTarget::Input(AccessPath::from_segments(segments)));
    }
    let mut path = AccessPath::fields(&[root]);
    for segment in segments {
        path.push(segment);
    }
    Some(RefineTarget::Input(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_locals(_: &str) -> bool {
        false
    }

    fn input(text: &str) -> RefineTarget {
        RefineTarget::Input(AccessPath::parse(text).unwrap())
    }

    #[test]
    fn eq_null_narrows_both_ways() {
        let cond = Expr::eq(Expr::path("input", &["a"]), Expr::null());
        let r = derive(&cond, &no_locals, "input");
        assert_eq!(r.then_rules[0].target, input("a"));
        assert_eq!(r.then_rules[0].narrowing, Narrowing::OnlyNull);
        assert_eq!(r.else_rules[0].narrowing, Narrowing::NonNull);
    }

    #[test]
    fn null_on_the_left_and_not_equal() {
        let cond = Expr::ne(Expr::null(), Expr::ident("meta"));
        let r = derive(&cond, &no_locals, "input");
        assert_eq!(r.then_rules[0].target, input("meta"));
        assert_eq!(r.then_rules[0].narrowing, Narrowing::NonNull);
        assert_eq!(r.else_rules[0].narrowing, Narrowing::OnlyNull);
    }

    #[test]
    fn is_object_narrows_to_object_part() {
        let cond = Expr::call("is_object", vec![Expr::ident("x")]);
        let r = derive(&cond, &|n: &str| n == "x", "input");
        assert_eq!(
            r.then_rules[0].target,
            RefineTarget::Local {
                name: "x".into(),
                segments: vec![]
            }
        );
        assert_eq!(r.then_rules[0].narrowing, Narrowing::ObjectOnly);
        assert_eq!(r.else_rules[0].narrowing, Narrowing::NotObject);
    }

    #[test]
    fn and_keeps_then_rules_or_keeps_else_rules() {
        let a = Expr::ne(Expr::ident("a"), Expr::null());
        let b = Expr::ne(Expr::ident("b"), Expr::null());
        let and = Expr::binary(BinaryOp::And, a.clone(), b.clone());
        let r = derive(&and, &no_locals, "input");
        assert_eq!(r.then_rules.len(), 2);
        assert!(r.else_rules.is_empty());

        let or = Expr::binary(BinaryOp::Or, a, b);
        let r = derive(&or, &no_locals, "input");
        assert!(r.then_rules.is_empty());
        assert_eq!(r.else_rules.len(), 2);
        assert!(r.else_rules.iter().all(|rule| rule.narrowing == Narrowing::OnlyNull));
    }

    #[test]
    fn not_swaps() {
        let cond = Expr::not(Expr::eq(Expr::ident("a"), Expr::null()));
        let r = derive(&cond, &no_locals, "input");
        assert_eq!(r.then_rules[0].narrowing, Narrowing::NonNull);
    }

    #[test]
    fn unrecognized_conditions_yield_nothing() {
        let cond = Expr::eq(Expr::ident("a"), Expr::number(1));
        assert_eq!(derive(&cond, &no_locals, "input"), Refinements::default());
    }
}
