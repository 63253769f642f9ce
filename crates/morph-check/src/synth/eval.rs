//! Abstract evaluation of expressions.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use morph_core::ast::{AccessExpr, BinaryOp, CaseArm, Expr, Literal, ObjectKey, UnaryOp};
use morph_core::{
    AccessPath, AccessSegment, FieldShape, ObjectShape, Obligation, ObligationExpr, OpaqueReason,
    ValueShape,
};

use super::builtins;
use super::env::{AbstractValue, Env, Evidence};
use super::{reason_for_key, Synthesizer, RULE_COALESCE, RULE_INDEX_EXISTS};

impl Synthesizer<'_> {
    /// Evaluates `expr` abstractly, recording input reads along the way.
    pub(super) fn eval(&mut self, env: &Env, expr: &Expr) -> AbstractValue {
        if self.depth >= self.config.max_depth {
            tracing::debug!(max_depth = self.config.max_depth, "expression too deep; result is unknown");
            return AbstractValue::unknown();
        }
        self.depth += 1;
        let value = self.eval_inner(env, expr);
        self.depth -= 1;
        value
    }

    fn eval_inner(&mut self, env: &Env, expr: &Expr) -> AbstractValue {
        match expr {
            Expr::Identifier(name) => self.eval_identifier(env, name),
            Expr::Access { base, segment } => {
                let base = self.eval(env, base);
                match segment {
                    AccessExpr::Field(name) => self.access_field(env, base, name),
                    AccessExpr::Index(index) => self.access_index(env, base, *index),
                    AccessExpr::Dynamic(key) => {
                        let key = self.eval(env, key);
                        self.access_dynamic(base, &key.shape)
                    }
                }
            }
            Expr::Literal(literal) => {
                let value = AbstractValue::of(literal.shape());
                match literal {
                    Literal::Text(text) => value.with_evidence(Evidence::text(text)),
                    _ => value,
                }
            }
            Expr::Object(entries) => {
                let mut object = ObjectShape::closed();
                let mut evidence = IndexMap::new();
                let mut computed = false;
                let mut result = AbstractValue::unknown();
                for entry in entries {
                    match &entry.key {
                        ObjectKey::Static(key) => {
                            let value = self.eval(env, &entry.value);
                            object
                                .fields
                                .insert(key.clone(), FieldShape::required(value.shape));
                            evidence.insert(key.clone(), value.evidence);
                            result.absorb_opaque(&AccessPath::fields(&[key]), &value.opaque);
                        }
                        ObjectKey::Computed(key) => {
                            self.eval(env, key);
                            let value = self.eval(env, &entry.value);
                            let region = AccessPath::root().child(AccessSegment::Dynamic);
                            tracing::debug!("computed object key; object left open");
                            computed = true;
                            object.closed = false;
                            result.absorb_opaque(
                                &AccessPath::root(),
                                &[(region.clone(), OpaqueReason::Key)],
                            );
                            result.absorb_opaque(&region, &value.opaque);
                        }
                    }
                }
                result.shape = ValueShape::Object(object);
                result.evidence = if computed {
                    Evidence::Unconstrained
                } else {
                    Evidence::Fields(evidence)
                };
                result
            }
            Expr::Array(items) => {
                let mut element = AbstractValue::of(ValueShape::Never);
                for item in items {
                    let value = self.eval(env, item);
                    element = element.merge(&value);
                }
                let mut result = AbstractValue::of(ValueShape::array(element.shape))
                    .with_evidence(Evidence::Elements(Box::new(element.evidence)));
                result.absorb_opaque(
                    &AccessPath::root().child(AccessSegment::Dynamic),
                    &element.opaque,
                );
                result
            }
            Expr::Comprehension {
                binding,
                iterable,
                mapper,
                filter,
            } => {
                let iterable = self.eval(env, iterable);
                self.constrain_iterable(&iterable);
                let element = self.element_of(&iterable);
                let mut inner = env.clone();
                inner.declare(binding, element);

                self.guard_depth += 1;
                if let Some(filter) = filter {
                    self.eval(&inner, filter);
                }
                let mapped = self.eval(&inner, mapper);
                self.guard_depth -= 1;

                let mut result = AbstractValue::of(ValueShape::array(mapped.shape))
                    .with_evidence(Evidence::Elements(Box::new(mapped.evidence)));
                result.absorb_opaque(
                    &AccessPath::root().child(AccessSegment::Dynamic),
                    &mapped.opaque,
                );
                result
            }
            Expr::Call { name, args } => {
                let args: Vec<AbstractValue> = args.iter().map(|a| self.eval(env, a)).collect();
                self.eval_call(name, args)
            }
            Expr::Invoke { callee, args } => {
                let callee = self.eval(env, callee);
                let mut result = AbstractValue::unknown();
                result.provenance = callee.provenance;
                for arg in args {
                    let arg = self.eval(env, arg);
                    result.provenance.extend(arg.provenance);
                }
                tracing::trace!("invocation of a computed callee; result is unknown");
                result
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(env, operand);
                match op {
                    UnaryOp::Not => AbstractValue::of(ValueShape::Boolean),
                    UnaryOp::Neg => {
                        self.constrain_sources(&operand, &ValueShape::Number);
                        AbstractValue::of(ValueShape::Number)
                    }
                }
            }
            Expr::Binary {
                op: BinaryOp::Coalesce,
                ..
            } => self.eval_coalesce(env, expr),
            Expr::Binary { op, left, right } => self.eval_binary(env, *op, left, right),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                self.guard_depth += 1;
                let value = self.eval_branches(env, condition, then_value, else_value);
                self.guard_depth -= 1;
                value
            }
            Expr::Case { arms, otherwise } => self.eval_case(env, arms, otherwise.as_deref()),
            Expr::TryCatch { body, fallback } => {
                self.guard_depth += 1;
                let body = self.eval(env, body);
                let fallback = self.eval(env, fallback);
                self.guard_depth -= 1;
                body.merge(&fallback)
            }
        }
    }

    fn eval_identifier(&mut self, env: &Env, name: &str) -> AbstractValue {
        if let Some(value) = env.vars.get(name) {
            return value.clone();
        }
        let root = self.input_root();
        if name == self.config.input_alias {
            return root;
        }
        // A free identifier names a top-level input field.
        self.access_field(env, root, name)
    }

    fn input_root(&self) -> AbstractValue {
        AbstractValue::of(self.seed.cloned().unwrap_or(ValueShape::Unknown))
            .with_evidence(Evidence::Unconstrained)
            .with_provenance(BTreeSet::from([AccessPath::root()]))
    }

    // -----------------------------------------------------------------------
    // Member access
    // -----------------------------------------------------------------------

    fn access_field(&mut self, env: &Env, base: AbstractValue, name: &str) -> AbstractValue {
        let segment = AccessSegment::Field(name.to_string());
        let mut shape = base.shape.field_shape(name);

        match base.single_static_source().cloned() {
            Some(source) => {
                let path = source.field(name);
                if let Some(narrowed) = env.input_overlay.get(&path) {
                    shape = narrowed.clone();
                }
                let required = self.required_here();
                self.requirements.record(&path, &shape, required);
            }
            None => {
                for source in &base.provenance {
                    if source.has_dynamic() {
                        self.register_dynamic_source(source);
                    } else {
                        // Several possible sources: none of them is certain.
                        self.requirements.record(&source.field(name), &shape, false);
                    }
                }
            }
        }

        AbstractValue {
            shape,
            provenance: extend_all(&base.provenance, &segment),
            evidence: base.evidence.field(name),
            opaque: descend_opaque(&base.opaque, &segment),
        }
    }

    fn access_index(&mut self, env: &Env, base: AbstractValue, index: i64) -> AbstractValue {
        let segment = AccessSegment::Index(index);
        let mut shape = match base.shape.element_shape() {
            ValueShape::Unknown => ValueShape::Unknown,
            // Out-of-range reads yield null.
            element => element.nullable(),
        };

        match base.single_static_source().cloned() {
            Some(source) => {
                let path = source.child(segment.clone());
                if let Some(narrowed) = env.input_overlay.get(&path) {
                    shape = narrowed.clone();
                }
                let required = self.required_here();
                self.requirements.record(&path, &shape, required);
                let min_count = usize::try_from(index).ok().and_then(|i| i.checked_add(1));
                if let Some(min_count) = min_count.filter(|_| !source.is_empty()) {
                    self.input_obligations.push(
                        Obligation::certain(
                            ObligationExpr::Exists {
                                path: source,
                                min_count,
                            },
                            RULE_INDEX_EXISTS,
                        )
                        .with_confidence(0.5)
                        .heuristic(),
                    );
                }
            }
            None => {
                for source in &base.provenance {
                    if source.has_dynamic() {
                        self.register_dynamic_source(source);
                    }
                }
            }
        }

        AbstractValue {
            shape,
            provenance: extend_all(&base.provenance, &segment),
            evidence: base.evidence.element(),
            opaque: descend_opaque(&base.opaque, &segment),
        }
    }

    /// `base[key]` with a computed key: the result is unknown and the region
    /// below the base is opaque.
    fn access_dynamic(&mut self, base: AbstractValue, key: &ValueShape) -> AbstractValue {
        let reason = reason_for_key(key);
        for source in &base.provenance {
            if source.has_dynamic() {
                self.register_dynamic_source(source);
            } else {
                self.register_opaque(source.child(AccessSegment::Dynamic), reason);
            }
        }
        let mut value = AbstractValue::unknown();
        value.provenance = extend_all(&base.provenance, &AccessSegment::Dynamic);
        value
    }

    /// Reading below a loop element makes the iterated region opaque.
    fn register_dynamic_source(&mut self, source: &AccessPath) {
        let mut region = source.static_prefix();
        region.push(AccessSegment::Dynamic);
        self.register_opaque(region, OpaqueReason::Index);
    }

    // -----------------------------------------------------------------------
    // Calls and operators
    // -----------------------------------------------------------------------

    fn eval_call(&mut self, name: &str, args: Vec<AbstractValue>) -> AbstractValue {
        if let Some(host) = self.hosts.iter().find(|h| h.name.eq_ignore_ascii_case(name)) {
            for (arg, param) in args.iter().zip(&host.params) {
                if !param.is_unknown() {
                    self.constrain_sources(arg, param);
                }
            }
            return AbstractValue::of(host.returns.clone());
        }

        if let Some(builtin) = builtins::lookup(name) {
            let first = args.first();
            if let (Some(arg), Some(expected)) = (first, builtin.first_arg.shape()) {
                self.constrain_sources(arg, &expected);
            }
            let mut value = AbstractValue::of(builtin.result_shape(first.map(|a| &a.shape)));
            if let Some(arg) = first {
                if builtin.threads_provenance() {
                    value.provenance = arg.provenance.clone();
                }
                if builtin.returns == builtins::ReturnRule::FirstArg {
                    value.evidence = arg.evidence.clone();
                }
            }
            return value;
        }

        tracing::debug!(function = %name, "unknown function; result is unknown");
        let mut value = AbstractValue::unknown();
        for arg in args {
            value.provenance.extend(arg.provenance);
        }
        value
    }

    /// Back-propagates an expected shape onto the input paths `value` came from.
    pub(super) fn constrain_sources(&mut self, value: &AbstractValue, expected: &ValueShape) {
        for path in &value.provenance {
            self.requirements.constrain(path, expected);
        }
    }

    fn eval_binary(&mut self, env: &Env, op: BinaryOp, left: &Expr, right: &Expr) -> AbstractValue {
        let l = self.eval(env, left);
        let r = if matches!(op, BinaryOp::And | BinaryOp::Or) {
            // Short-circuit: the right operand may not be evaluated.
            self.guard_depth += 1;
            let r = self.eval(env, right);
            self.guard_depth -= 1;
            r
        } else {
            self.eval(env, right)
        };

        match op {
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.constrain_sources(&l, &ValueShape::Number);
                self.constrain_sources(&r, &ValueShape::Number);
                AbstractValue::of(ValueShape::Number)
            }
            BinaryOp::Add => {
                let numeric = |s: &ValueShape| *s == ValueShape::Number;
                let textual = |s: &ValueShape| *s == ValueShape::Text;
                let shape = if numeric(&l.shape) && numeric(&r.shape) {
                    ValueShape::Number
                } else if textual(&l.shape) || textual(&r.shape) {
                    ValueShape::Text
                } else {
                    ValueShape::union([ValueShape::Number, ValueShape::Text])
                };
                AbstractValue::of(shape)
            }
            BinaryOp::Concat => AbstractValue::of(ValueShape::Text),
            BinaryOp::Coalesce => l.merge(&r),
            _ => AbstractValue::of(ValueShape::Boolean),
        }
    }

    /// `a ?? b ?? ... ?? z`, evaluated as one chain.
    fn eval_coalesce(&mut self, env: &Env, expr: &Expr) -> AbstractValue {
        let mut operands = Vec::new();
        flatten_coalesce(expr, &mut operands);

        self.guard_depth += 1;
        let values: Vec<AbstractValue> = operands.iter().map(|e| self.eval(env, e)).collect();
        self.guard_depth -= 1;

        let last = values.len().saturating_sub(1);
        let mut result = AbstractValue::of(ValueShape::Never);
        for (i, value) in values.iter().enumerate() {
            let mut part = value.clone();
            if i < last {
                part.shape = part.shape.without_null();
            }
            result = result.merge(&part);
        }

        let fallback = operands.last().copied().filter(|e| is_constant(e));
        let alternatives = operands.len() - usize::from(fallback.is_some());

        let mut paths = Vec::new();
        for (operand, value) in operands.iter().zip(&values).take(alternatives) {
            match (operand.static_path(), value.single_static_source()) {
                (Some(_), Some(path)) if !path.is_empty() => paths.push(path.clone()),
                _ => {
                    paths.clear();
                    break;
                }
            }
        }
        if paths.len() >= 2 {
            for path in &paths {
                self.requirements.force_optional(path);
            }
            tracing::debug!(alternatives = paths.len(), "coalesce chain requires one of its inputs");
            self.input_obligations.push(
                Obligation::certain(
                    ObligationExpr::OneOf {
                        children: paths.into_iter().map(ObligationExpr::non_null).collect(),
                    },
                    RULE_COALESCE,
                )
                .with_confidence(0.9),
            );
        }

        if let Some(Expr::Literal(literal)) = fallback {
            if *literal != Literal::Null {
                let constraint = literal.shape().nullable();
                for value in values.iter().take(alternatives) {
                    if value.shape.is_unknown() {
                        if let Some(path) = value.single_static_source() {
                            self.requirements.constrain(path, &constraint);
                        }
                    }
                }
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Conditionals
    // -----------------------------------------------------------------------

    /// Evaluates both arms of a conditional under the refinements of its
    /// condition. An arm whose refinements are contradictory is skipped.
    fn eval_branches(
        &mut self,
        env: &Env,
        condition: &Expr,
        then_value: &Expr,
        else_value: &Expr,
    ) -> AbstractValue {
        self.eval(env, condition);
        let refinements = super::refine::derive(
            condition,
            &|name: &str| env.is_local(name),
            &self.config.input_alias,
        );

        let mut then_env = env.clone();
        self.apply_rules(&mut then_env, &refinements.then_rules);
        let mut else_env = env.clone();
        self.apply_rules(&mut else_env, &refinements.else_rules);

        let mut result = AbstractValue::of(ValueShape::Never);
        if !then_env.terminated {
            result = result.merge(&self.eval(&then_env, then_value));
        }
        if !else_env.terminated {
            result = result.merge(&self.eval(&else_env, else_value));
        }
        result
    }

    /// Arms are tried in order; each later arm runs under the negation of
    /// every earlier condition. Without `ELSE`, falling through yields null.
    fn eval_case(&mut self, env: &Env, arms: &[CaseArm], otherwise: Option<&Expr>) -> AbstractValue {
        // Only the first condition is evaluated unconditionally.
        if let Some(first) = arms.first() {
            self.eval(env, &first.when);
        }
        self.guard_depth += 1;

        let mut remaining = env.clone();
        let mut result = AbstractValue::of(ValueShape::Never);
        for (i, arm) in arms.iter().enumerate() {
            if remaining.terminated {
                break;
            }
            if i > 0 {
                self.eval(&remaining, &arm.when);
            }
            let refinements = super::refine::derive(
                &arm.when,
                &|name: &str| remaining.is_local(name),
                &self.config.input_alias,
            );
            let mut then_env = remaining.clone();
            self.apply_rules(&mut then_env, &refinements.then_rules);
            if !then_env.terminated {
                result = result.merge(&self.eval(&then_env, &arm.then));
            }
            self.apply_rules(&mut remaining, &refinements.else_rules);
        }

        if !remaining.terminated {
            let value = match otherwise {
                Some(otherwise) => self.eval(&remaining, otherwise),
                None => AbstractValue::of(ValueShape::Null),
            };
            result = result.merge(&value);
        }
        self.guard_depth -= 1;
        result
    }
}

fn extend_all(provenance: &BTreeSet<AccessPath>, segment: &AccessSegment) -> BTreeSet<AccessPath> {
    provenance.iter().map(|p| p.child(segment.clone())).collect()
}

/// Opaque entries of a value, as seen from inside one of its children.
fn descend_opaque(
    opaque: &[(AccessPath, OpaqueReason)],
    segment: &AccessSegment,
) -> Vec<(AccessPath, OpaqueReason)> {
    opaque
        .iter()
        .filter_map(|(path, reason)| {
            let (first, rest) = path.segments().split_first()?;
            let matches = first == segment
                || matches!(first, AccessSegment::Dynamic)
                || matches!(
                    (first, segment),
                    (AccessSegment::Dynamic | AccessSegment::Index(_), AccessSegment::Index(_))
                );
            matches.then(|| (AccessPath::from_segments(rest.iter().cloned()), *reason))
        })
        .filter(|(path, _)| !path.is_empty())
        .collect()
}

fn flatten_coalesce<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::Coalesce,
            left,
            right,
        } => {
            flatten_coalesce(left, out);
            flatten_coalesce(right, out);
        }
        other => out.push(other),
    }
}

/// A literal, or an object/array literal built only from constants.
fn is_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) => true,
        Expr::Object(entries) => entries
            .iter()
            .all(|e| matches!(e.key, ObjectKey::Static(_)) && is_constant(&e.value)),
        Expr::Array(items) => items.iter().all(is_constant),
        _ => false,
    }
}
