//! Shape synthesis: abstract interpretation of a transform body.
//!
//! The synthesizer walks statements with an abstract [`Env`] mapping locals to
//! [`AbstractValue`]s. Reads of the input (through the input alias or free
//! identifiers) are recorded as requirements; emitted values accumulate into
//! the output guarantee. Branches are analyzed on cloned environments and
//! joined afterwards. Nothing here fails: whatever cannot be determined
//! statically degrades to `Unknown` or an opaque region.

pub mod builtins;
pub mod env;
mod eval;
mod output;
pub mod refine;
pub mod requirements;

use morph_core::ast::{AccessExpr, Stmt, Target};
use morph_core::{
    AccessPath, AccessSegment, FieldShape, GuaranteeSchema, ObjectShape, Obligation, OpaqueReason,
    OpaqueRegion, Origin, RequirementSchema, ValueShape,
};

use crate::config::SynthesisConfig;
pub use builtins::HostSignature;
use env::{
    append_shape, narrow_shape, open_at, read_shape, tag_origin, write_shape, AbstractValue, Env,
    Evidence,
};
use refine::{RefineTarget, Rule};
use requirements::Requirements;

pub const RULE_COALESCE: &str = "coalesce-any-of";
pub const RULE_INDEX_EXISTS: &str = "index-exists";
pub const RULE_OUTPUT_FOR_ALL: &str = "output-for-all";

/// Result of synthesis: what the body requires and what it guarantees.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredContract {
    pub input: RequirementSchema,
    pub output: GuaranteeSchema,
}

/// Synthesizes a contract for `body` with the default configuration.
///
/// `seed` is the declared input shape, if any; input reads descend into it.
pub fn synthesize(
    body: &[Stmt],
    hosts: &[HostSignature],
    seed: Option<&ValueShape>,
) -> InferredContract {
    synthesize_with_config(body, hosts, seed, &SynthesisConfig::default())
}

pub fn synthesize_with_config(
    body: &[Stmt],
    hosts: &[HostSignature],
    seed: Option<&ValueShape>,
    config: &SynthesisConfig,
) -> InferredContract {
    let mut synth = Synthesizer::new(config, hosts, seed);
    let mut env = Env::default();
    synth.exec_block(&mut env, body);
    if !env.terminated && !env.emitted {
        synth.null_exit = true;
    }
    synth.finish()
}

/// What a path-targeted write does.
enum Write {
    Set(AbstractValue),
    Append(AbstractValue),
    Modify(AbstractValue),
}

pub(crate) struct Synthesizer<'a> {
    config: &'a SynthesisConfig,
    hosts: &'a [HostSignature],
    seed: Option<&'a ValueShape>,
    requirements: Requirements,
    input_obligations: Vec<Obligation>,
    input_opaque: Vec<OpaqueRegion>,
    output: Option<AbstractValue>,
    /// Some live path finishes without emitting.
    null_exit: bool,
    /// Nesting of conditionally executed code; reads at depth 0 are required.
    guard_depth: usize,
    /// Current expression nesting.
    depth: usize,
}

impl<'a> Synthesizer<'a> {
    fn new(
        config: &'a SynthesisConfig,
        hosts: &'a [HostSignature],
        seed: Option<&'a ValueShape>,
    ) -> Self {
        Synthesizer {
            config,
            hosts,
            seed,
            requirements: Requirements::default(),
            input_obligations: Vec::new(),
            input_opaque: Vec::new(),
            output: None,
            null_exit: false,
            guard_depth: 0,
            depth: 0,
        }
    }

    fn finish(self) -> InferredContract {
        let root = self.requirements.build_tree();

        let mut obligations: Vec<Obligation> = Vec::new();
        for obligation in self.input_obligations {
            if !obligations.contains(&obligation) {
                obligations.push(obligation);
            }
        }
        let mut opaque_regions = self.input_opaque;
        opaque_regions.sort();

        let output = output::finish_output(self.output, self.null_exit);
        tracing::debug!(
            input_obligations = obligations.len(),
            input_opaque = opaque_regions.len(),
            output_obligations = output.obligations.len(),
            may_emit_null = output.may_emit_null,
            "synthesis finished"
        );

        InferredContract {
            input: RequirementSchema {
                root,
                obligations,
                opaque_regions,
            },
            output,
        }
    }

    fn required_here(&self) -> bool {
        self.guard_depth == 0
    }

    /// Registers an input opaque region, one per path.
    fn register_opaque(&mut self, path: AccessPath, reason: OpaqueReason) {
        if self.input_opaque.iter().any(|r| r.path == path) {
            return;
        }
        tracing::debug!(path = %path, reason = %reason, "input region is opaque");
        self.input_opaque.push(OpaqueRegion::new(path, reason));
    }

    fn emit(&mut self, mut value: AbstractValue) {
        value.shape = tag_origin(&value.shape, Origin::Output);
        self.output = Some(match self.output.take() {
            Some(acc) => acc.merge(&value),
            None => value,
        });
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn exec_block(&mut self, env: &mut Env, stmts: &[Stmt]) {
        for stmt in stmts {
            if env.terminated {
                tracing::trace!("skipping unreachable statements");
                break;
            }
            self.exec(env, stmt);
        }
    }

    fn exec(&mut self, env: &mut Env, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value } => {
                tracing::trace!(name = %name, "let");
                let value = self.eval(env, value);
                env.declare(name, value);
            }
            Stmt::SetVar { name, value } => {
                let value = self.eval(env, value);
                if self.is_input_alias(env, name) {
                    tracing::debug!(name = %name, "ignoring assignment to the input");
                    return;
                }
                env.declare(name, value);
            }
            Stmt::AppendToVar { name, value } => {
                let value = self.eval(env, value);
                if self.is_input_alias(env, name) {
                    tracing::debug!(name = %name, "ignoring append to the input");
                    return;
                }
                let current = env
                    .vars
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| AbstractValue::of(ValueShape::Never));
                env.declare(name, appended(&current, &value));
            }
            Stmt::Set { target, value } => {
                let value = self.eval(env, value);
                self.write_target(env, target, Write::Set(value));
            }
            Stmt::AppendTo { target, value } => {
                let value = self.eval(env, value);
                self.write_target(env, target, Write::Append(value));
            }
            Stmt::Modify { target, updates } => {
                let updates = self.eval(env, updates);
                self.write_target(env, target, Write::Modify(updates));
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.guard_depth += 1;
                self.eval(env, condition);
                let refinements = {
                    let env_ref: &Env = env;
                    refine::derive(
                        condition,
                        &|name: &str| env_ref.is_local(name),
                        &self.config.input_alias,
                    )
                };
                let mut then_env = env.clone();
                self.apply_rules(&mut then_env, &refinements.then_rules);
                let mut else_env = env.clone();
                self.apply_rules(&mut else_env, &refinements.else_rules);

                self.exec_block(&mut then_env, then_branch);
                if let Some(else_branch) = else_branch {
                    self.exec_block(&mut else_env, else_branch);
                }
                self.guard_depth -= 1;
                *env = Env::join(then_env, else_env);
            }
            Stmt::ForEach {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.eval(env, iterable);
                self.constrain_iterable(&iterable);
                let element = self.element_of(&iterable);

                let shadowed = env.vars.get(binding).cloned();
                let mut body_env = env.clone();
                body_env.declare(binding, element);
                self.guard_depth += 1;
                self.exec_block(&mut body_env, body);
                self.guard_depth -= 1;

                // The loop may run zero times.
                *env = Env::join(env.clone(), body_env);
                if let Some(outer) = shadowed {
                    env.declare(binding, outer);
                }
            }
            Stmt::TryCatch {
                body,
                error_binding,
                fallback,
            } => {
                self.guard_depth += 1;
                let mut try_env = env.clone();
                self.exec_block(&mut try_env, body);

                let mut catch_env = env.clone();
                if let Some(binding) = error_binding {
                    catch_env.declare(binding, AbstractValue::of(error_shape()));
                }
                self.exec_block(&mut catch_env, fallback);
                self.guard_depth -= 1;
                *env = Env::join(try_env, catch_env);
            }
            Stmt::Output { value } => {
                let value = self.eval(env, value);
                self.emit(value);
                env.emitted = true;
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    let value = self.eval(env, value);
                    self.emit(value);
                    env.emitted = true;
                }
                if !env.emitted {
                    self.null_exit = true;
                }
                env.terminated = true;
            }
            Stmt::Abort { message } => {
                if let Some(message) = message {
                    self.eval(env, message);
                }
                env.terminated = true;
            }
        }
    }

    fn is_input_alias(&self, env: &Env, name: &str) -> bool {
        name == self.config.input_alias && !env.is_local(name)
    }

    /// Applies refinement rules to a branch environment. A rule that narrows
    /// its subject to `Never` makes the branch unreachable.
    fn apply_rules(&self, env: &mut Env, rules: &[Rule]) {
        for rule in rules {
            let narrow = |shape: &ValueShape| rule.narrowing.apply(shape);
            match &rule.target {
                RefineTarget::Local { name, segments } => {
                    if let Some(value) = env.vars.get_mut(name) {
                        let narrowed = narrow_shape(&value.shape, segments, &narrow);
                        if narrowed.is_never() {
                            env.terminated = true;
                        }
                        value.shape = narrowed;
                    }
                }
                RefineTarget::Input(path) => {
                    let narrowed = narrow(&self.input_shape_at(env, path));
                    if narrowed.is_never() {
                        env.terminated = true;
                    }
                    env.input_overlay.insert(path.clone(), narrowed);
                }
            }
        }
    }

    /// The current shape of an input path: the seed, narrowed by any
    /// refinements in force along the way.
    fn input_shape_at(&self, env: &Env, path: &AccessPath) -> ValueShape {
        let mut shape = self.seed.cloned().unwrap_or(ValueShape::Unknown);
        let mut current = AccessPath::root();
        for segment in path.segments() {
            current.push(segment.clone());
            shape = match segment {
                AccessSegment::Field(name) => shape.field_shape(name),
                AccessSegment::Index(_) | AccessSegment::Dynamic => shape.element_shape(),
            };
            if let Some(narrowed) = env.input_overlay.get(&current) {
                shape = narrowed.clone();
            }
        }
        shape
    }

    /// Writes through a `SET`/`APPEND TO`/`MODIFY` target.
    fn write_target(&mut self, env: &mut Env, target: &Target, write: Write) {
        if self.is_input_alias(env, &target.base) {
            tracing::debug!(base = %target.base, "ignoring write into the input");
            return;
        }

        let mut segments = Vec::new();
        let mut dynamic = None;
        for segment in &target.segments {
            match segment {
                AccessExpr::Field(name) => segments.push(AccessSegment::Field(name.clone())),
                AccessExpr::Index(i) => segments.push(AccessSegment::Index(*i)),
                AccessExpr::Dynamic(key) => {
                    let key = self.eval(env, key);
                    dynamic = Some(reason_for_key(&key.shape));
                    break;
                }
            }
        }
        let prefix = AccessPath::from_segments(segments.iter().cloned());

        let mut current = env.vars.get(&target.base).cloned().unwrap_or_else(|| {
            tracing::trace!(base = %target.base, "write declares a new object");
            AbstractValue::of(ValueShape::Object(ObjectShape::closed()))
                .with_evidence(Evidence::Unreached)
        });

        let (value, origin) = match write {
            Write::Set(v) => (v, Origin::Set),
            Write::Append(v) => (v, Origin::Append),
            Write::Modify(v) => (v, Origin::Modify),
        };

        if let Some(reason) = dynamic {
            tracing::debug!(
                base = %target.base,
                prefix = %prefix,
                "dynamic write; container left open"
            );
            let region = prefix.child(AccessSegment::Dynamic);
            current.shape = open_at(&current.shape, &segments, origin);
            current.evidence = current.evidence.write(&segments, Evidence::Unconstrained);
            current.absorb_opaque(&AccessPath::root(), &[(region.clone(), reason)]);
            current.absorb_opaque(&region, &value.opaque);
            env.declare(&target.base, current);
            return;
        }

        match origin {
            Origin::Append => {
                let existing = read_shape(&current.shape, &segments);
                let grown = append_shape(&existing, &tag_origin(&value.shape, origin));
                current.shape = write_shape(&current.shape, &segments, &grown, origin);
                let existing_evidence = evidence_at(&current.evidence, &segments);
                current.evidence = current
                    .evidence
                    .write(&segments, appended_evidence(&existing_evidence, &value.evidence));
                current.absorb_opaque(&prefix.child(AccessSegment::Dynamic), &value.opaque);
            }
            Origin::Modify => match &value.shape {
                ValueShape::Object(updates) => {
                    let mut shape = current.shape.clone();
                    let mut evidence = current.evidence.clone();
                    for (name, field) in &updates.fields {
                        let mut path = segments.clone();
                        path.push(AccessSegment::Field(name.clone()));
                        shape = write_shape(&shape, &path, &tag_origin(&field.shape, origin), origin);
                        evidence = evidence.write(&path, value.evidence.field(name));
                    }
                    if !updates.closed {
                        shape = open_at(&shape, &segments, origin);
                    } else if read_shape(&shape, &segments).is_never() {
                        shape = write_shape(
                            &shape,
                            &segments,
                            &ValueShape::Object(ObjectShape::closed()),
                            origin,
                        );
                    }
                    current.shape = shape;
                    current.evidence = evidence;
                    current.absorb_opaque(&prefix, &value.opaque);
                }
                _ => {
                    tracing::debug!(
                        base = %target.base,
                        prefix = %prefix,
                        "modify with a non-literal object; container left open"
                    );
                    current.shape = open_at(&current.shape, &segments, origin);
                    current.evidence = current.evidence.write(&segments, Evidence::Unconstrained);
                    current.absorb_opaque(
                        &AccessPath::root(),
                        &[(prefix.child(AccessSegment::Dynamic), OpaqueReason::Computed)],
                    );
                }
            },
            _ => {
                current.shape = write_shape(
                    &current.shape,
                    &segments,
                    &tag_origin(&value.shape, origin),
                    origin,
                );
                current.evidence = current.evidence.write(&segments, value.evidence.clone());
                current.absorb_opaque(&prefix, &value.opaque);
            }
        }
        env.declare(&target.base, current);
    }

    /// Constrains the sources of an iterated value to be arrays or sets.
    fn constrain_iterable(&mut self, value: &AbstractValue) {
        let iterable = builtins::iterable();
        for path in &value.provenance {
            self.requirements.constrain(path, &iterable);
        }
    }

    /// The abstract element bound while iterating `value`.
    fn element_of(&self, value: &AbstractValue) -> AbstractValue {
        AbstractValue {
            shape: value.shape.element_shape(),
            provenance: value
                .provenance
                .iter()
                .map(|p| p.child(AccessSegment::Dynamic))
                .collect(),
            evidence: value.evidence.element(),
            opaque: Vec::new(),
        }
    }
}

/// Opaque reason for a computed key of the given shape.
fn reason_for_key(key: &ValueShape) -> OpaqueReason {
    if *key == ValueShape::Number {
        OpaqueReason::Index
    } else {
        OpaqueReason::Key
    }
}

/// Shape bound to a `CATCH` error variable.
fn error_shape() -> ValueShape {
    ValueShape::Object(
        ObjectShape::open().with_field("message", FieldShape::required(ValueShape::Text)),
    )
}

fn evidence_at(evidence: &Evidence, segments: &[AccessSegment]) -> Evidence {
    segments
        .iter()
        .fold(evidence.clone(), |acc, segment| match segment {
            AccessSegment::Field(name) => acc.field(name),
            AccessSegment::Index(_) | AccessSegment::Dynamic => acc.element(),
        })
}

fn appended_evidence(existing: &Evidence, element: &Evidence) -> Evidence {
    match existing {
        Evidence::Elements(inner) => Evidence::Elements(Box::new(inner.merge(element))),
        Evidence::Unreached => Evidence::Elements(Box::new(element.clone())),
        _ => Evidence::Unconstrained,
    }
}

/// An accumulator after `APPEND value TO name`.
fn appended(current: &AbstractValue, value: &AbstractValue) -> AbstractValue {
    let mut result = AbstractValue {
        shape: append_shape(&current.shape, &value.shape),
        provenance: current.provenance.clone(),
        evidence: appended_evidence(&current.evidence, &value.evidence),
        opaque: current.opaque.clone(),
    };
    result.absorb_opaque(&AccessPath::root().child(AccessSegment::Dynamic), &value.opaque);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::ast::{Expr, ObjectEntry, ObjectKey};
    use morph_core::{NodeKind, ObligationExpr, ValueDomain};

    fn input(fields: &[&str]) -> Expr {
        Expr::path("input", fields)
    }

    fn output(value: Expr) -> Stmt {
        Stmt::Output { value }
    }

    fn run(body: &[Stmt]) -> InferredContract {
        synthesize(body, &[], None)
    }

    // -----------------------------------------------------------------------
    // Input requirements
    // -----------------------------------------------------------------------

    #[test]
    fn unconditional_reads_are_required_guarded_reads_are_not() {
        let body = vec![
            output(Expr::object([("a", input(&["a"]))])),
            Stmt::If {
                condition: input(&["flag"]),
                then_branch: vec![Stmt::Let {
                    name: "b".into(),
                    value: input(&["b"]),
                }],
                else_branch: None,
            },
        ];
        let contract = run(&body);
        let root = &contract.input.root;
        assert_eq!(root.kind, NodeKind::Object);
        assert!(root.open);
        assert!(root.children["a"].required);
        assert!(!root.children["flag"].required);
        assert!(!root.children["b"].required);
    }

    #[test]
    fn free_identifiers_read_top_level_fields() {
        let contract = run(&[output(Expr::ident("name").dot("first"))]);
        let name = &contract.input.root.children["name"];
        assert!(name.required);
        assert!(name.children["first"].required);
    }

    #[test]
    fn coalesce_chain_yields_one_of_obligation() {
        let body = vec![output(Expr::object([(
            "suites",
            Expr::coalesce(vec![
                input(&["testsuites"]),
                input(&["testsuite"]),
                Expr::Object(vec![]),
            ]),
        )]))];
        let contract = run(&body);
        let root = &contract.input.root;
        assert!(!root.children["testsuites"].required);
        assert!(!root.children["testsuite"].required);

        assert_eq!(contract.input.obligations.len(), 1);
        let obligation = &contract.input.obligations[0];
        assert_eq!(obligation.rule_id, RULE_COALESCE);
        assert!(!obligation.heuristic);
        assert_eq!(obligation.confidence, 0.9);
        assert_eq!(
            obligation.expr,
            ObligationExpr::OneOf {
                children: vec![
                    ObligationExpr::non_null(AccessPath::fields(&["testsuites"])),
                    ObligationExpr::non_null(AccessPath::fields(&["testsuite"])),
                ]
            }
        );
    }

    #[test]
    fn literal_fallback_constrains_single_alternative() {
        let body = vec![output(Expr::coalesce(vec![input(&["limit"]), Expr::number(10)]))];
        let contract = run(&body);
        assert!(contract.input.obligations.is_empty());
        let limit = &contract.input.root.children["limit"];
        assert_eq!(limit.to_shape(), ValueShape::Number.nullable());
        assert!(!limit.required);
        assert_eq!(contract.output.root.kind, NodeKind::Any);
    }

    #[test]
    fn builtin_and_host_arguments_are_constrained() {
        let hosts = [HostSignature::new(
            "lookup",
            vec![ValueShape::Text],
            ValueShape::Number,
        )];
        let body = vec![output(Expr::object([
            ("total", Expr::call("NUMBER", vec![input(&["count"])])),
            ("code", Expr::call("lookup", vec![input(&["code"])])),
        ]))];
        let contract = synthesize(&body, &hosts, None);
        let root = &contract.input.root;
        assert_eq!(root.children["count"].kind, NodeKind::Number);
        assert_eq!(root.children["code"].kind, NodeKind::Text);
        assert_eq!(contract.output.root.children["code"].kind, NodeKind::Number);
    }

    #[test]
    fn literal_index_adds_heuristic_exists() {
        let contract = run(&[output(input(&["items"]).at(1))]);
        let obligation = &contract.input.obligations[0];
        assert!(obligation.heuristic);
        assert_eq!(
            obligation.expr,
            ObligationExpr::Exists {
                path: AccessPath::fields(&["items"]),
                min_count: 2
            }
        );
        assert_eq!(contract.input.root.children["items"].kind, NodeKind::Array);
    }

    #[test]
    fn negative_index_adds_no_exists() {
        let contract = run(&[output(input(&["items"]).at(-1))]);
        assert!(!contract
            .input
            .obligations
            .iter()
            .any(|o| matches!(o.expr, ObligationExpr::Exists { .. })));
    }

    #[test]
    fn loop_element_fields_make_region_opaque() {
        let body = vec![
            Stmt::Let {
                name: "names".into(),
                value: Expr::Array(vec![]),
            },
            Stmt::ForEach {
                binding: "item".into(),
                iterable: input(&["items"]),
                body: vec![Stmt::AppendToVar {
                    name: "names".into(),
                    value: Expr::ident("item").dot("name"),
                }],
            },
            output(Expr::ident("names")),
        ];
        let contract = run(&body);
        let items = &contract.input.root.children["items"];
        assert!(items.required);
        assert_eq!(items.to_string(), "array<any> | set<any>");
        assert_eq!(
            contract.input.opaque_regions,
            vec![OpaqueRegion::new(
                AccessPath::fields(&["items"]).child(AccessSegment::Dynamic),
                OpaqueReason::Index
            )]
        );
        assert_eq!(contract.output.root.kind, NodeKind::Array);
    }

    #[test]
    fn dynamic_key_read_is_opaque_by_key() {
        let body = vec![output(input(&["labels"]).dynamic(input(&["lang"])))];
        let contract = run(&body);
        assert_eq!(
            contract.input.opaque_regions,
            vec![OpaqueRegion::new(
                AccessPath::fields(&["labels"]).child(AccessSegment::Dynamic),
                OpaqueReason::Key
            )]
        );
        assert!(contract.input.root.children["lang"].required);
    }

    #[test]
    fn expressions_past_the_depth_limit_record_nothing() {
        let mut expr = input(&["deep"]);
        for _ in 0..6 {
            expr = Expr::not(expr);
        }
        let config = SynthesisConfig {
            max_depth: 3,
            ..SynthesisConfig::default()
        };
        let contract = synthesize_with_config(&[output(expr)], &[], None, &config);
        assert_eq!(contract.input.root.kind, NodeKind::Any);
    }

    #[test]
    fn seed_shapes_flow_into_reads() {
        let seed = ValueShape::record([("n", ValueShape::Number)]);
        let contract = synthesize(&[output(input(&["n"]))], &[], Some(&seed));
        assert_eq!(contract.input.root.children["n"].kind, NodeKind::Number);
        assert_eq!(contract.output.root.kind, NodeKind::Number);
    }

    // -----------------------------------------------------------------------
    // Output guarantees
    // -----------------------------------------------------------------------

    #[test]
    fn writes_build_a_closed_output_object() {
        let body = vec![
            Stmt::Set {
                target: Target::path("out", &["name"]),
                value: input(&["name"]),
            },
            Stmt::Set {
                target: Target::path("out", &["kind"]),
                value: Expr::text("user"),
            },
            output(Expr::ident("out")),
        ];
        let contract = run(&body);
        let root = &contract.output.root;
        assert_eq!(root.kind, NodeKind::Object);
        assert!(!root.open);
        assert_eq!(root.children["name"].origin, Some(Origin::Set));
        assert_eq!(
            root.children["kind"].domains,
            vec![ValueDomain::enum_text(&["user"])]
        );
        assert!(!contract.output.may_emit_null);
    }

    #[test]
    fn ternary_literals_become_enum_domain() {
        let status = Expr::ternary(
            Expr::eq(input(&["failures"]), Expr::number(0)),
            Expr::text("passed"),
            Expr::text("failed"),
        );
        let contract = run(&[output(Expr::object([("status", status)]))]);
        let status = &contract.output.root.children["status"];
        assert_eq!(status.kind, NodeKind::Text);
        assert_eq!(status.origin, Some(Origin::Output));
        assert_eq!(
            status.domains,
            vec![ValueDomain::enum_text(&["passed", "failed"])]
        );
    }

    #[test]
    fn null_refinement_narrows_locals() {
        let body = vec![
            Stmt::Let {
                name: "tag".into(),
                value: Expr::ternary(
                    Expr::call("IS_OBJECT", vec![input(&["meta"])]),
                    Expr::text("x"),
                    Expr::null(),
                ),
            },
            Stmt::If {
                condition: Expr::ne(Expr::ident("tag"), Expr::null()),
                then_branch: vec![output(Expr::object([("tag", Expr::ident("tag"))]))],
                else_branch: Some(vec![Stmt::Abort { message: None }]),
            },
        ];
        let contract = run(&body);
        let tag = &contract.output.root.children["tag"];
        assert_eq!(tag.kind, NodeKind::Text);
        assert!(!contract.output.may_emit_null);
    }

    #[test]
    fn paths_without_output_may_emit_null() {
        let body = vec![Stmt::If {
            condition: input(&["flag"]),
            then_branch: vec![output(Expr::object([("a", Expr::number(1))]))],
            else_branch: None,
        }];
        assert!(run(&body).output.may_emit_null);

        let body = vec![Stmt::Return { value: None }];
        assert!(run(&body).output.may_emit_null);

        let body = vec![Stmt::Abort { message: None }];
        assert!(!run(&body).output.may_emit_null);
    }

    #[test]
    fn appended_records_yield_for_all() {
        let body = vec![
            Stmt::Let {
                name: "rows".into(),
                value: Expr::Array(vec![]),
            },
            Stmt::ForEach {
                binding: "r".into(),
                iterable: input(&["rows"]),
                body: vec![Stmt::AppendToVar {
                    name: "rows".into(),
                    value: Expr::object([("id", Expr::ident("r").dot("id"))]),
                }],
            },
            output(Expr::object([("rows", Expr::ident("rows"))])),
        ];
        let contract = run(&body);
        assert_eq!(contract.output.obligations.len(), 1);
        let obligation = &contract.output.obligations[0];
        assert_eq!(obligation.rule_id, RULE_OUTPUT_FOR_ALL);
        assert_eq!(
            obligation.expr,
            ObligationExpr::for_all_required(AccessPath::fields(&["rows"]), &["id"])
        );
    }

    #[test]
    fn dynamic_writes_open_the_container() {
        let body = vec![
            Stmt::Set {
                target: Target::var("out").dynamic(input(&["key"])),
                value: Expr::number(1),
            },
            output(Expr::ident("out")),
        ];
        let contract = run(&body);
        assert!(contract.output.root.open);
        assert_eq!(
            contract.output.opaque_regions,
            vec![OpaqueRegion::new(
                AccessPath::root().child(AccessSegment::Dynamic),
                OpaqueReason::Key
            )]
        );
    }

    #[test]
    fn computed_object_keys_are_opaque() {
        let value = Expr::Object(vec![ObjectEntry {
            key: ObjectKey::Computed(input(&["k"])),
            value: Expr::number(1),
        }]);
        let contract = run(&[output(value)]);
        assert!(contract.output.root.open);
        assert_eq!(contract.output.opaque_regions[0].reason, OpaqueReason::Key);
    }

    #[test]
    fn modify_with_unknown_updates_is_computed() {
        let body = vec![
            Stmt::Let {
                name: "out".into(),
                value: Expr::object([("id", Expr::number(1))]),
            },
            Stmt::Modify {
                target: Target::var("out"),
                updates: input(&["patch"]),
            },
            output(Expr::ident("out")),
        ];
        let contract = run(&body);
        assert!(contract.output.root.open);
        assert!(contract.output.root.children["id"].required);
        assert_eq!(
            contract.output.opaque_regions[0].reason,
            OpaqueReason::Computed
        );
    }

    #[test]
    fn modify_with_literal_updates_adds_fields() {
        let body = vec![
            Stmt::Let {
                name: "out".into(),
                value: Expr::object([("id", Expr::number(1))]),
            },
            Stmt::Modify {
                target: Target::var("out"),
                updates: Expr::object([("done", Expr::boolean(true))]),
            },
            output(Expr::ident("out")),
        ];
        let root = run(&body).output.root;
        assert!(!root.open);
        assert_eq!(root.children["done"].origin, Some(Origin::Modify));
        assert_eq!(root.children["done"].kind, NodeKind::Boolean);
    }

    #[test]
    fn try_catch_reads_are_optional() {
        let body = vec![Stmt::TryCatch {
            body: vec![output(Expr::object([("a", input(&["a"]))]))],
            error_binding: Some("err".into()),
            fallback: vec![output(Expr::object([(
                "error",
                Expr::ident("err").dot("message"),
            )]))],
        }];
        let contract = run(&body);
        assert!(!contract.input.root.children["a"].required);
        assert!(!contract.input.root.children.contains_key("err"));
        let root = &contract.output.root;
        assert!(!root.children["a"].required);
        assert!(!root.children["error"].required);
    }

    #[test]
    fn writes_to_the_input_are_ignored() {
        let body = vec![
            Stmt::Set {
                target: Target::path("input", &["x"]),
                value: Expr::number(1),
            },
            output(input(&["x"])),
        ];
        let contract = run(&body);
        assert_eq!(contract.output.root.kind, NodeKind::Any);
    }

    // -----------------------------------------------------------------------
    // Reassignment, path appends and branch refinement
    // -----------------------------------------------------------------------

    #[test]
    fn reassignment_in_one_branch_joins_both_shapes() {
        let body = vec![
            Stmt::Let {
                name: "x".into(),
                value: Expr::number(1),
            },
            Stmt::If {
                condition: input(&["flag"]),
                then_branch: vec![Stmt::SetVar {
                    name: "x".into(),
                    value: Expr::text("a"),
                }],
                else_branch: None,
            },
            output(Expr::object([("x", Expr::ident("x"))])),
        ];
        let contract = run(&body);
        let x = &contract.output.root.children["x"];
        assert_eq!(x.kind, NodeKind::Union);
        let mut kinds: Vec<NodeKind> = x.options.iter().map(|o| o.kind).collect();
        kinds.sort_by_key(|k| k.name());
        assert_eq!(kinds, vec![NodeKind::Number, NodeKind::Text]);
    }

    #[test]
    fn reassigning_the_input_alias_is_ignored() {
        let body = vec![
            Stmt::SetVar {
                name: "input".into(),
                value: Expr::number(1),
            },
            output(input(&["a"])),
        ];
        let contract = run(&body);
        assert!(contract.input.root.children["a"].required);
        assert_eq!(contract.output.root.kind, NodeKind::Any);
    }

    #[test]
    fn appends_to_a_path_grow_an_array_field() {
        let body = vec![
            Stmt::AppendTo {
                target: Target::path("out", &["tags"]),
                value: Expr::text("x"),
            },
            Stmt::AppendTo {
                target: Target::path("out", &["tags"]),
                value: Expr::text("y"),
            },
            output(Expr::ident("out")),
        ];
        let contract = run(&body);
        let root = &contract.output.root;
        assert_eq!(root.kind, NodeKind::Object);
        assert!(!root.open);
        let tags = &root.children["tags"];
        assert!(tags.required);
        assert_eq!(tags.kind, NodeKind::Array);
        assert_eq!(tags.origin, Some(Origin::Append));
        assert_eq!(tags.element.as_deref().map(|e| e.kind), Some(NodeKind::Text));
    }

    #[test]
    fn is_object_condition_narrows_the_then_branch() {
        let body = vec![Stmt::If {
            condition: Expr::call("IS_OBJECT", vec![input(&["meta"])]),
            then_branch: vec![output(input(&["meta"]))],
            else_branch: Some(vec![Stmt::Abort { message: None }]),
        }];
        let contract = run(&body);
        assert!(!contract.input.root.children["meta"].required);
        let root = &contract.output.root;
        assert_eq!(root.kind, NodeKind::Object);
        assert!(root.open);
        assert!(!contract.output.may_emit_null);
    }

    #[test]
    fn missing_else_keeps_the_negated_refinement() {
        let tag = Stmt::Let {
            name: "tag".into(),
            value: Expr::ternary(
                Expr::call("IS_OBJECT", vec![input(&["meta"])]),
                Expr::text("x"),
                Expr::null(),
            ),
        };
        let emit = output(Expr::object([("tag", Expr::ident("tag"))]));

        let unguarded = run(&[tag.clone(), emit.clone()]);
        assert!(unguarded.output.root.children["tag"].admits_null());

        let guarded = run(&[
            tag,
            Stmt::If {
                condition: Expr::eq(Expr::ident("tag"), Expr::null()),
                then_branch: vec![Stmt::Abort { message: None }],
                else_branch: None,
            },
            emit,
        ]);
        let narrowed = &guarded.output.root.children["tag"];
        assert_eq!(narrowed.kind, NodeKind::Text);
        assert!(!narrowed.admits_null());
    }
}
