//! Randomized witness sampling.
//!
//! Where [`generate`](super::generate) produces the single smallest witness,
//! the sampler draws many random ones: optional children are included at
//! random, containers get up to three elements and numbers are drawn with
//! boundary values weighted in. Each candidate is patched by the schema's
//! obligations and validated back with every obligation enabled.
//!
//! Reproducibility: given the same `random_seed`, the same candidates are
//! drawn and the same report is produced.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use morph_core::{Node, NodeKind, SchemaView, Value, ValueDomain};

use super::{number_for, number_value, patch, text_for};
use crate::config::ValidationOptions;
use crate::validate::domain::{check_domain, DomainCheck, RegexCache};
use crate::validate::validate;
use crate::validate::violation::Violation;

const MAX_ELEMENTS: usize = 3;
const TEXT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789 _-";

/// Configuration for a sampling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleConfig {
    /// Number of random candidates to draw.
    pub iterations: u32,
    /// Seed for the PRNG.
    pub random_seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig {
            iterations: 64,
            random_seed: 0,
        }
    }
}

/// Result of a sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub total_run: u32,
    pub passed: u32,
    pub failures: Vec<SampleFailure>,
    /// The seed used, for reproducing the run.
    pub random_seed: u64,
}

/// A candidate the schema rejected after patching.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFailure {
    pub candidate: Value,
    /// Blocking violations only.
    pub violations: Vec<Violation>,
}

/// Draws `config.iterations` random candidates for `schema` and validates
/// each one against it.
pub fn sample_check<S: SchemaView + ?Sized>(schema: &S, config: &SampleConfig) -> SampleReport {
    let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);
    let mut regexes = RegexCache::default();
    let options = ValidationOptions::maximal();
    let mut failures = Vec::new();
    let mut total_run: u32 = 0;
    let mut passed: u32 = 0;

    for _ in 0..config.iterations {
        total_run += 1;
        let mut candidate = random_value(schema.root(), &mut rng);
        for obligation in schema.obligations() {
            patch::apply(&mut candidate, schema.root(), &obligation.expr, &mut regexes);
        }
        let violations: Vec<Violation> = validate(schema, &candidate, &options)
            .into_iter()
            .filter(|v| v.kind.is_blocking())
            .collect();
        if violations.is_empty() {
            passed += 1;
        } else {
            failures.push(SampleFailure {
                candidate,
                violations,
            });
        }
    }

    tracing::debug!(
        total_run,
        passed,
        random_seed = config.random_seed,
        "witness sampling finished"
    );
    SampleReport {
        total_run,
        passed,
        failures,
        random_seed: config.random_seed,
    }
}

/// Generates a random value `node` should accept.
pub fn random_value(node: &Node, rng: &mut ChaCha8Rng) -> Value {
    match node.kind {
        NodeKind::Never | NodeKind::Null => Value::Null,
        NodeKind::Any => random_scalar(rng),
        NodeKind::Boolean => Value::Bool(rng.gen_bool(0.5)),
        NodeKind::Number => random_number(&node.domains, rng),
        NodeKind::Text => random_text(&node.domains, rng),
        NodeKind::Bytes => {
            let len = rng.gen_range(0..=4);
            Value::Bytes((0..len).map(|_| rng.gen()).collect())
        }
        NodeKind::Object => {
            let mut fields = IndexMap::new();
            for (name, child) in &node.children {
                if child.required || rng.gen_bool(0.5) {
                    fields.insert(name.clone(), random_value(child, rng));
                }
            }
            Value::Object(fields)
        }
        NodeKind::Array => Value::Array(random_elements(node, rng)),
        NodeKind::Set => {
            let mut seen = std::collections::HashSet::new();
            let items = random_elements(node, rng)
                .into_iter()
                .filter(|item| seen.insert(item.canonical_key()))
                .collect();
            Value::Set(items)
        }
        NodeKind::Union => match node.options.choose(rng) {
            Some(option) => random_value(option, rng),
            None => Value::Null,
        },
    }
}

fn random_elements(node: &Node, rng: &mut ChaCha8Rng) -> Vec<Value> {
    let len = rng.gen_range(0..=MAX_ELEMENTS);
    let any = Node::any();
    let element = node.element.as_deref().unwrap_or(&any);
    (0..len).map(|_| random_value(element, rng)).collect()
}

fn random_scalar(rng: &mut ChaCha8Rng) -> Value {
    match rng.gen_range(0..4) {
        0 => Value::Null,
        1 => Value::Bool(rng.gen_bool(0.5)),
        2 => random_number(&[], rng),
        _ => random_text(&[], rng),
    }
}

fn random_number(domains: &[ValueDomain], rng: &mut ChaCha8Rng) -> Value {
    let range = domains.iter().find_map(|d| match d {
        ValueDomain::NumberRange {
            min,
            max,
            integer_only,
        } => Some((*min, *max, *integer_only)),
        _ => None,
    });
    let Some((min, max, integer_only)) = range else {
        // ~30% chance of boundary value
        if rng.gen_ratio(3, 10) {
            let boundaries: &[i64] = &[0, 1, -1, i64::from(i32::MIN), i64::from(i32::MAX)];
            return Value::int(boundaries[rng.gen_range(0..boundaries.len())]);
        }
        return Value::int(rng.gen_range(-1_000_000..=1_000_000));
    };

    let lo = min.unwrap_or(-1e6);
    let hi = max.unwrap_or(1e6);
    let (lo, hi) = if integer_only { (lo.ceil(), hi.floor()) } else { (lo, hi) };
    if lo > hi {
        return number_for(domains);
    }
    let n = if rng.gen_ratio(3, 10) {
        if rng.gen_bool(0.5) {
            lo
        } else {
            hi
        }
    } else if integer_only {
        rng.gen_range(lo..=hi).floor().max(lo)
    } else {
        rng.gen_range(lo..=hi)
    };
    number_value(n)
}

fn random_text(domains: &[ValueDomain], rng: &mut ChaCha8Rng) -> Value {
    let enum_values = domains.iter().find_map(|d| match d {
        ValueDomain::EnumText { values } => Some(values),
        _ => None,
    });
    let candidate = match enum_values {
        Some(values) => values.choose(rng).cloned().unwrap_or_default(),
        None => {
            let len = rng.gen_range(0..=8);
            (0..len)
                .map(|_| char::from(TEXT_ALPHABET[rng.gen_range(0..TEXT_ALPHABET.len())]))
                .collect()
        }
    };

    let mut regexes = RegexCache::default();
    let value = Value::Text(candidate);
    let conforms = domains
        .iter()
        .all(|d| check_domain(d, &value, &mut regexes) != DomainCheck::Fail);
    if conforms {
        value
    } else {
        text_for(domains)
    }
}
