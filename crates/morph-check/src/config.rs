//! Configuration for synthesis, validation and enforcement.
//!
//! Every config type has a [`Default`] matching production behavior.
//! [`EnforcementConfig::from_env`] layers `MORPH_CONTRACT_*` environment
//! variables on top of the defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_MODE: &str = "MORPH_CONTRACT_MODE";
pub const ENV_CONFIDENCE: &str = "MORPH_CONTRACT_CONFIDENCE";
pub const ENV_HEURISTIC: &str = "MORPH_CONTRACT_HEURISTIC";

/// Knobs for the shape synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Identifier that names the whole input value inside a transform.
    pub input_alias: String,
    /// Maximum expression nesting before a sub-expression degrades to
    /// `Unknown`.
    pub max_depth: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            input_alias: "input".to_string(),
            max_depth: 64,
        }
    }
}

/// Which obligations the validator evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Obligations with a lower confidence are skipped.
    pub confidence_threshold: f64,
    /// Evaluate obligations flagged as heuristic.
    pub include_heuristic: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            confidence_threshold: 0.5,
            include_heuristic: false,
        }
    }
}

impl ValidationOptions {
    /// Evaluate every obligation regardless of confidence or origin.
    pub fn maximal() -> Self {
        ValidationOptions {
            confidence_threshold: 0.0,
            include_heuristic: true,
        }
    }
}

/// How violations found at run time are acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Skip validation entirely.
    Off,
    /// Validate and log, never reject.
    #[default]
    Warn,
    /// Reject values with blocking violations.
    Strict,
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementMode::Off => f.write_str("off"),
            EnforcementMode::Warn => f.write_str("warn"),
            EnforcementMode::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for EnforcementMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(EnforcementMode::Off),
            "warn" => Ok(EnforcementMode::Warn),
            "strict" => Ok(EnforcementMode::Strict),
            _ => Err(ConfigError::UnknownEnforcementMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Mode plus validation options, as used by the executor's enforcement hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    pub mode: EnforcementMode,
    pub options: ValidationOptions,
}

impl EnforcementConfig {
    /// Reads `MORPH_CONTRACT_MODE`, `MORPH_CONTRACT_CONFIDENCE` and
    /// `MORPH_CONTRACT_HEURISTIC`. Malformed values are logged and the
    /// default is kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = EnforcementConfig::default();

        if let Some(raw) = lookup(ENV_MODE) {
            match raw.parse() {
                Ok(mode) => config.mode = mode,
                Err(err) => tracing::warn!("{err}; keeping {}", config.mode),
            }
        }

        if let Some(raw) = lookup(ENV_CONFIDENCE) {
            match parse_confidence(&raw) {
                Ok(threshold) => config.options.confidence_threshold = threshold,
                Err(err) => tracing::warn!(
                    "{err}; keeping {}",
                    config.options.confidence_threshold
                ),
            }
        }

        if let Some(raw) = lookup(ENV_HEURISTIC) {
            match parse_flag(ENV_HEURISTIC, &raw) {
                Ok(flag) => config.options.include_heuristic = flag,
                Err(err) => tracing::warn!("{err}; keeping {}", config.options.include_heuristic),
            }
        }

        config
    }
}

fn parse_confidence(raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(ConfigError::InvalidConfidence {
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
