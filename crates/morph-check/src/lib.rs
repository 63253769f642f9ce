//! Contract inference and enforcement for transforms.
//!
//! The pipeline is: [`synth`] walks a transform body and infers a
//! requirement/guarantee pair, [`builder`] reconciles that with a declared
//! signature, [`validate`] checks concrete values against the result, and
//! [`witness`] synthesizes conforming values to test a contract for internal
//! consistency. [`versions`] translates contracts to the older schema
//! generations still read by some consumers.

pub mod builder;
pub mod coerce;
pub mod config;
pub mod error;
pub mod render;
pub mod synth;
pub mod validate;
pub mod versions;
pub mod witness;

// Re-export commonly used types
pub use builder::{build, build_with_config};
pub use coerce::coerce;
pub use config::{EnforcementConfig, EnforcementMode, SynthesisConfig, ValidationOptions};
pub use error::{ConfigError, ContractViolationError};
pub use synth::{synthesize, synthesize_with_config, HostSignature, InferredContract};
pub use validate::enforce::{enforce, enforce_input, enforce_output};
pub use validate::violation::{format_violations, Violation, ViolationKind};
pub use validate::validate;
pub use witness::check::{check, SatisfiabilityReport};
pub use witness::generate;
pub use witness::sampler::{sample_check, SampleConfig, SampleReport};
