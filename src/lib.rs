//! Attack-surface simulation engine for reinforcement-learning research.
//!
//! A network of abstract machines is described in YAML: nodes with listening
//! services, properties, firewall rules and vulnerabilities gated by boolean
//! preconditions. An attacker agent discovers and takes over the network one
//! numeric action at a time; every action yields a reward and an observation.
//!
//! ```text
//! parse(yaml) → NetworkDefinition → validate(def) → ValidationResult
//!                                 → normalize(def) → NetworkDefinition → serialize(def) → yaml
//! Environment::from_definition(def) → Arc<Environment> → Episode::new(env, config)
//!                                                      → reset() / step(action) → StepResult
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cybersim::episode::{Episode, NamedAction};
//! use cybersim::SimulationConfig;
//!
//! let yaml = r#"
//! version: "0.1.0"
//! nodes:
//!   - id: client
//!     agent_installed: true
//!     vulnerabilities:
//!       - id: SearchHistory
//!         type: local
//!         outcome:
//!           type: leaked_nodes_id
//!           discovered_nodes: [website]
//!   - id: website
//!     services:
//!       - name: HTTPS
//! "#;
//!
//! let loaded = cybersim::load(yaml).expect("valid network");
//! let mut episode = Episode::new(Arc::new(loaded.environment), SimulationConfig::default())
//!     .expect("network within bounds");
//! let action = episode
//!     .encode_action(&NamedAction::Local {
//!         node: "client".into(),
//!         vulnerability: "SearchHistory".into(),
//!     })
//!     .expect("addressable action");
//! let step = episode.step(action).expect("active episode");
//! assert_eq!(step.observation.newly_discovered_nodes_count, 1);
//! ```
//!
//! The library emits `tracing` events and never installs a subscriber.

pub mod attacker;
pub mod config;
pub mod defender;
pub mod enums;
pub mod episode;
pub mod error;
pub mod graph;
pub mod identifiers;
pub mod mask;
pub mod normalize;
pub mod parse;
pub mod precondition;
pub mod profile;
pub mod serialize;
pub mod state;
pub mod types;
pub mod validate;

pub use config::SimulationConfig;
pub use error::*;
pub use graph::Environment;
pub use precondition::Precondition;
pub use profile::Profile;
pub use types::*;

// Re-export entry-point functions at the crate root for convenience.
pub use normalize::normalize;
pub use parse::parse;
pub use serialize::serialize;
pub use validate::validate;

/// Result of the [`load`] convenience entry point.
pub struct LoadResult {
    /// The immutable environment template, built from the normalized definition.
    pub environment: Environment,
    /// Non-fatal warnings produced during validation.
    pub warnings: Vec<Diagnostic>,
}

/// Convenience entry point composing parse → validate → normalize → build.
///
/// # Errors
///
/// Returns `Err(Vec<SimError>)` with the parse error, or every validation
/// error, when the network cannot be simulated.
pub fn load(input: &str) -> Result<LoadResult, Vec<SimError>> {
    let def = parse::parse(input).map_err(|e| vec![SimError::Parse(e)])?;

    let result = validate::validate(&def);
    if !result.is_valid() {
        return Err(result
            .errors
            .into_iter()
            .map(SimError::Validation)
            .collect());
    }

    Ok(LoadResult {
        environment: Environment::from_normalized(normalize::normalize(def)),
        warnings: result.warnings,
    })
}
