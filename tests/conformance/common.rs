use cybersim::episode::{Episode, NamedAction, StepResult};
use cybersim::{Environment, SimulationConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {:?}: {}", path, e))
}

pub fn environment(name: &str) -> Arc<Environment> {
    let loaded = cybersim::load(&fixture(name))
        .unwrap_or_else(|errors| panic!("fixture {} should load, got {:?}", name, errors));
    Arc::new(loaded.environment)
}

pub fn episode(name: &str) -> Episode {
    episode_with(name, SimulationConfig::default())
}

pub fn episode_with(name: &str, config: SimulationConfig) -> Episode {
    Episode::new(environment(name), config).expect("fixture should be within bounds")
}

pub fn local(node: &str, vulnerability: &str) -> NamedAction {
    NamedAction::Local {
        node: node.to_string(),
        vulnerability: vulnerability.to_string(),
    }
}

pub fn remote(source: &str, target: &str, profile: &str, vulnerability: &str) -> NamedAction {
    NamedAction::Remote {
        source: source.to_string(),
        target: target.to_string(),
        profile: profile.to_string(),
        vulnerability: vulnerability.to_string(),
    }
}

pub fn connect(source: &str, target: &str, port: &str, credential: &str) -> NamedAction {
    NamedAction::Connect {
        source: source.to_string(),
        target: target.to_string(),
        port: port.to_string(),
        credential: credential.to_string(),
    }
}

/// Encode a named action against the episode and step it.
pub fn step(episode: &mut Episode, action: NamedAction) -> StepResult {
    let encoded = episode
        .encode_action(&action)
        .unwrap_or_else(|| panic!("{} should be addressable", action));
    episode.step(encoded).expect("step should succeed")
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
