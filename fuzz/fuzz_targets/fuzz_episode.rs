#![no_main]

use arbitrary::Arbitrary;
use cybersim::SimulationConfig;
use cybersim::episode::{Action, Episode};
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, LazyLock};

static NETWORK: LazyLock<Arc<cybersim::Environment>> = LazyLock::new(|| {
    let loaded = cybersim::load(include_str!("../../tests/fixtures/tinymicro.yaml"))
        .expect("fixture loads");
    Arc::new(loaded.environment)
});

#[derive(Arbitrary, Debug)]
enum RawAction {
    Local(u8, u8),
    Remote(u8, u8, u8, u8),
    Connect(u8, u8, u8, u8),
}

impl From<RawAction> for Action {
    fn from(raw: RawAction) -> Self {
        let n = |b: u8| usize::from(b);
        match raw {
            RawAction::Local(s, v) => Action::Local {
                source: n(s),
                vulnerability: n(v),
            },
            RawAction::Remote(s, t, p, v) => Action::Remote {
                source: n(s),
                target: n(t),
                profile: n(p),
                variant: n(v),
            },
            RawAction::Connect(s, t, p, c) => Action::Connect {
                source: n(s),
                target: n(t),
                port: n(p),
                credential: n(c),
            },
        }
    }
}

fuzz_target!(|actions: Vec<RawAction>| {
    let mut episode = match Episode::new(Arc::clone(&NETWORK), SimulationConfig::default()) {
        Ok(e) => e,
        Err(_) => return,
    };

    // Arbitrary indices are penalized, never a panic or an error.
    for raw in actions {
        let known = episode.discovered_nodes().len();
        let result = episode
            .step(raw.into())
            .expect("non-strict episode never fails a step");
        assert!(result.observation.discovered_node_count >= known);
        if result.done {
            break;
        }
    }
});
