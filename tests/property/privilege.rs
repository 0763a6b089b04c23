use cybersim::defender::ReimageOwnedNodes;
use cybersim::enums::PrivilegeLevel;
use cybersim::episode::Episode;
use cybersim::{SimulationConfig, load};
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

fn level() -> impl Strategy<Value = PrivilegeLevel> {
    (0..PrivilegeLevel::ALL.len()).prop_map(|i| PrivilegeLevel::ALL[i])
}

fn episode(name: &str, scanner: Option<(u64, usize)>) -> Episode {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    let environment = load(&std::fs::read_to_string(path).unwrap())
        .unwrap()
        .environment;
    let mut config = SimulationConfig::default();
    config.attacker_goal.own_atleast_percent = 2.0;
    let episode = Episode::new(Arc::new(environment), config).unwrap();
    match scanner {
        Some((frequency, capacity)) => {
            episode.with_defender(ReimageOwnedNodes::new(frequency, capacity))
        }
        None => episode,
    }
}

fn levels(episode: &Episode) -> Vec<(String, PrivilegeLevel)> {
    episode
        .environment()
        .nodes()
        .map(|n| (n.id.clone(), n.privilege_level))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // A node only loses privilege when the defender reimages it in that step.
    #[test]
    fn episode_privileges_only_drop_on_reimage(
        fixture in prop_oneof![Just("tinymicro.yaml"), Just("lateral.yaml")],
        scanner in prop::option::of((1u64..4, 1usize..3)),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..30),
    ) {
        let mut episode = episode(fixture, scanner);
        let mut before = levels(&episode);
        for pick in &picks {
            let valid = episode.compute_action_mask().valid_actions();
            if valid.is_empty() || episode.is_done() {
                break;
            }
            let result = episode.step(valid[pick.index(valid.len())]).unwrap();
            let step = result.info.step_count;

            let after = levels(&episode);
            for ((id, old), (_, new)) in before.iter().zip(&after) {
                if new < old {
                    let node = episode.environment().get_node(id).unwrap();
                    prop_assert_eq!(node.last_reimaging, Some(step), "{} dropped from {:?} to {:?}", id, old, new);
                }
            }
            if scanner.is_none() {
                let owned = |ls: &[(String, PrivilegeLevel)]| {
                    ls.iter().filter(|(_, l)| *l >= PrivilegeLevel::LocalUser).count()
                };
                prop_assert!(owned(&after) >= owned(&before));
            }
            before = after;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Escalation never lowers the level.
    #[test]
    fn escalation_is_monotone(current in level(), target in level()) {
        let escalated = current.escalate(target);
        prop_assert!(escalated >= current);
        prop_assert!(escalated >= target);
        prop_assert!(escalated == current || escalated == target);
    }

    // Escalating in any order ends at the highest level seen.
    #[test]
    fn escalation_sequence_reaches_maximum(levels in prop::collection::vec(level(), 0..10)) {
        let reached = levels
            .iter()
            .fold(PrivilegeLevel::NoAccess, |acc, l| acc.escalate(*l));
        let highest = levels.iter().copied().max().unwrap_or(PrivilegeLevel::NoAccess);
        prop_assert_eq!(reached, highest);
    }

    #[test]
    fn serde_names_match(l in level()) {
        let json = serde_json::to_value(l).unwrap();
        prop_assert_eq!(json.as_str(), Some(l.as_str()));
    }
}
