use cybersim::SimulationConfig;
use cybersim::defender::{DefenderActuator, ReimageOwnedNodes};
use cybersim::enums::*;
use cybersim::episode::*;
use cybersim::error::StepError;
use cybersim::Environment;

use super::common::*;

#[test]
fn bounds_of_the_lateral_network() {
    let episode = episode("lateral.yaml");
    let bounds = episode.bounds();
    assert_eq!(bounds.maximum_node_count, 3);
    assert_eq!(bounds.maximum_profiles_count, 2);
    assert_eq!(bounds.profile_slots(), 1);
    assert_eq!(bounds.maximum_vulnerability_variables, 1);
    assert_eq!(bounds.local_vulnerabilities_count, 3);
    assert_eq!(bounds.port_count, 3);
    assert_eq!(bounds.property_count, 4);
}

#[test]
fn reset_observation() {
    let mut episode = episode("lateral.yaml");
    let obs = episode.reset();
    assert_eq!(obs.discovered_node_count, 1);
    assert_eq!(obs.discovered_profile_count, 1);
    assert_eq!(obs.credential_cache_length, 0);
    assert_eq!(obs.nodes_privilegelevel, vec![PrivilegeLevel::LocalUser]);
    // nginx, postgres, tls_enabled, windows on an owned workstation
    assert_eq!(
        obs.discovered_nodes_properties,
        vec![vec![PROPERTY_NOT_SET, PROPERTY_NOT_SET, PROPERTY_NOT_SET, PROPERTY_SET]]
    );
    assert_eq!(episode.step_count(), 0);
    assert_eq!(episode.status(), EpisodeStatus::Active);
}

#[test]
fn initial_valid_actions() {
    let episode = episode("lateral.yaml");
    let mask = episode.compute_action_mask();
    assert_eq!(
        mask.valid_actions(),
        vec![
            Action::Local {
                source: 0,
                vulnerability: 1
            },
            Action::Local {
                source: 0,
                vulnerability: 2
            },
        ]
    );
    assert!(!mask.is_empty());
}

#[test]
fn too_many_nodes_is_rejected() {
    let mut config = SimulationConfig::default();
    config.bounds.maximum_node_count = Some(2);
    let errors = Episode::new(environment("lateral.yaml"), config)
        .err()
        .expect("three nodes exceed the bound");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "B-001");
}

#[test]
fn too_many_leaked_credentials_is_rejected() {
    let mut config = SimulationConfig::default();
    config.bounds.maximum_discoverable_credentials_per_action = 1;
    let errors = Episode::new(environment("lateral.yaml"), config)
        .err()
        .expect("ReadBashHistory leaks two credentials");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "B-002");
    assert_eq!(errors[0].path, "nodes[0].vulnerabilities[0].branches[0]");
}

#[test]
fn masked_action_is_suspicious() {
    let mut episode = episode("lateral.yaml");
    let result = episode
        .step(Action::Remote {
            source: 0,
            target: 1,
            profile: 0,
            variant: 0,
        })
        .unwrap();
    assert!(approx_eq(result.reward, -5.0));
    assert_eq!(result.info.reward_string, "action outside the valid mask");
    assert_eq!(result.info.step_count, 1);
    assert!(!result.done);
}

#[test]
fn credential_index_beyond_the_cache() {
    let mut episode = episode("lateral.yaml");
    step(&mut episode, local("workstation", "ReadBashHistory"));
    let result = episode
        .step(Action::Connect {
            source: 0,
            target: 1,
            port: 0,
            credential: 2,
        })
        .unwrap();
    assert!(approx_eq(result.reward, -1.0));
    assert_eq!(episode.step_count(), 2);
}

#[test]
fn step_reports_what_happened() {
    let mut episode = episode("lateral.yaml");
    let result = step(&mut episode, local("workstation", "ReadBashHistory"));
    assert!(approx_eq(result.reward, 22.0), "{}", result.reward);
    assert_eq!(result.info.description, "local ReadBashHistory on workstation");
    assert!(approx_eq(result.info.network_availability, 1.0));

    let obs = &result.observation;
    assert_eq!(obs.newly_discovered_nodes_count, 2);
    assert_eq!(obs.leaked_credentials.len(), 2);
    assert_eq!(obs.credential_cache_length, 2);
    assert_eq!(obs.discovered_node_count, 3);
    assert_eq!(
        obs.nodes_privilegelevel,
        vec![
            PrivilegeLevel::LocalUser,
            PrivilegeLevel::NoAccess,
            PrivilegeLevel::NoAccess
        ]
    );
    assert_eq!(obs.discovered_nodes_properties[1], vec![PROPERTY_UNKNOWN; 4]);
    assert_eq!(obs.exploit_result, ExploitResult::Succeeded);
}

#[test]
fn encode_and_describe_agree() {
    let mut episode = episode("lateral.yaml");
    step(&mut episode, local("workstation", "ReadBashHistory"));

    let named = connect("workstation", "webserver", "HTTPS", "web_admin");
    let action = episode.encode_action(&named).unwrap();
    assert_eq!(
        action,
        Action::Connect {
            source: 0,
            target: 1,
            port: 0,
            credential: 0
        }
    );
    assert_eq!(episode.describe_action(&action), Some(named));

    let trap = remote("workstation", "database", "username.NoAuth", "TrapDoor");
    let action = episode.encode_action(&trap).unwrap();
    assert_eq!(
        action,
        Action::Remote {
            source: 0,
            target: 2,
            profile: 0,
            variant: 0
        }
    );
    assert_eq!(episode.describe_action(&action), Some(trap));

    // The local twin needs ip.local, which this network never discloses.
    let twin = Action::Remote {
        source: 0,
        target: 2,
        profile: 1,
        variant: 0,
    };
    assert_eq!(episode.describe_action(&twin), None);
    assert!(!episode.is_action_valid(&twin));
}

#[test]
fn unknown_names_do_not_encode() {
    let episode = episode("lateral.yaml");
    assert_eq!(episode.encode_action(&local("webserver", "DumpConfig")), None);
    assert_eq!(episode.encode_action(&local("workstation", "Nope")), None);
    assert_eq!(
        episode.encode_action(&connect("workstation", "webserver", "HTTPS", "web_admin")),
        None
    );
}

#[test]
fn terminated_episode_refuses_steps_until_reset() {
    let mut config = SimulationConfig::default();
    config.attacker_goal.own_atleast_percent = 0.6;
    let mut episode = episode_with("lateral.yaml", config);
    step(&mut episode, local("workstation", "ReadBashHistory"));
    let won = step(&mut episode, connect("workstation", "webserver", "HTTPS", "web_admin"));

    assert!(won.done);
    assert!(approx_eq(won.reward, 1000.0));
    assert_eq!(
        won.status,
        EpisodeStatus::Terminated(TerminationReason::AttackerGoalReached)
    );
    assert_eq!(episode.episode_rewards(), [22.0, 100.0]);
    assert!(approx_eq(episode.total_reward(), 122.0));

    let err = episode
        .step(Action::Local {
            source: 0,
            vulnerability: 2,
        })
        .unwrap_err();
    assert_eq!(err, StepError::EpisodeTerminated);

    episode.reset();
    assert!(!episode.is_done());
    assert_eq!(episode.step_count(), 0);
    assert!(episode.episode_rewards().is_empty());
    assert!(!episode.environment().get_node("webserver").unwrap().agent_installed);
    assert!(!episode.template().get_node("webserver").unwrap().agent_installed);
}

#[test]
fn explored_network_hides_unowned_detail() {
    let mut episode = episode("lateral.yaml");
    step(&mut episode, local("workstation", "ReadBashHistory"));

    let explored = episode.explored_network();
    let ids: Vec<&str> = explored.nodes.iter().map(|n| n.id()).collect();
    assert_eq!(ids, vec!["workstation", "webserver", "database"]);
    assert!(matches!(explored.nodes[0], ExploredNode::Owned(_)));
    assert!(matches!(
        &explored.nodes[1],
        ExploredNode::Discovered { privilege_level: PrivilegeLevel::NoAccess, properties, .. }
            if properties.is_empty()
    ));
    assert_eq!(explored.edges.len(), 2);
    assert!(explored.edges.iter().all(|e| e.kind == EdgeAnnotation::Knows));
}

#[test]
fn honeytoken_switched_off_removes_the_trap() {
    let mut config = SimulationConfig::default();
    config.honeytokens.insert("honeypot_door".to_string(), false);
    let mut episode = episode_with("lateral.yaml", config);
    step(&mut episode, local("workstation", "ReadBashHistory"));

    assert_eq!(
        episode.encode_action(&remote("workstation", "webserver", "username.NoAuth", "TrapDoor")),
        None
    );
    let result = episode
        .step(Action::Remote {
            source: 0,
            target: 1,
            profile: 0,
            variant: 0,
        })
        .unwrap();
    assert!(approx_eq(result.reward, -5.0));
    assert!(episode.state().deception_tracker().is_empty());
}

#[test]
fn honeytoken_left_on_is_tracked() {
    let mut episode = episode("lateral.yaml");
    step(&mut episode, local("workstation", "ReadBashHistory"));
    let result = step(
        &mut episode,
        remote("workstation", "webserver", "username.NoAuth", "TrapDoor"),
    );
    assert!(approx_eq(result.reward, -1.0));
    assert_eq!(result.observation.exploit_result, ExploitResult::Failed);
    assert_eq!(result.info.profile, "username.NoAuth");
    assert_eq!(
        episode.state().deception_tracker()["honeypot_door"].trigger_times,
        vec![2]
    );
}

#[test]
fn defender_evicting_everything_wins() {
    let mut config = SimulationConfig::default();
    config.defender_goal.eviction = true;
    let mut episode = episode_with("lateral.yaml", config).with_defender(ReimageOwnedNodes::new(1, 3));

    let result = step(&mut episode, local("workstation", "ReadBashHistory"));
    assert!(result.done);
    assert_eq!(
        result.status,
        EpisodeStatus::Terminated(TerminationReason::DefenderGoalReached)
    );
    assert!(approx_eq(result.reward, 0.0));
    assert_eq!(episode.episode_rewards(), [22.0]);
    assert_eq!(
        episode.environment().get_node("workstation").unwrap().status,
        MachineStatus::Imaging
    );
}

#[test]
fn broken_service_level_ends_the_episode() {
    let mut config = SimulationConfig::default();
    config.defender_constraint.maintain_sla = 0.9;
    let stop_database = |env: &mut Environment, defender: &mut DefenderActuator, step: u64| {
        if step == 1 {
            defender
                .stop_service(env, "database", "SQL")
                .expect("database is running");
        }
    };
    let mut episode = episode_with("lateral.yaml", config).with_defender(stop_database);

    let first = step(&mut episode, local("workstation", "ReadBashHistory"));
    assert!(!first.done);
    assert!(approx_eq(first.info.network_availability, 1.0));

    let second = step(&mut episode, local("workstation", "SudoMisconfig"));
    assert!(second.done);
    assert_eq!(
        second.status,
        EpisodeStatus::Terminated(TerminationReason::DefenderConstraintBroken)
    );
    assert!(approx_eq(second.reward, 1000.0));
    assert!(approx_eq(second.info.network_availability, 7.0 / 9.0));
    assert!(approx_eq(episode.network_availability(), 7.0 / 9.0));
}

#[test]
fn parts_mut_drives_the_actuators() {
    let mut episode = episode("lateral.yaml");
    let (mut attacker, defender) = episode.parts_mut();
    let result = attacker
        .exploit_local_vulnerability("workstation", "SudoMisconfig")
        .unwrap();
    assert_eq!(result.discoveries.escalation, Some(PrivilegeLevel::Admin));
    assert!(approx_eq(defender.network_availability(), 1.0));
    assert_eq!(
        episode.attacker_view().get_node_privilegelevel("workstation").unwrap(),
        PrivilegeLevel::Admin
    );
}
