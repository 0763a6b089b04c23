use cybersim::attacker::AttackerActuator;
use cybersim::defender::{
    DefenderActuator, DefenderPolicy, REIMAGING_DURATION, ReimageOwnedNodes, network_availability,
};
use cybersim::enums::*;
use cybersim::error::ActionErrorKind;
use cybersim::state::EpisodeState;
use cybersim::{Environment, SimulationConfig};

use super::common::{approx_eq, environment};

fn lateral() -> Environment {
    (*environment("lateral.yaml")).clone()
}

/// Own the webserver through the leaked HTTPS credential.
fn own_webserver(env: &mut Environment, state: &mut EpisodeState, config: &SimulationConfig, step: u64) {
    let mut attacker = AttackerActuator::new(env, state, config, step);
    attacker
        .exploit_local_vulnerability("workstation", "ReadBashHistory")
        .unwrap();
    attacker
        .connect_to_remote_machine("workstation", "webserver", "HTTPS", "web_admin")
        .unwrap();
}

#[test]
fn full_availability_at_start() {
    let env = lateral();
    assert!(approx_eq(network_availability(&env), 1.0));
    assert!(approx_eq(DefenderActuator::new().network_availability(), 1.0));
}

#[test]
fn stopped_service_lowers_availability() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();
    defender.stop_service(&mut env, "database", "SQL").unwrap();
    defender.on_attacker_step_taken(&mut env, 1);
    assert!(
        approx_eq(defender.network_availability(), 7.0 / 9.0),
        "{}",
        defender.network_availability()
    );

    defender.start_service(&mut env, "database", "SQL").unwrap();
    defender.on_attacker_step_taken(&mut env, 2);
    assert!(approx_eq(defender.network_availability(), 1.0));
}

#[test]
fn reimaging_takes_the_node_offline_for_a_while() {
    let mut env = lateral();
    let mut state = EpisodeState::new(&env);
    let config = SimulationConfig::default();
    own_webserver(&mut env, &mut state, &config, 1);

    let mut defender = DefenderActuator::new();
    defender.on_attacker_step_taken(&mut env, 1);
    defender.reimage_node(&mut env, "webserver").unwrap();
    let node = env.get_node("webserver").unwrap();
    assert_eq!(node.status, MachineStatus::Imaging);
    assert!(!node.agent_installed);
    assert_eq!(node.privilege_level, PrivilegeLevel::NoAccess);
    assert_eq!(node.last_reimaging, Some(1));
    // webserver is down entirely: 2 of 3 equally weighted nodes remain
    defender.on_attacker_step_taken(&mut env, 2);
    assert!(approx_eq(defender.network_availability(), 2.0 / 3.0));

    for step in 3..=(REIMAGING_DURATION as u64 + 1) {
        defender.on_attacker_step_taken(&mut env, step);
        assert_eq!(
            env.get_node("webserver").unwrap().status,
            MachineStatus::Imaging,
            "step {}",
            step
        );
    }
    assert_eq!(defender.reimaging_progress()["webserver"], 0);

    defender.on_attacker_step_taken(&mut env, REIMAGING_DURATION as u64 + 2);
    assert_eq!(env.get_node("webserver").unwrap().status, MachineStatus::Running);
    assert!(defender.reimaging_progress().is_empty());
    assert!(approx_eq(defender.network_availability(), 1.0));
}

#[test]
fn non_reimagable_node_is_refused() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();
    let err = defender.reimage_node(&mut env, "database").unwrap_err();
    assert_eq!(err.kind, ActionErrorKind::InconsistentState);
    assert_eq!(env.get_node("database").unwrap().status, MachineStatus::Running);
}

#[test]
fn services_of_an_imaging_node_cannot_change() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();
    defender.reimage_node(&mut env, "webserver").unwrap();
    let err = defender.stop_service(&mut env, "webserver", "HTTPS").unwrap_err();
    assert_eq!(err.kind, ActionErrorKind::InconsistentState);
}

#[test]
fn unknown_node_is_an_error() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();
    let err = defender.evict_attacker(&mut env, "ghost").unwrap_err();
    assert_eq!(err.kind, ActionErrorKind::UnknownNode);
}

#[test]
fn firewall_overrides() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();

    defender.allow_traffic(&mut env, "webserver", "SSH", true).unwrap();
    assert!(env.get_node("webserver").unwrap().firewall.allows_incoming("SSH"));

    defender.block_traffic(&mut env, "webserver", "HTTPS", true).unwrap();
    assert!(!env.get_node("webserver").unwrap().firewall.allows_incoming("HTTPS"));

    // No rule for SQL yet on the workstation: one is appended.
    defender.allow_traffic(&mut env, "workstation", "SQL", false).unwrap();
    let firewall = &env.get_node("workstation").unwrap().firewall;
    assert!(firewall.allows_outgoing("SQL"));
    assert_eq!(firewall.outgoing.last().unwrap().port, "SQL");
}

#[test]
fn eviction_keeps_the_node_running() {
    let mut env = lateral();
    let mut state = EpisodeState::new(&env);
    let config = SimulationConfig::default();
    own_webserver(&mut env, &mut state, &config, 1);

    let mut defender = DefenderActuator::new();
    defender.evict_attacker(&mut env, "webserver").unwrap();
    let node = env.get_node("webserver").unwrap();
    assert!(!node.agent_installed);
    assert_eq!(node.status, MachineStatus::Running);
}

#[test]
fn reimaged_node_forgets_earlier_exploits() {
    let mut env = lateral();
    let mut state = EpisodeState::new(&env);
    let config = SimulationConfig::default();
    own_webserver(&mut env, &mut state, &config, 1);
    {
        let mut attacker = AttackerActuator::new(&mut env, &mut state, &config, 2);
        let first = attacker
            .exploit_local_vulnerability("webserver", "DumpConfig")
            .unwrap();
        assert!(approx_eq(first.reward, 58.0), "{}", first.reward);
    }

    let mut defender = DefenderActuator::new();
    defender.on_attacker_step_taken(&mut env, 3);
    defender.reimage_node(&mut env, "webserver").unwrap();
    for step in 4..=(4 + REIMAGING_DURATION as u64) {
        defender.on_attacker_step_taken(&mut env, step);
    }
    assert_eq!(env.get_node("webserver").unwrap().status, MachineStatus::Running);

    let mut attacker = AttackerActuator::new(&mut env, &mut state, &config, 30);
    let back = attacker
        .connect_to_remote_machine("workstation", "webserver", "HTTPS", "web_admin")
        .unwrap();
    assert!(approx_eq(back.reward, config.rewards.lateral_move), "{}", back.reward);
    // Nothing new to find, but the exploit counts as new again.
    let again = attacker
        .exploit_local_vulnerability("webserver", "DumpConfig")
        .unwrap();
    assert!(approx_eq(again.reward, 6.0), "{}", again.reward);
}

#[test]
fn closures_are_policies() {
    let mut env = lateral();
    let mut defender = DefenderActuator::new();
    let mut calls = Vec::new();
    let mut policy = |_: &mut Environment, _: &mut DefenderActuator, step: u64| calls.push(step);
    policy.step(&mut env, &mut defender, 4);
    policy.step(&mut env, &mut defender, 5);
    assert_eq!(calls, vec![4, 5]);
}

#[test]
fn scanner_reimages_owned_nodes_round_robin() {
    let mut env = lateral();
    let mut state = EpisodeState::new(&env);
    let config = SimulationConfig::default();
    own_webserver(&mut env, &mut state, &config, 1);

    let mut defender = DefenderActuator::new();
    let mut scanner = ReimageOwnedNodes::new(2, 1);

    // Odd steps are skipped.
    scanner.step(&mut env, &mut defender, 1);
    assert!(defender.reimaging_progress().is_empty());

    // Step 2 scans the workstation and reimages it.
    scanner.step(&mut env, &mut defender, 2);
    assert_eq!(
        defender.reimaging_progress().keys().collect::<Vec<_>>(),
        vec!["workstation"]
    );

    // Step 4 scans the webserver.
    scanner.step(&mut env, &mut defender, 4);
    assert!(defender.reimaging_progress().contains_key("webserver"));

    // Step 6 scans the database, which is neither owned nor reimagable.
    scanner.step(&mut env, &mut defender, 6);
    assert_eq!(defender.reimaging_progress().len(), 2);
    assert_eq!(env.get_node("database").unwrap().status, MachineStatus::Running);
}

#[test]
fn zero_scan_frequency_scans_every_step() {
    let mut env = lateral();
    let mut state = EpisodeState::new(&env);
    let config = SimulationConfig::default();
    own_webserver(&mut env, &mut state, &config, 1);

    let mut defender = DefenderActuator::new();
    let mut scanner = ReimageOwnedNodes::new(0, 1);
    assert_eq!(scanner.scan_frequency(), 1);
    assert_eq!(scanner.scan_capacity(), 1);

    scanner.step(&mut env, &mut defender, 1);
    scanner.step(&mut env, &mut defender, 2);
    assert_eq!(
        defender.reimaging_progress().keys().collect::<Vec<_>>(),
        vec!["webserver", "workstation"]
    );
}
