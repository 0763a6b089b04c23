//! End-to-end attack paths through the tiny medical-portal network.

use cybersim::SimulationConfig;
use cybersim::enums::*;
use cybersim::episode::{Action, Episode, EpisodeStatus, NamedAction, StepResult};

use super::common::*;

const CLIENT: &str = "client_browser";

fn expect_reward(episode: &mut Episode, action: NamedAction, reward: f64) -> StepResult {
    let description = action.to_string();
    let result = step(episode, action);
    assert!(
        approx_eq(result.reward, reward),
        "{}: expected {}, got {} ({})",
        description,
        reward,
        result.reward,
        result.info.reward_string
    );
    result
}

/// Walk the network up to the point where the chemist profile is known.
fn walk_to_chemist(episode: &mut Episode) {
    expect_reward(episode, local(CLIENT, "ScanPageSource"), 33.0);
    expect_reward(episode, remote(CLIENT, "GET_/v2/login", "username.NoAuth", "ScanLoginPage"), 13.0);
    expect_reward(episode, remote(CLIENT, "POST_/v2/register", "username.NoAuth", "RegisterPatient"), 21.0);
    expect_reward(episode, local(CLIENT, "ScanBlockRegister"), 13.0);
    expect_reward(episode, remote(CLIENT, "GET_/v2/calendar", "username.patient", "ValidWeekday"), 11.0);
    expect_reward(episode, remote(CLIENT, "GET_/v2/users", "username.LisaGWhite", "Username"), 16.0);
    expect_reward(episode, remote(CLIENT, "GET_/v2/messages", "username.LisaGWhite", "ReadMessages"), 11.0);
    expect_reward(episode, remote(CLIENT, "GET_/v2/users", "username.MarioDFiles", "Username"), 8.0);
    let disclosed = expect_reward(
        episode,
        remote(CLIENT, "GET_/v2/messages", "username.MarioDFiles", "ReadMessages"),
        -2.0,
    );
    assert!(disclosed.observation.ip_local_disclosed);
    expect_reward(
        episode,
        remote(CLIENT, "GET_/v2/users", "username.patient&ip.local", "DumpUsers"),
        21.0,
    );
}

#[test]
fn scanning_the_page_source() {
    let mut episode = episode("tinymicro.yaml");
    let first = expect_reward(&mut episode, local(CLIENT, "ScanPageSource"), 33.0);
    assert_eq!(first.observation.newly_discovered_nodes_count, 5);
    assert_eq!(first.observation.probe_result, ProbeResult::Succeeded);
    assert_eq!(
        first.info.reward_string,
        "Viewing the web page source reveals main endpoints"
    );
    assert_eq!(
        episode.discovered_nodes(),
        [
            CLIENT,
            "GET_/v2",
            "GET_/v2/login",
            "POST_/v2/register",
            "GET_/v2/messages",
            "GET_/v2/documents"
        ]
    );

    let repeat = expect_reward(&mut episode, local(CLIENT, "ScanPageSource"), -2.0);
    assert_eq!(repeat.observation.newly_discovered_nodes_count, 0);
}

#[test]
fn every_matching_branch_fires() {
    let mut episode = episode("tinymicro.yaml");
    step(&mut episode, local(CLIENT, "ScanPageSource"));
    let result = expect_reward(
        &mut episode,
        remote(CLIENT, "GET_/v2", "username.NoAuth", "BrowsingTarget"),
        -1.0,
    );
    assert_eq!(result.observation.exploit_result, ExploitResult::Failed);
    assert_eq!(result.info.precondition, "true | property.git | robots.txt");
    assert_eq!(
        result.info.reward_string,
        "Forced browsing attempt; Forced browsing attempt; Forced browsing attempt"
    );
    assert_eq!(
        episode.environment().edge(CLIENT, "GET_/v2"),
        Some(EdgeAnnotation::RemoteExploit)
    );
}

#[test]
fn initial_properties_are_known_from_the_start() {
    let episode = episode("tinymicro.yaml");
    assert!(episode.state().is_property_revealed("GET_/v2", "robots.txt"));
    assert!(!episode.state().is_property_revealed("GET_/v2/users", "username"));
}

#[test]
fn unmatched_precondition_fails_the_remote_exploit() {
    let mut episode = episode("tinymicro.yaml");
    step(&mut episode, local(CLIENT, "ScanPageSource"));
    let result = expect_reward(
        &mut episode,
        remote(CLIENT, "GET_/v2/documents", "username.NoAuth", "ReadDocuments"),
        -50.0,
    );
    assert_eq!(result.observation.exploit_result, ExploitResult::Failed);
    assert_eq!(result.info.precondition, "~username.NoAuth & roles.isChemist");
    assert!(!result.observation.customer_data_found);
    assert_eq!(episode.environment().edge(CLIENT, "GET_/v2/documents"), Some(EdgeAnnotation::Knows));
}

#[test]
fn only_the_matching_branch_leaks() {
    let mut episode = episode("tinymicro.yaml");
    step(&mut episode, local(CLIENT, "ScanPageSource"));
    step(&mut episode, remote(CLIENT, "POST_/v2/register", "username.NoAuth", "RegisterPatient"));
    step(&mut episode, local(CLIENT, "ScanBlockRegister"));
    step(&mut episode, remote(CLIENT, "GET_/v2/calendar", "username.patient", "ValidWeekday"));
    let result = step(&mut episode, remote(CLIENT, "GET_/v2/users", "username.LisaGWhite", "Username"));
    assert_eq!(result.info.reward_string, "Session id and roles for LisaGWhite");
    assert_eq!(result.observation.newly_discovered_profiles_count, 2);

    let usernames: Vec<&str> = episode
        .discovered_profiles()
        .iter()
        .filter_map(|p| p.username.as_deref())
        .collect();
    assert_eq!(usernames, vec!["NoAuth", "patient", "LisaGWhite"]);
    assert_eq!(
        episode.discovered_profiles()[2].to_string(),
        "username.LisaGWhite&id.994D5244&roles.isDoctor"
    );
}

#[test]
fn local_access_unlocks_the_user_dump() {
    let mut episode = episode("tinymicro.yaml");
    walk_to_chemist(&mut episode);

    assert!(episode.state().ip_local());
    let usernames: Vec<&str> = episode
        .discovered_profiles()
        .iter()
        .filter_map(|p| p.username.as_deref())
        .collect();
    assert_eq!(
        usernames,
        vec!["NoAuth", "patient", "LisaGWhite", "MarioDFiles", "JamesMPaterson"]
    );
    // Stored profiles never carry ip.local.
    assert!(episode.discovered_profiles().iter().all(|p| !p.is_local()));

    let chemist = episode
        .encode_action(&remote(CLIENT, "GET_/v2/documents", "username.JamesMPaterson", "ReadDocuments"))
        .unwrap();
    let twin = match chemist {
        Action::Remote {
            source,
            target,
            profile,
            variant,
        } => {
            assert_eq!(profile, 4);
            Action::Remote {
                source,
                target,
                profile: profile + episode.bounds().profile_slots(),
                variant,
            }
        }
        other => panic!("unexpected {:?}", other),
    };
    assert!(episode.is_action_valid(&twin));
    assert_eq!(
        episode.describe_action(&twin),
        Some(remote(
            CLIENT,
            "GET_/v2/documents",
            "username.JamesMPaterson&id.68097B9D&roles.isChemist&ip.local",
            "ReadDocuments"
        ))
    );
}

#[test]
fn dump_users_needs_local_access() {
    let mut episode = episode("tinymicro.yaml");
    step(&mut episode, local(CLIENT, "ScanPageSource"));
    step(&mut episode, remote(CLIENT, "POST_/v2/register", "username.NoAuth", "RegisterPatient"));
    // ip.local is not disclosed yet, so the twin profile is not addressable.
    assert_eq!(
        episode.encode_action(&remote(CLIENT, "GET_/v2/users", "username.patient", "DumpUsers")),
        Some(Action::Remote {
            source: 0,
            target: 6,
            profile: 1,
            variant: 0,
        })
    );
    let without = expect_reward(
        &mut episode,
        remote(CLIENT, "GET_/v2/users", "username.patient", "DumpUsers"),
        -50.0,
    );
    assert_eq!(without.observation.newly_discovered_profiles_count, 0);
    assert!(!episode.is_action_valid(&Action::Remote {
        source: 0,
        target: 6,
        profile: 6,
        variant: 0,
    }));
}

#[test]
fn chemist_reads_the_documents() {
    let mut episode = episode("tinymicro.yaml");
    walk_to_chemist(&mut episode);
    let result = expect_reward(
        &mut episode,
        remote(CLIENT, "GET_/v2/documents", "username.JamesMPaterson", "ReadDocuments"),
        106.0,
    );
    assert!(result.observation.customer_data_found);
    assert!(result.observation.ctf_flag);
    assert!(episode.state().ctf_captured());
    assert!(!result.done, "owning every node is still required");
    assert_eq!(episode.step_count(), 11);
}

#[test]
fn capturing_the_flag_wins() {
    let mut config = SimulationConfig::default();
    config.attacker_goal.ctf_flag = true;
    config.attacker_goal.own_atleast_percent = 0.0;
    let mut episode = episode_with("tinymicro.yaml", config);
    walk_to_chemist(&mut episode);
    assert!(!episode.is_done());

    let result = step(
        &mut episode,
        remote(CLIENT, "GET_/v2/documents", "username.JamesMPaterson", "ReadDocuments"),
    );
    assert!(result.done);
    assert!(approx_eq(result.reward, 1000.0));
    assert_eq!(
        result.status,
        EpisodeStatus::Terminated(TerminationReason::AttackerGoalReached)
    );
    assert!(approx_eq(*episode.episode_rewards().last().unwrap(), 106.0));
}

#[test]
fn reward_goal_terminates() {
    let mut config = SimulationConfig::default();
    config.attacker_goal.reward = 40.0;
    config.attacker_goal.own_atleast_percent = 0.0;
    let mut episode = episode_with("tinymicro.yaml", config);
    let first = step(&mut episode, local(CLIENT, "ScanPageSource"));
    assert!(!first.done);
    let second = step(&mut episode, remote(CLIENT, "GET_/v2/login", "username.NoAuth", "ScanLoginPage"));
    assert!(second.done);
}
