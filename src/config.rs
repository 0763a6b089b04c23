//! Simulation configuration: goals, reward tables and bounds.
//!
//! Everything here is plain data passed into [`Episode::new`](crate::episode::Episode::new).
//! Every field has a default, so a YAML configuration only lists what it changes.

use crate::error::ParseError;
use crate::error::ParseErrorKind;
use crate::graph::Environment;
use crate::profile::ANONYMOUS_USERNAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rewards granted for progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardTable {
    pub node_discovered: f64,
    pub credential_discovered: f64,
    pub property_discovered: f64,
    pub profile_discovered: f64,
    pub new_successful_attack: f64,
    pub lateral_move: f64,
}

impl Default for RewardTable {
    fn default() -> Self {
        RewardTable {
            node_discovered: 5.0,
            credential_discovered: 3.0,
            property_discovered: 2.0,
            profile_discovered: 5.0,
            new_successful_attack: 7.0,
            lateral_move: 100.0,
        }
    }
}

/// Negative rewards for failed or pointless actions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PenaltyTable {
    pub suspiciousness: f64,
    pub scanning_unopen_port: f64,
    pub repeat: f64,
    pub local_exploit_failed: f64,
    pub failed_remote_exploit: f64,
    pub machine_not_running: f64,
    pub wrong_password: f64,
    pub blocked_by_local_firewall: f64,
    pub blocked_by_remote_firewall: f64,
    pub invalid_action: f64,
    pub invalid_credential_index: f64,
}

impl Default for PenaltyTable {
    fn default() -> Self {
        PenaltyTable {
            suspiciousness: -5.0,
            scanning_unopen_port: -10.0,
            repeat: -1.0,
            local_exploit_failed: -20.0,
            failed_remote_exploit: -50.0,
            machine_not_running: 0.0,
            wrong_password: -10.0,
            blocked_by_local_firewall: -10.0,
            blocked_by_remote_firewall: -10.0,
            invalid_action: -1.0,
            invalid_credential_index: -1.0,
        }
    }
}

/// Conditions that all must hold for the attacker to win.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttackerGoal {
    /// Minimum cumulative episode reward.
    pub reward: f64,
    /// Network availability must drop below this. Only checked with a defender.
    pub low_availability: f64,
    pub own_atleast: usize,
    /// Fraction of all nodes that must be owned.
    pub own_atleast_percent: f64,
    pub ctf_flag: bool,
}

impl Default for AttackerGoal {
    fn default() -> Self {
        AttackerGoal {
            reward: f64::MIN,
            low_availability: 1.0,
            own_atleast: 0,
            own_atleast_percent: 1.0,
            ctf_flag: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefenderGoal {
    /// The defender wins once the attacker owns no node.
    pub eviction: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefenderConstraint {
    /// Availability below this breaks the defender's service level.
    pub maintain_sla: f64,
}

/// Limits that size the numeric action space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsConfig {
    pub maximum_total_credentials: usize,
    /// Defaults to the node count of the network.
    pub maximum_node_count: Option<usize>,
    pub maximum_discoverable_credentials_per_action: usize,
    pub minimum_profiles_count: usize,
    pub maximum_vulnerability_variables: usize,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        BoundsConfig {
            maximum_total_credentials: 1000,
            maximum_node_count: None,
            maximum_discoverable_credentials_per_action: 5,
            minimum_profiles_count: 1,
            maximum_vulnerability_variables: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub attacker_goal: AttackerGoal,
    pub defender_goal: DefenderGoal,
    pub defender_constraint: DefenderConstraint,
    pub winning_reward: f64,
    pub losing_reward: f64,
    /// Surface invalid actuator references as errors instead of penalty rewards.
    pub throws_on_invalid_actions: bool,
    pub rewards: RewardTable,
    pub penalties: PenaltyTable,
    pub bounds: BoundsConfig,
    /// Detection point name → enabled. Unlisted detection points stay enabled.
    pub honeytokens: BTreeMap<String, bool>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            attacker_goal: AttackerGoal::default(),
            defender_goal: DefenderGoal::default(),
            defender_constraint: DefenderConstraint::default(),
            winning_reward: 1000.0,
            losing_reward: 0.0,
            throws_on_invalid_actions: false,
            rewards: RewardTable::default(),
            penalties: PenaltyTable::default(),
            bounds: BoundsConfig::default(),
            honeytokens: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml(input: &str) -> Result<Self, ParseError> {
        if input.trim().is_empty() {
            return Ok(SimulationConfig::default());
        }
        let value: serde_json::Value = serde_saphyr::from_str(input).map_err(|e| ParseError {
            kind: ParseErrorKind::Syntax,
            message: e.to_string(),
            path: None,
            line: None,
            column: None,
        })?;
        serde_json::from_value(value).map_err(|e| {
            let message = e.to_string();
            let kind = if message.contains("unknown field") || message.contains("unknown variant") {
                ParseErrorKind::UnknownVariant
            } else {
                ParseErrorKind::TypeMismatch
            };
            ParseError {
                kind,
                message,
                path: None,
                line: None,
                column: None,
            }
        })
    }
}

/// Effective sizes of the numeric action space for one environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvironmentBounds {
    pub maximum_node_count: usize,
    pub maximum_total_credentials: usize,
    pub maximum_discoverable_credentials_per_action: usize,
    /// Twice the profile slots: the upper half addresses the `ip.local` twins.
    pub maximum_profiles_count: usize,
    pub maximum_vulnerability_variables: usize,
    pub local_vulnerabilities_count: usize,
    pub port_count: usize,
    pub property_count: usize,
}

impl EnvironmentBounds {
    pub fn of(env: &Environment, config: &BoundsConfig) -> Self {
        let ids = env.identifiers();
        let anonymous_slot = usize::from(!ids.profile_usernames.iter().any(|u| u == ANONYMOUS_USERNAME));
        let global_remote = env.global_remote_vulnerabilities().count();
        let widest_node = env
            .nodes()
            .map(|n| n.remote_vulnerabilities().count())
            .max()
            .unwrap_or(0);
        EnvironmentBounds {
            maximum_node_count: config.maximum_node_count.unwrap_or(env.node_count()),
            maximum_total_credentials: config.maximum_total_credentials,
            maximum_discoverable_credentials_per_action: config
                .maximum_discoverable_credentials_per_action,
            maximum_profiles_count: ((ids.profile_usernames.len() + anonymous_slot) * 2)
                .max(config.minimum_profiles_count),
            maximum_vulnerability_variables: (widest_node + global_remote)
                .max(config.maximum_vulnerability_variables),
            local_vulnerabilities_count: ids.local_vulnerabilities.len(),
            port_count: ids.ports.len(),
            property_count: ids.properties.len(),
        }
    }

    /// Number of profile slots below the `ip.local` half.
    pub fn profile_slots(&self) -> usize {
        self.maximum_profiles_count / 2
    }
}
