//! Action/observation coordinator.
//!
//! An [`Episode`] owns a working copy of an immutable [`Environment`] template
//! together with the per-episode [`EpisodeState`]. Each [`Episode::step`]
//! validates a numeric [`Action`] against the current mask, delegates to the
//! attacker actuator, lets the defender react, and decides termination.

use crate::attacker::{ActionResult, AttackerActuator, AttackerView};
use crate::config::{EnvironmentBounds, SimulationConfig};
use crate::defender::{DefenderActuator, DefenderPolicy};
use crate::enums::*;
use crate::error::{ActionError, ActionErrorKind, StepError, ValidationError};
use crate::graph::{Edge, Environment};
use crate::mask::ActionMask;
use crate::profile::Profile;
use crate::state::EpisodeState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

// ─── Actions ────────────────────────────────────────────────────────────────

/// A numeric action. Node, profile and credential indices are discovery-order
/// positions; vulnerability and port indices address the identifier vocabularies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Local {
        source: usize,
        vulnerability: usize,
    },
    Remote {
        source: usize,
        target: usize,
        /// Indices at or above half the profile bound address the `ip.local` twin.
        profile: usize,
        variant: usize,
    },
    Connect {
        source: usize,
        target: usize,
        port: usize,
        credential: usize,
    },
}

/// The same action addressed by identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedAction {
    Local {
        node: NodeId,
        vulnerability: VulnerabilityId,
    },
    Remote {
        source: NodeId,
        target: NodeId,
        /// Profile descriptor, e.g. `username.NoAuth&ip.local`.
        profile: String,
        vulnerability: VulnerabilityId,
    },
    Connect {
        source: NodeId,
        target: NodeId,
        port: PortName,
        credential: CredentialId,
    },
}

impl std::fmt::Display for NamedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedAction::Local {
                node,
                vulnerability,
            } => write!(f, "local {} on {}", vulnerability, node),
            NamedAction::Remote {
                source,
                target,
                profile,
                vulnerability,
            } => write!(
                f,
                "remote {} from {} to {} as {}",
                vulnerability, source, target, profile
            ),
            NamedAction::Connect {
                source,
                target,
                port,
                credential,
            } => write!(
                f,
                "connect {} to {}:{} with {}",
                source, target, port, credential
            ),
        }
    }
}

// ─── Observation ────────────────────────────────────────────────────────────

/// Property knowledge codes used in [`Observation::discovered_nodes_properties`].
pub const PROPERTY_UNKNOWN: u8 = 0;
pub const PROPERTY_SET: u8 = 1;
pub const PROPERTY_NOT_SET: u8 = 2;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Observation {
    pub newly_discovered_nodes_count: usize,
    /// New profile facts, including facts merged into known profiles.
    pub newly_discovered_profiles_count: usize,
    /// Newly cached credentials with their cache index.
    pub leaked_credentials: Vec<(usize, CachedCredential)>,
    pub lateral_move: bool,
    pub customer_data_found: bool,
    pub probe_result: ProbeResult,
    pub exploit_result: ExploitResult,
    pub escalation: Option<PrivilegeLevel>,
    pub ctf_flag: bool,
    pub ip_local_disclosed: bool,
    pub discovered_node_count: usize,
    pub discovered_profile_count: usize,
    pub credential_cache_length: usize,
    /// Privilege level per discovered node, in discovery order.
    pub nodes_privilegelevel: Vec<PrivilegeLevel>,
    /// One row per discovered node, one column per declared property.
    pub discovered_nodes_properties: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepInfo {
    pub description: String,
    pub step_count: u64,
    pub network_availability: f64,
    pub precondition: String,
    pub profile: String,
    pub reward_string: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Active,
    Terminated(TerminationReason),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub status: EpisodeStatus,
    pub info: StepInfo,
}

/// A discovered node as the attacker sees it.
#[derive(Clone, Debug, PartialEq)]
pub enum ExploredNode<'a> {
    Owned(&'a Node),
    Discovered {
        id: &'a str,
        privilege_level: PrivilegeLevel,
        properties: BTreeSet<&'a str>,
    },
}

impl ExploredNode<'_> {
    pub fn id(&self) -> &str {
        match self {
            ExploredNode::Owned(node) => &node.id,
            ExploredNode::Discovered { id, .. } => id,
        }
    }
}

/// Induced subgraph over the discovered nodes.
#[derive(Clone, Debug)]
pub struct ExploredNetwork<'a> {
    pub nodes: Vec<ExploredNode<'a>>,
    pub edges: Vec<Edge<'a>>,
}

// ─── Episode ────────────────────────────────────────────────────────────────

pub struct Episode {
    template: Arc<Environment>,
    config: SimulationConfig,
    bounds: EnvironmentBounds,
    env: Environment,
    state: EpisodeState,
    defender: Option<Box<dyn DefenderPolicy>>,
    defender_actuator: DefenderActuator,
    step_count: u64,
    rewards: Vec<f64>,
    status: EpisodeStatus,
}

impl Episode {
    /// Prepare an episode over `template` and reset it.
    ///
    /// Fails when the network exceeds the configured bounds: more nodes than
    /// `maximum_node_count` (B-001) or a branch leaking more credentials than
    /// `maximum_discoverable_credentials_per_action` (B-002).
    pub fn new(
        template: Arc<Environment>,
        config: SimulationConfig,
    ) -> Result<Self, Vec<ValidationError>> {
        let template = if config.honeytokens.values().all(|on| *on) {
            template
        } else {
            Arc::new(template.with_honeytokens(&config.honeytokens))
        };
        let bounds = EnvironmentBounds::of(&template, &config.bounds);
        check_bounds(&template, &bounds)?;

        let env = (*template).clone();
        let state = EpisodeState::new(&env);
        let mut episode = Episode {
            template,
            config,
            bounds,
            env,
            state,
            defender: None,
            defender_actuator: DefenderActuator::new(),
            step_count: 0,
            rewards: Vec::new(),
            status: EpisodeStatus::Active,
        };
        episode.reset();
        Ok(episode)
    }

    pub fn with_defender(mut self, policy: impl DefenderPolicy + 'static) -> Self {
        self.defender = Some(Box::new(policy));
        self
    }

    /// Start over from the template. Returns the initial observation.
    pub fn reset(&mut self) -> Observation {
        self.env = (*self.template).clone();
        self.state = EpisodeState::new(&self.env);
        self.defender_actuator = DefenderActuator::new();
        self.step_count = 0;
        self.rewards.clear();
        self.status = EpisodeStatus::Active;
        info!(
            nodes = self.env.node_count(),
            entry_nodes = self.state.discovered_nodes().len(),
            "episode reset"
        );
        self.observe(&ActionResult::penalty(0.0, ""))
    }

    /// Run one attacker action, then the defender.
    ///
    /// Invalid actions are penalized, not rejected. Errors only for a
    /// terminated episode, or for invalid references in strict mode; a step
    /// that errors is not counted.
    pub fn step(&mut self, action: Action) -> Result<StepResult, StepError> {
        if matches!(self.status, EpisodeStatus::Terminated(_)) {
            return Err(StepError::EpisodeTerminated);
        }
        let step = self.step_count + 1;
        let description = self
            .describe_action(&action)
            .map(|named| named.to_string())
            .unwrap_or_else(|| format!("{:?}", action));

        let result = match action {
            Action::Connect { credential, .. }
                if credential >= self.state.credential_cache().len() =>
            {
                ActionResult::penalty(
                    self.config.penalties.invalid_credential_index,
                    "credential index beyond the credential cache",
                )
            }
            _ if !self.is_action_valid(&action) => {
                warn!(?action, step, "action outside the valid mask");
                ActionResult::penalty(
                    self.config.penalties.suspiciousness,
                    "action outside the valid mask",
                )
            }
            _ => match self.actuate(&action, step) {
                Ok(result) => result,
                Err(error) if error.kind == ActionErrorKind::InconsistentState => {
                    warn!(%error, step, "inconsistent action degraded to a no-op");
                    ActionResult::penalty(0.0, error.message)
                }
                Err(error) => return Err(error.into()),
            },
        };
        self.step_count = step;
        self.rewards.push(result.reward);

        self.defender_actuator
            .on_attacker_step_taken(&mut self.env, step);
        if let Some(policy) = self.defender.as_mut() {
            policy.step(&mut self.env, &mut self.defender_actuator, step);
        }

        let mut reward = result.reward;
        if self.attacker_goal_reached() {
            self.status = EpisodeStatus::Terminated(TerminationReason::AttackerGoalReached);
            reward = self.config.winning_reward;
        } else if self.defender_constraint_broken() {
            self.status = EpisodeStatus::Terminated(TerminationReason::DefenderConstraintBroken);
            reward = self.config.winning_reward;
        } else if self.defender_goal_reached() {
            self.status = EpisodeStatus::Terminated(TerminationReason::DefenderGoalReached);
            reward = self.config.losing_reward;
        }
        if let EpisodeStatus::Terminated(reason) = self.status {
            info!(?reason, step, total = self.total_reward(), "episode terminated");
        }

        Ok(StepResult {
            observation: self.observe(&result),
            reward,
            done: self.is_done(),
            status: self.status,
            info: StepInfo {
                description,
                step_count: step,
                network_availability: self.defender_actuator.network_availability(),
                precondition: result.precondition,
                profile: result.profile,
                reward_string: result.reward_string,
            },
        })
    }

    fn actuate(&mut self, action: &Action, step: u64) -> Result<ActionResult, ActionError> {
        let remote_profile = match *action {
            Action::Remote { profile, .. } => self.profile_at(profile),
            _ => None,
        };
        let named = self.describe_action(action).ok_or_else(|| {
            ActionError::new(
                ActionErrorKind::InvalidNodeReference,
                format!("{:?} does not resolve in this episode", action),
            )
        })?;
        let mut actuator =
            AttackerActuator::new(&mut self.env, &mut self.state, &self.config, step);
        match named {
            NamedAction::Local {
                node,
                vulnerability,
            } => actuator.exploit_local_vulnerability(&node, &vulnerability),
            NamedAction::Remote {
                source,
                target,
                vulnerability,
                ..
            } => {
                let profile = remote_profile
                    .ok_or_else(|| ActionError::inconsistent("profile index does not resolve"))?;
                actuator.exploit_remote_vulnerability(&source, &target, &profile, &vulnerability)
            }
            NamedAction::Connect {
                source,
                target,
                port,
                credential,
            } => actuator.connect_to_remote_machine(&source, &target, &port, &credential),
        }
    }

    // ─── Termination ────────────────────────────────────────────────────────

    fn owned_count(&self) -> usize {
        self.attacker_view()
            .get_nodes_with_atleast_privilegelevel(PrivilegeLevel::LocalUser)
            .len()
    }

    fn attacker_goal_reached(&self) -> bool {
        let goal = &self.config.attacker_goal;
        let owned = self.owned_count();
        if self.total_reward() < goal.reward || owned < goal.own_atleast {
            return false;
        }
        let nodes = self.env.node_count().max(1);
        if (owned as f64) / (nodes as f64) < goal.own_atleast_percent {
            return false;
        }
        if goal.ctf_flag && !self.state.ctf_captured() {
            return false;
        }
        !(self.defender.is_some()
            && self.defender_actuator.network_availability() >= goal.low_availability)
    }

    fn defender_constraint_broken(&self) -> bool {
        self.defender.is_some()
            && self.defender_actuator.network_availability()
                < self.config.defender_constraint.maintain_sla
    }

    fn defender_goal_reached(&self) -> bool {
        self.config.defender_goal.eviction && self.owned_count() == 0
    }

    // ─── Observation ────────────────────────────────────────────────────────

    fn observe(&self, result: &ActionResult) -> Observation {
        let view = self.attacker_view();
        let properties = &self.env.identifiers().properties;
        let discovered = self.state.discovered_nodes();
        let d = &result.discoveries;

        let mut nodes_privilegelevel = Vec::with_capacity(discovered.len());
        let mut discovered_nodes_properties = Vec::with_capacity(discovered.len());
        for id in discovered {
            let Ok(node) = self.env.get_node(id) else {
                continue;
            };
            let known = view.get_discovered_properties(id).unwrap_or_default();
            let owned = node.privilege_level >= PrivilegeLevel::LocalUser;
            nodes_privilegelevel.push(node.privilege_level);
            discovered_nodes_properties.push(
                properties
                    .iter()
                    .map(|p| match (known.contains(p.as_str()), owned) {
                        (true, _) => PROPERTY_SET,
                        (false, true) => PROPERTY_NOT_SET,
                        (false, false) => PROPERTY_UNKNOWN,
                    })
                    .collect(),
            );
        }

        Observation {
            newly_discovered_nodes_count: d.nodes,
            newly_discovered_profiles_count: d.profile_facts,
            leaked_credentials: d.credentials.clone(),
            lateral_move: d.lateral_move,
            customer_data_found: d.customer_data,
            probe_result: result.probe,
            exploit_result: result.exploit,
            escalation: d.escalation,
            ctf_flag: d.ctf_flag,
            ip_local_disclosed: d.ip_local_disclosed,
            discovered_node_count: discovered.len(),
            discovered_profile_count: self.state.discovered_profiles().len(),
            credential_cache_length: self.state.credential_cache().len(),
            nodes_privilegelevel,
            discovered_nodes_properties,
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn compute_action_mask(&self) -> ActionMask {
        ActionMask::compute(&self.env, &self.state, &self.bounds)
    }

    pub fn is_action_valid(&self, action: &Action) -> bool {
        self.compute_action_mask().is_valid(action)
    }

    /// The profile addressed by a remote-action profile index.
    fn profile_at(&self, index: usize) -> Option<Profile> {
        let slots = self.bounds.profile_slots();
        if index < slots {
            self.state.profile_at(index).cloned()
        } else if self.state.ip_local() && index < self.bounds.maximum_profiles_count {
            self.state
                .profile_at(index - slots)
                .map(|p| p.with_locality(true))
        } else {
            None
        }
    }

    /// Resolve a numeric action to identifiers. `None` when an index does not resolve.
    pub fn describe_action(&self, action: &Action) -> Option<NamedAction> {
        let node = |i: usize| self.state.node_at(i).map(str::to_string);
        match *action {
            Action::Local {
                source,
                vulnerability,
            } => Some(NamedAction::Local {
                node: node(source)?,
                vulnerability: self
                    .env
                    .identifiers()
                    .local_vulnerabilities
                    .get(vulnerability)?
                    .clone(),
            }),
            Action::Remote {
                source,
                target,
                profile,
                variant,
            } => {
                let target = node(target)?;
                Some(NamedAction::Remote {
                    source: node(source)?,
                    profile: self.profile_at(profile)?.to_string(),
                    vulnerability: self.env.remote_variant(&target, variant)?.id.clone(),
                    target,
                })
            }
            Action::Connect {
                source,
                target,
                port,
                credential,
            } => Some(NamedAction::Connect {
                source: node(source)?,
                target: node(target)?,
                port: self.env.identifiers().ports.get(port)?.clone(),
                credential: self.state.credential_at(credential)?.credential.clone(),
            }),
        }
    }

    /// Translate an identifier-addressed action into indices. `None` when a
    /// node, profile or credential is not discovered yet or an id is unknown.
    pub fn encode_action(&self, action: &NamedAction) -> Option<Action> {
        let ids = self.env.identifiers();
        match action {
            NamedAction::Local {
                node,
                vulnerability,
            } => Some(Action::Local {
                source: self.state.position_of(node)?,
                vulnerability: ids
                    .local_vulnerabilities
                    .iter()
                    .position(|v| v == vulnerability)?,
            }),
            NamedAction::Remote {
                source,
                target,
                profile,
                vulnerability,
            } => {
                let profile: Profile = profile.parse().ok()?;
                let index = self
                    .state
                    .discovered_profiles()
                    .iter()
                    .position(|p| p.username == profile.username)?;
                let target_node = self.env.get_node(target).ok()?;
                let variant = target_node
                    .remote_vulnerabilities()
                    .chain(self.env.global_remote_vulnerabilities())
                    .position(|v| &v.id == vulnerability)?;
                Some(Action::Remote {
                    source: self.state.position_of(source)?,
                    target: self.state.position_of(target)?,
                    profile: if profile.is_local() {
                        index + self.bounds.profile_slots()
                    } else {
                        index
                    },
                    variant,
                })
            }
            NamedAction::Connect {
                source,
                target,
                port,
                credential,
            } => Some(Action::Connect {
                source: self.state.position_of(source)?,
                target: self.state.position_of(target)?,
                port: ids.ports.iter().position(|p| p == port)?,
                credential: self
                    .state
                    .credential_cache()
                    .iter()
                    .position(|c| &c.credential == credential)?,
            }),
        }
    }

    pub fn attacker_view(&self) -> AttackerView<'_> {
        AttackerView::new(&self.env, &self.state)
    }

    /// Discovered nodes and the edges between them, hiding detail of unowned nodes.
    pub fn explored_network(&self) -> ExploredNetwork<'_> {
        let view = self.attacker_view();
        let sub = self.env.induced_subgraph(self.state.discovered_nodes());
        ExploredNetwork {
            nodes: sub
                .nodes
                .into_iter()
                .map(|node| {
                    if node.agent_installed {
                        ExploredNode::Owned(node)
                    } else {
                        ExploredNode::Discovered {
                            id: &node.id,
                            privilege_level: node.privilege_level,
                            properties: view.get_discovered_properties(&node.id).unwrap_or_default(),
                        }
                    }
                })
                .collect(),
            edges: sub.edges,
        }
    }

    /// The working environment of this episode.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn template(&self) -> &Arc<Environment> {
        &self.template
    }

    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn bounds(&self) -> &EnvironmentBounds {
        &self.bounds
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, EpisodeStatus::Terminated(_))
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Intrinsic rewards of every step so far, before win/lose overrides.
    pub fn episode_rewards(&self) -> &[f64] {
        &self.rewards
    }

    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }

    pub fn network_availability(&self) -> f64 {
        self.defender_actuator.network_availability()
    }

    pub fn discovered_nodes(&self) -> &[NodeId] {
        self.state.discovered_nodes()
    }

    pub fn discovered_profiles(&self) -> &[Profile] {
        self.state.discovered_profiles()
    }

    pub fn credential_cache(&self) -> &[CachedCredential] {
        self.state.credential_cache()
    }

    /// Mutable access for callers that drive the actuators directly.
    pub fn parts_mut(&mut self) -> (AttackerActuator<'_>, &mut DefenderActuator) {
        (
            AttackerActuator::new(
                &mut self.env,
                &mut self.state,
                &self.config,
                self.step_count,
            ),
            &mut self.defender_actuator,
        )
    }
}

fn check_bounds(env: &Environment, bounds: &EnvironmentBounds) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if env.node_count() > bounds.maximum_node_count {
        errors.push(ValidationError {
            rule: "B-001".to_string(),
            path: "nodes".to_string(),
            message: format!(
                "network has {} nodes, more than maximum_node_count {}",
                env.node_count(),
                bounds.maximum_node_count
            ),
        });
    }
    let library = env
        .vulnerability_library()
        .iter()
        .enumerate()
        .map(|(j, v)| (format!("vulnerability_library[{}]", j), v));
    let per_node = env.nodes().enumerate().flat_map(|(i, n)| {
        n.vulnerabilities
            .iter()
            .enumerate()
            .map(move |(j, v)| (format!("nodes[{}].vulnerabilities[{}]", i, j), v))
    });
    for (path, vulnerability) in library.chain(per_node) {
        for (k, branch) in vulnerability.branches.iter().enumerate() {
            let leaked = branch.outcome.leaked_credential_count();
            if leaked > bounds.maximum_discoverable_credentials_per_action {
                errors.push(ValidationError {
                    rule: "B-002".to_string(),
                    path: format!("{}.branches[{}]", path, k),
                    message: format!(
                        "branch leaks {} credentials, more than maximum_discoverable_credentials_per_action {}",
                        leaked, bounds.maximum_discoverable_credentials_per_action
                    ),
                });
            }
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
