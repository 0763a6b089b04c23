//! Attacker actuator: the rule engine that turns one attacker action into
//! graph mutations, episode bookkeeping and a reward.
//!
//! An [`AttackerActuator`] borrows the working environment and the episode
//! state for the duration of one step. Preconditions are evaluated through a
//! [`SymbolResolver`] built from what the attacker currently knows; every
//! matching branch of a vulnerability fires and the union of their effects is
//! applied in order.

use crate::config::SimulationConfig;
use crate::enums::*;
use crate::error::{ActionError, ActionErrorKind};
use crate::graph::Environment;
use crate::precondition::{SymbolResolver, Truth};
use crate::profile::{LOCAL_IP, Profile, ProfileField, split_profile_symbol};
use crate::state::EpisodeState;
use crate::types::*;
use std::collections::BTreeSet;
use tracing::debug;

/// What an actuation revealed, for building the observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Discoveries {
    pub nodes: usize,
    pub profile_facts: usize,
    pub properties: usize,
    /// Newly cached credentials with their cache index.
    pub credentials: Vec<(usize, CachedCredential)>,
    pub ip_local_disclosed: bool,
    pub lateral_move: bool,
    pub customer_data: bool,
    pub ctf_flag: bool,
    pub escalation: Option<PrivilegeLevel>,
}

/// Result of one actuation.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionResult {
    pub reward: f64,
    /// Realized effects, `None` when nothing was executed.
    pub outcome: Option<Outcome>,
    pub exploit: ExploitResult,
    pub probe: ProbeResult,
    pub discoveries: Discoveries,
    /// Preconditions of the matched branches, or of all branches on failure.
    pub precondition: String,
    pub profile: String,
    pub reward_string: String,
}

impl ActionResult {
    /// A rejected action: fixed reward, no effects.
    pub fn penalty(reward: f64, reason: impl Into<String>) -> Self {
        ActionResult {
            reward,
            outcome: None,
            exploit: ExploitResult::NotAttempted,
            probe: ProbeResult::None,
            discoveries: Discoveries::default(),
            precondition: String::new(),
            profile: String::new(),
            reward_string: reason.into(),
        }
    }

    fn failed_exploit(reward: f64, reason: impl Into<String>) -> Self {
        ActionResult {
            outcome: Some(Effect::exploit_failed().into()),
            exploit: ExploitResult::Failed,
            ..ActionResult::penalty(reward, reason)
        }
    }
}

// ─── Symbol resolution ──────────────────────────────────────────────────────

/// Attacker knowledge against one target node.
///
/// With a supplied profile, profile symbols resolve against that profile only;
/// without one, against any discovered profile. `ip.local` additionally
/// requires the episode to have disclosed local access.
struct Knowledge<'a> {
    target: &'a Node,
    source: Option<&'a Node>,
    state: &'a EpisodeState,
    profile: Option<&'a Profile>,
}

impl SymbolResolver for Knowledge<'_> {
    fn resolve(&self, symbol: &str) -> Truth {
        if let Some((field, value)) = split_profile_symbol(symbol) {
            return match (self.profile, field) {
                (Some(p), ProfileField::Ip) => {
                    (p.resolve(symbol).is_true() && self.state.ip_local()).into()
                }
                (Some(p), _) => p.resolve(symbol),
                (None, ProfileField::Ip) => (value == LOCAL_IP && self.state.ip_local()).into(),
                (None, _) => self
                    .state
                    .discovered_profiles()
                    .iter()
                    .any(|p| p.resolve(symbol).is_true())
                    .into(),
            };
        }
        (self.target.has_property(symbol)
            || self.source.is_some_and(|s| s.has_property(symbol))
            || self.state.is_property_revealed(&self.target.id, symbol))
        .into()
    }
}

#[derive(Default)]
struct Applied {
    reward: f64,
    discoveries: Discoveries,
    probe: ProbeResult,
    exploit_failed: bool,
}

// ─── Actuator ───────────────────────────────────────────────────────────────

pub struct AttackerActuator<'a> {
    env: &'a mut Environment,
    state: &'a mut EpisodeState,
    config: &'a SimulationConfig,
    step: u64,
}

impl<'a> AttackerActuator<'a> {
    pub fn new(
        env: &'a mut Environment,
        state: &'a mut EpisodeState,
        config: &'a SimulationConfig,
        step: u64,
    ) -> Self {
        AttackerActuator {
            env,
            state,
            config,
            step,
        }
    }

    pub fn view(&self) -> AttackerView<'_> {
        AttackerView::new(self.env, self.state)
    }

    fn invalid(&self, error: ActionError) -> Result<ActionResult, ActionError> {
        if self.config.throws_on_invalid_actions {
            return Err(error);
        }
        debug!(%error, "invalid action penalized");
        Ok(ActionResult::penalty(
            self.config.penalties.invalid_action,
            error.message,
        ))
    }

    fn referenced_node(&self, id: &str) -> Result<&Node, ActionError> {
        self.env
            .get_node(id)
            .map_err(|e| ActionError::new(ActionErrorKind::InvalidNodeReference, e.message))
    }

    fn declared(&self, vulnerability_id: &str) -> Result<(), ActionError> {
        if self.env.declares_vulnerability(vulnerability_id) {
            return Ok(());
        }
        Err(ActionError::new(
            ActionErrorKind::UnknownVulnerability,
            format!("no vulnerability '{}' in this network", vulnerability_id),
        ))
    }

    fn owned_source(&self, id: &str) -> Result<&Node, ActionError> {
        let node = self.referenced_node(id)?;
        if !node.agent_installed {
            return Err(ActionError::new(
                ActionErrorKind::NodeNotOwned,
                format!("node '{}' is not owned by the attacker", id),
            ));
        }
        Ok(node)
    }

    /// Run a local vulnerability on an owned node.
    pub fn exploit_local_vulnerability(
        &mut self,
        node_id: &str,
        vulnerability_id: &str,
    ) -> Result<ActionResult, ActionError> {
        let node = match self.owned_source(node_id) {
            Ok(n) => n,
            Err(e) => return self.invalid(e),
        };
        if let Err(e) = self.declared(vulnerability_id) {
            return self.invalid(e);
        }
        if node.status != MachineStatus::Running {
            return Ok(ActionResult::penalty(
                self.config.penalties.machine_not_running,
                format!("node '{}' is not running", node_id),
            ));
        }
        let is_local = |v: &&Vulnerability| v.vulnerability_type == VulnerabilityType::Local;
        let vulnerability = node
            .vulnerability(vulnerability_id)
            .filter(is_local)
            .or_else(|| self.env.global_vulnerability(vulnerability_id).filter(is_local))
            .cloned();
        let Some(vulnerability) = vulnerability else {
            return Ok(ActionResult::failed_exploit(
                self.config.penalties.local_exploit_failed,
                format!("no local vulnerability '{}' on node '{}'", vulnerability_id, node_id),
            ));
        };

        let matched = self.matching_branches(&vulnerability, node_id, None, None)?;
        let result = self.execute(
            node_id,
            &vulnerability,
            &matched,
            None,
            self.config.penalties.local_exploit_failed,
        )?;
        debug!(node = node_id, vulnerability = vulnerability_id, reward = result.reward, "local exploit");
        Ok(result)
    }

    /// Run a remote vulnerability of `target` from an owned `source` node,
    /// authenticated as `profile`.
    pub fn exploit_remote_vulnerability(
        &mut self,
        source_id: &str,
        target_id: &str,
        profile: &Profile,
        vulnerability_id: &str,
    ) -> Result<ActionResult, ActionError> {
        if let Err(e) = self.owned_source(source_id) {
            return self.invalid(e);
        }
        let target = match self.referenced_node(target_id) {
            Ok(n) => n,
            Err(e) => return self.invalid(e),
        };
        if source_id == target_id {
            return self.invalid(ActionError::new(
                ActionErrorKind::InvalidNodeReference,
                "remote exploit target must differ from its source",
            ));
        }
        if let Err(e) = self.declared(vulnerability_id) {
            return self.invalid(e);
        }
        if target.status != MachineStatus::Running {
            return Ok(ActionResult::penalty(
                self.config.penalties.machine_not_running,
                format!("node '{}' is not running", target_id),
            ));
        }
        let is_remote = |v: &&Vulnerability| v.vulnerability_type == VulnerabilityType::Remote;
        let vulnerability = target
            .vulnerability(vulnerability_id)
            .filter(is_remote)
            .or_else(|| self.env.global_vulnerability(vulnerability_id).filter(is_remote))
            .cloned();
        let Some(vulnerability) = vulnerability else {
            return Ok(ActionResult::failed_exploit(
                self.config.penalties.failed_remote_exploit,
                format!("no remote vulnerability '{}' on node '{}'", vulnerability_id, target_id),
            ));
        };

        let matched =
            self.matching_branches(&vulnerability, target_id, Some(source_id), Some(profile))?;
        let result = self.execute(
            target_id,
            &vulnerability,
            &matched,
            Some(profile),
            self.config.penalties.failed_remote_exploit,
        )?;
        if !matched.is_empty() {
            self.env
                .add_edge(source_id, target_id, EdgeAnnotation::RemoteExploit);
        }
        debug!(
            source = source_id,
            target = target_id,
            profile = %profile,
            vulnerability = vulnerability_id,
            reward = result.reward,
            "remote exploit"
        );
        Ok(result)
    }

    /// Authenticate to `port` on `target` with a cached credential and take it over.
    pub fn connect_to_remote_machine(
        &mut self,
        source_id: &str,
        target_id: &str,
        port: &str,
        credential: &str,
    ) -> Result<ActionResult, ActionError> {
        let penalties = &self.config.penalties;
        let source = match self.owned_source(source_id) {
            Ok(n) => n,
            Err(e) => return self.invalid(e),
        };
        let target = match self.referenced_node(target_id) {
            Ok(n) => n,
            Err(e) => return self.invalid(e),
        };
        if source_id == target_id {
            return self.invalid(ActionError::new(
                ActionErrorKind::InvalidNodeReference,
                "cannot connect a node to itself",
            ));
        }
        if !self.state.has_credential(credential) {
            return Err(ActionError::inconsistent(format!(
                "credential '{}' is not in the credential cache",
                credential
            )));
        }
        if target.status != MachineStatus::Running {
            return Ok(ActionResult::penalty(
                penalties.machine_not_running,
                format!("node '{}' is not running", target_id),
            ));
        }
        let Some(service) = target.service(port).filter(|s| s.running) else {
            return Ok(ActionResult::penalty(
                penalties.scanning_unopen_port,
                format!("port '{}' is not open on node '{}'", port, target_id),
            ));
        };
        if !service.allowed_credentials.iter().any(|c| c == credential) {
            return Ok(ActionResult::penalty(
                penalties.wrong_password,
                format!("credential rejected by '{}' on node '{}'", port, target_id),
            ));
        }
        if !source.firewall.allows_outgoing(port) {
            return Ok(ActionResult::penalty(
                penalties.blocked_by_local_firewall,
                format!("outgoing '{}' blocked on node '{}'", port, source_id),
            ));
        }
        if !target.firewall.allows_incoming(port) {
            return Ok(ActionResult::penalty(
                penalties.blocked_by_remote_firewall,
                format!("incoming '{}' blocked on node '{}'", port, target_id),
            ));
        }
        let reward_string = if target.owned_string.is_empty() {
            format!("lateral move to '{}'", target_id)
        } else {
            target.owned_string.clone()
        };

        self.env
            .add_edge(source_id, target_id, EdgeAnnotation::LateralMove);
        let reward = match self.take_ownership(target_id)? {
            Some(bonus) => bonus,
            None => self.config.penalties.repeat,
        };
        debug!(source = source_id, target = target_id, port, reward, "lateral move");
        Ok(ActionResult {
            reward,
            outcome: Some(Effect::LateralMove { success: true }.into()),
            exploit: ExploitResult::NotAttempted,
            probe: ProbeResult::None,
            discoveries: Discoveries {
                lateral_move: true,
                ..Default::default()
            },
            precondition: String::new(),
            profile: String::new(),
            reward_string,
        })
    }

    fn matching_branches<'v>(
        &self,
        vulnerability: &'v Vulnerability,
        target: &str,
        source: Option<&str>,
        profile: Option<&Profile>,
    ) -> Result<Vec<&'v Branch>, ActionError> {
        let knowledge = Knowledge {
            target: self.env.get_node(target)?,
            source: source.map(|s| self.env.get_node(s)).transpose()?,
            state: &*self.state,
            profile,
        };
        Ok(vulnerability
            .branches
            .iter()
            .filter(|b| b.precondition.evaluate(&knowledge))
            .collect())
    }

    fn execute(
        &mut self,
        target: &str,
        vulnerability: &Vulnerability,
        matched: &[&Branch],
        profile: Option<&Profile>,
        failed_penalty: f64,
    ) -> Result<ActionResult, ActionError> {
        let profile = profile.map(|p| p.to_string()).unwrap_or_default();
        if matched.is_empty() {
            return Ok(ActionResult {
                precondition: join(vulnerability.preconditions().map(|p| p.as_str()), " | "),
                profile,
                ..ActionResult::failed_exploit(failed_penalty, "no matching precondition branch")
            });
        }

        let outcome = Outcome::new(
            matched
                .iter()
                .flat_map(|b| b.outcome.iter().cloned())
                .collect(),
        );
        let applied = self.apply_outcome(target, &outcome)?;
        let mut reward = applied.reward;

        let last_reimaging = self.env.get_node(target)?.last_reimaging;
        let previous = self.state.record_execution(
            target,
            &vulnerability.id,
            vulnerability.vulnerability_type,
            self.step,
        );
        let repeated = previous.is_some_and(|at| last_reimaging.is_none_or(|r| at >= r));
        if repeated {
            reward += self.config.penalties.repeat;
        } else if !applied.exploit_failed && applied.probe != ProbeResult::Failed {
            reward += self.config.rewards.new_successful_attack;
        }
        reward -= vulnerability.cost;

        Ok(ActionResult {
            reward,
            outcome: Some(outcome),
            exploit: if applied.exploit_failed {
                ExploitResult::Failed
            } else {
                ExploitResult::Succeeded
            },
            probe: applied.probe,
            discoveries: applied.discoveries,
            precondition: join(matched.iter().map(|b| b.precondition.as_str()), " | "),
            profile,
            reward_string: join(
                matched
                    .iter()
                    .map(|b| b.reward_string.as_str())
                    .filter(|s| !s.is_empty()),
                "; ",
            ),
        })
    }

    /// Apply effects in order, on behalf of `target`.
    fn apply_outcome(&mut self, target: &str, outcome: &Outcome) -> Result<Applied, ActionError> {
        let config = self.config;
        let mut applied = Applied::default();
        let d = &mut applied.discoveries;

        for effect in outcome {
            match effect {
                Effect::LeakedNodesId { discovered_nodes } => {
                    for node in discovered_nodes {
                        self.leak_node(target, node, d)?;
                    }
                }
                Effect::LeakedCredentials { credentials } => {
                    for credential in credentials {
                        self.leak_node(target, &credential.node, d)?;
                        if let Some(index) = self.state.cache_credential(credential.clone()) {
                            d.credentials.push((index, credential.clone()));
                        }
                    }
                }
                Effect::LeakedProfiles {
                    discovered_profiles,
                } => {
                    for descriptor in discovered_profiles {
                        let profile: Profile = descriptor
                            .parse()
                            .map_err(|e: crate::error::ProfileParseError| {
                                ActionError::inconsistent(e.to_string())
                            })?;
                        if profile.is_local() && self.state.disclose_local_ip() {
                            d.ip_local_disclosed = true;
                        }
                        let profile = if profile.is_local() {
                            profile.with_locality(false)
                        } else {
                            profile
                        };
                        d.profile_facts += self.state.discover_profile(profile);
                    }
                }
                Effect::ProbeSucceeded {
                    discovered_properties,
                } => {
                    d.properties += self.state.discover_properties(
                        target,
                        discovered_properties,
                        &self.env.identifiers().global_properties,
                    );
                    applied.probe = ProbeResult::Succeeded;
                }
                Effect::ProbeFailed => {
                    if applied.probe == ProbeResult::None {
                        applied.probe = ProbeResult::Failed;
                    }
                }
                Effect::ExploitFailed { cost, .. } => {
                    applied.exploit_failed = true;
                    applied.reward -= cost.unwrap_or(0.0);
                }
                Effect::PrivilegeEscalation { level } => {
                    let node = self.env.get_node_mut(target)?;
                    if node.privilege_level < *level {
                        node.privilege_level = *level;
                        node.agent_installed = true;
                        d.escalation = Some(*level);
                    }
                    self.state.discover_node(target);
                }
                Effect::CustomerData { reward, ctf_flag } => {
                    d.customer_data = true;
                    if self.state.gather_customer_data(target) {
                        applied.reward += reward;
                    }
                    if *ctf_flag {
                        self.state.capture_ctf();
                        d.ctf_flag = true;
                    }
                }
                Effect::LateralMove { success } => {
                    if *success {
                        d.lateral_move = true;
                        if let Some(bonus) = self.take_ownership(target)? {
                            applied.reward += bonus;
                        }
                    }
                }
                Effect::DetectionPoint { name } => {
                    self.state.record_detection(name, self.step);
                    debug!(detection_point = %name, step = self.step, "detection point triggered");
                }
            }
        }

        let rewards = &config.rewards;
        applied.reward += d.nodes as f64 * rewards.node_discovered
            + d.credentials.len() as f64 * rewards.credential_discovered
            + d.profile_facts as f64 * rewards.profile_discovered
            + d.properties as f64 * rewards.property_discovered;
        Ok(applied)
    }

    fn leak_node(&mut self, from: &str, node: &str, d: &mut Discoveries) -> Result<(), ActionError> {
        if !self.env.contains_node(node) {
            return Err(ActionError::inconsistent(format!(
                "outcome leaks unknown node '{}'",
                node
            )));
        }
        if self.state.discover_node(node) {
            d.nodes += 1;
        }
        self.env.add_edge(from, node, EdgeAnnotation::Knows);
        Ok(())
    }

    /// Install the attacker on `node`. Returns the lateral-move reward, or
    /// `None` when the node was already owned.
    fn take_ownership(&mut self, node_id: &str) -> Result<Option<f64>, ActionError> {
        let node = self.env.get_node_mut(node_id)?;
        if node.agent_installed {
            return Ok(None);
        }
        node.agent_installed = true;
        node.privilege_level = node.privilege_level.escalate(PrivilegeLevel::LocalUser);
        self.state.discover_node(node_id);
        Ok(Some(self.config.rewards.lateral_move))
    }
}

fn join<'s>(parts: impl Iterator<Item = &'s str>, separator: &str) -> String {
    parts.collect::<Vec<_>>().join(separator)
}

// ─── Read-only queries ──────────────────────────────────────────────────────

/// Attacker-side queries over the working environment and episode state.
#[derive(Clone, Copy)]
pub struct AttackerView<'a> {
    env: &'a Environment,
    state: &'a EpisodeState,
}

impl<'a> AttackerView<'a> {
    pub fn new(env: &'a Environment, state: &'a EpisodeState) -> Self {
        AttackerView { env, state }
    }

    pub fn discovered_nodes(&self) -> &'a [NodeId] {
        self.state.discovered_nodes()
    }

    pub fn get_node_privilegelevel(&self, node: &str) -> Result<PrivilegeLevel, ActionError> {
        Ok(self.env.get_node(node)?.privilege_level)
    }

    /// Properties the attacker knows hold on `node`: all of them once the node
    /// is owned, otherwise only the ones a probe or leak revealed.
    pub fn get_discovered_properties(&self, node: &str) -> Result<BTreeSet<&'a str>, ActionError> {
        let info = self.env.get_node(node)?;
        let mut known: BTreeSet<&'a str> = self
            .state
            .revealed_properties(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if info.agent_installed {
            known.extend(info.properties.iter().map(String::as_str));
        }
        Ok(known)
    }

    /// Discovered nodes at or above `level`, in discovery order.
    pub fn get_nodes_with_atleast_privilegelevel(&self, level: PrivilegeLevel) -> Vec<&'a str> {
        self.state
            .discovered_nodes()
            .iter()
            .filter(|id| {
                self.env
                    .get_node(id)
                    .is_ok_and(|n| n.privilege_level >= level)
            })
            .map(String::as_str)
            .collect()
    }

    /// Discovered nodes with the attacker's agent installed.
    pub fn owned_nodes(&self) -> Vec<&'a str> {
        self.state
            .discovered_nodes()
            .iter()
            .filter(|id| self.env.get_node(id).is_ok_and(|n| n.agent_installed))
            .map(String::as_str)
            .collect()
    }
}
