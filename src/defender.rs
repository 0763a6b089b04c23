//! Defender-side mutations, availability tracking and defender policies.

use crate::enums::{MachineStatus, PrivilegeLevel, RulePermission};
use crate::error::ActionError;
use crate::graph::Environment;
use crate::types::{FirewallRule, Node, NodeId};
use std::collections::BTreeMap;
use tracing::debug;

/// Steps a reimaged node stays offline.
pub const REIMAGING_DURATION: u32 = 15;

/// Defender actions against the working environment of one episode.
///
/// Holds the reimaging progress and the availability computed after the last
/// attacker step. Every mutation takes the environment explicitly so a policy
/// can inspect and act in the same call.
#[derive(Clone, Debug)]
pub struct DefenderActuator {
    reimaging: BTreeMap<NodeId, u32>,
    availability: f64,
    step: u64,
}

impl Default for DefenderActuator {
    fn default() -> Self {
        DefenderActuator {
            reimaging: BTreeMap::new(),
            availability: 1.0,
            step: 0,
        }
    }
}

impl DefenderActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability as of the last [`on_attacker_step_taken`](Self::on_attacker_step_taken).
    pub fn network_availability(&self) -> f64 {
        self.availability
    }

    /// Nodes still being reimaged, with their remaining steps.
    pub fn reimaging_progress(&self) -> &BTreeMap<NodeId, u32> {
        &self.reimaging
    }

    /// Take a node offline for [`REIMAGING_DURATION`] steps, evicting the attacker.
    pub fn reimage_node(&mut self, env: &mut Environment, node_id: &str) -> Result<(), ActionError> {
        let node = env.get_node_mut(node_id)?;
        if !node.reimagable {
            return Err(ActionError::inconsistent(format!(
                "node '{}' is not reimagable",
                node_id
            )));
        }
        evict(node);
        node.status = MachineStatus::Imaging;
        node.last_reimaging = Some(self.step);
        self.reimaging
            .insert(node_id.to_string(), REIMAGING_DURATION);
        debug!(node = node_id, step = self.step, "node reimaging started");
        Ok(())
    }

    /// Remove the attacker from a node without taking it offline.
    pub fn evict_attacker(&mut self, env: &mut Environment, node_id: &str) -> Result<(), ActionError> {
        evict(env.get_node_mut(node_id)?);
        debug!(node = node_id, "attacker evicted");
        Ok(())
    }

    pub fn stop_service(
        &mut self,
        env: &mut Environment,
        node_id: &str,
        port: &str,
    ) -> Result<(), ActionError> {
        set_service_running(env, node_id, port, false)
    }

    pub fn start_service(
        &mut self,
        env: &mut Environment,
        node_id: &str,
        port: &str,
    ) -> Result<(), ActionError> {
        set_service_running(env, node_id, port, true)
    }

    /// Replace the permission of every rule for `port`, appending a rule when none exists.
    pub fn override_firewall_rule(
        &mut self,
        env: &mut Environment,
        node_id: &str,
        port: &str,
        incoming: bool,
        permission: RulePermission,
    ) -> Result<(), ActionError> {
        let node = env.get_node_mut(node_id)?;
        let rules = if incoming {
            &mut node.firewall.incoming
        } else {
            &mut node.firewall.outgoing
        };
        let mut matched = false;
        for rule in rules.iter_mut().filter(|r| r.port == port) {
            rule.permission = permission;
            matched = true;
        }
        if !matched {
            rules.push(FirewallRule {
                port: port.to_string(),
                permission,
                reason: String::new(),
            });
        }
        debug!(node = node_id, port, incoming, ?permission, "firewall rule overridden");
        Ok(())
    }

    pub fn block_traffic(
        &mut self,
        env: &mut Environment,
        node_id: &str,
        port: &str,
        incoming: bool,
    ) -> Result<(), ActionError> {
        self.override_firewall_rule(env, node_id, port, incoming, RulePermission::Block)
    }

    pub fn allow_traffic(
        &mut self,
        env: &mut Environment,
        node_id: &str,
        port: &str,
        incoming: bool,
    ) -> Result<(), ActionError> {
        self.override_firewall_rule(env, node_id, port, incoming, RulePermission::Allow)
    }

    /// Advance reimaging by one step and recompute availability.
    ///
    /// Called once per attacker step, before any defender policy runs.
    pub fn on_attacker_step_taken(&mut self, env: &mut Environment, step: u64) {
        self.step = step;
        let mut finished = Vec::new();
        for (node, remaining) in self.reimaging.iter_mut() {
            if *remaining > 0 {
                *remaining -= 1;
            } else {
                finished.push(node.clone());
            }
        }
        for node in finished {
            self.reimaging.remove(&node);
            if let Ok(info) = env.get_node_mut(&node) {
                info.status = MachineStatus::Running;
                debug!(node = %node, step, "node back online");
            }
        }
        self.availability = network_availability(env);
    }
}

fn evict(node: &mut Node) {
    node.agent_installed = false;
    node.privilege_level = PrivilegeLevel::NoAccess;
}

fn set_service_running(
    env: &mut Environment,
    node_id: &str,
    port: &str,
    running: bool,
) -> Result<(), ActionError> {
    let node = env.get_node_mut(node_id)?;
    if node.status != MachineStatus::Running {
        return Err(ActionError::inconsistent(format!(
            "node '{}' must be running to change its services",
            node_id
        )));
    }
    for service in node.services.iter_mut().filter(|s| s.name == port) {
        service.running = running;
    }
    Ok(())
}

/// SLA-weighted share of the network that is up.
///
/// A running node contributes `(1 + running service weight) / (1 + total
/// service weight)`; a node that is not running contributes nothing.
pub fn network_availability(env: &Environment) -> f64 {
    let mut total = 0.0;
    let mut available = 0.0;
    for node in env.nodes() {
        let (running, all) = node.services.iter().fold((0.0, 0.0), |(r, a), s| {
            (if s.running { r + s.sla_weight } else { r }, a + s.sla_weight)
        });
        if node.status == MachineStatus::Running {
            available += node.sla_weight * (1.0 + running) / (1.0 + all);
        }
        total += node.sla_weight;
    }
    if total > 0.0 { available / total } else { 1.0 }
}

// ─── Policies ───────────────────────────────────────────────────────────────

/// A defender reacting after each attacker step.
pub trait DefenderPolicy {
    fn step(&mut self, env: &mut Environment, actuator: &mut DefenderActuator, step: u64);
}

impl<F> DefenderPolicy for F
where
    F: FnMut(&mut Environment, &mut DefenderActuator, u64),
{
    fn step(&mut self, env: &mut Environment, actuator: &mut DefenderActuator, step: u64) {
        self(env, actuator, step)
    }
}

/// Every `scan_frequency` steps, scan the next `scan_capacity` nodes in
/// round-robin order and reimage those running the attacker's agent.
#[derive(Clone, Debug)]
pub struct ReimageOwnedNodes {
    scan_frequency: u64,
    scan_capacity: usize,
    cursor: usize,
}

impl ReimageOwnedNodes {
    /// A frequency of 0 is treated as 1: scan every step.
    pub fn new(scan_frequency: u64, scan_capacity: usize) -> Self {
        ReimageOwnedNodes {
            scan_frequency: scan_frequency.max(1),
            scan_capacity,
            cursor: 0,
        }
    }

    pub fn scan_frequency(&self) -> u64 {
        self.scan_frequency
    }

    pub fn scan_capacity(&self) -> usize {
        self.scan_capacity
    }
}

impl DefenderPolicy for ReimageOwnedNodes {
    fn step(&mut self, env: &mut Environment, actuator: &mut DefenderActuator, step: u64) {
        let count = env.node_count();
        if count == 0 || step % self.scan_frequency != 0 {
            return;
        }
        let nodes: Vec<&Node> = env.nodes().collect();
        let scanned: Vec<NodeId> = (0..self.scan_capacity.min(count))
            .map(|i| nodes[(self.cursor + i) % count])
            .filter(|n| n.status == MachineStatus::Running && n.agent_installed && n.reimagable)
            .map(|n| n.id.clone())
            .collect();
        self.cursor = (self.cursor + self.scan_capacity) % count;
        for node in scanned {
            if let Err(error) = actuator.reimage_node(env, &node) {
                debug!(%error, "scan could not reimage node");
            }
        }
    }
}
