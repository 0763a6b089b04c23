//! Per-episode discovery bookkeeping.
//!
//! Discovered nodes, profiles and credentials are append-only lists. A
//! position in one of them is the external index an agent uses to address the
//! entry, so positions never change for the lifetime of an episode.

use crate::enums::VulnerabilityType;
use crate::graph::Environment;
use crate::profile::Profile;
use crate::types::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Trigger history of one detection point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeceptionTracker {
    pub detection_point_name: String,
    /// Step numbers at which the detection point fired, in order.
    pub trigger_times: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct EpisodeState {
    discovered_nodes: Vec<NodeId>,
    node_positions: HashMap<NodeId, usize>,
    discovered_profiles: Vec<Profile>,
    credential_cache: Vec<CachedCredential>,
    deception: BTreeMap<String, DeceptionTracker>,
    discovered_properties: HashMap<NodeId, BTreeSet<PropertyName>>,
    global_properties: BTreeSet<PropertyName>,
    executed: HashMap<(NodeId, VulnerabilityId, VulnerabilityType), u64>,
    customer_data: HashSet<NodeId>,
    ip_local: bool,
    ctf_captured: bool,
}

impl EpisodeState {
    /// Fresh state: entry nodes discovered, only the anonymous profile known,
    /// every declared detection point tracked with no triggers.
    pub fn new(env: &Environment) -> Self {
        let ids = env.identifiers();
        let mut state = EpisodeState {
            discovered_nodes: Vec::new(),
            node_positions: HashMap::new(),
            discovered_profiles: vec![Profile::anonymous()],
            credential_cache: Vec::new(),
            deception: ids
                .detection_point_names
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        DeceptionTracker {
                            detection_point_name: name.clone(),
                            trigger_times: Vec::new(),
                        },
                    )
                })
                .collect(),
            discovered_properties: HashMap::new(),
            global_properties: BTreeSet::new(),
            executed: HashMap::new(),
            customer_data: HashSet::new(),
            ip_local: false,
            ctf_captured: false,
        };

        for node in env.nodes() {
            if node.agent_installed {
                state.discover_node(&node.id);
            }
            let initial: Vec<PropertyName> = node
                .properties
                .iter()
                .filter(|p| ids.initial_properties.contains(p))
                .cloned()
                .collect();
            if !initial.is_empty() {
                state.discover_properties(&node.id, &initial, &ids.global_properties);
            }
        }
        state
    }

    // ─── Nodes ──────────────────────────────────────────────────────────────

    pub fn discovered_nodes(&self) -> &[NodeId] {
        &self.discovered_nodes
    }

    pub fn node_at(&self, index: usize) -> Option<&str> {
        self.discovered_nodes.get(index).map(String::as_str)
    }

    pub fn position_of(&self, node: &str) -> Option<usize> {
        self.node_positions.get(node).copied()
    }

    pub fn is_discovered(&self, node: &str) -> bool {
        self.node_positions.contains_key(node)
    }

    /// Returns `true` when the node was not known before.
    pub fn discover_node(&mut self, node: &str) -> bool {
        if self.node_positions.contains_key(node) {
            return false;
        }
        self.node_positions
            .insert(node.to_string(), self.discovered_nodes.len());
        self.discovered_nodes.push(node.to_string());
        true
    }

    // ─── Profiles ───────────────────────────────────────────────────────────

    pub fn discovered_profiles(&self) -> &[Profile] {
        &self.discovered_profiles
    }

    pub fn profile_at(&self, index: usize) -> Option<&Profile> {
        self.discovered_profiles.get(index)
    }

    /// Record a leaked profile, merging into the known profile with the same
    /// username. Returns the number of new facts.
    ///
    /// Profiles without a username cannot be addressed and are not stored.
    pub fn discover_profile(&mut self, profile: Profile) -> usize {
        let Some(username) = profile.username.as_deref() else {
            return 0;
        };
        let known = self
            .discovered_profiles
            .iter()
            .position(|p| p.username.as_deref() == Some(username));
        match known {
            Some(i) => self.discovered_profiles[i].merge(&profile),
            None => {
                let facts = profile.fact_count();
                self.discovered_profiles.push(profile);
                facts
            }
        }
    }

    pub fn ip_local(&self) -> bool {
        self.ip_local
    }

    /// Set the one-way `ip.local` flag. Returns `true` on first disclosure.
    pub fn disclose_local_ip(&mut self) -> bool {
        !std::mem::replace(&mut self.ip_local, true)
    }

    // ─── Credentials ────────────────────────────────────────────────────────

    pub fn credential_cache(&self) -> &[CachedCredential] {
        &self.credential_cache
    }

    pub fn credential_at(&self, index: usize) -> Option<&CachedCredential> {
        self.credential_cache.get(index)
    }

    pub fn has_credential(&self, credential: &str) -> bool {
        self.credential_cache.iter().any(|c| c.credential == credential)
    }

    /// Append a credential unless already cached. Returns its new cache index.
    pub fn cache_credential(&mut self, credential: CachedCredential) -> Option<usize> {
        if self.credential_cache.contains(&credential) {
            return None;
        }
        self.credential_cache.push(credential);
        Some(self.credential_cache.len() - 1)
    }

    // ─── Detection points ───────────────────────────────────────────────────

    pub fn deception_tracker(&self) -> &BTreeMap<String, DeceptionTracker> {
        &self.deception
    }

    pub fn record_detection(&mut self, name: &str, step: u64) {
        self.deception
            .entry(name.to_string())
            .or_insert_with(|| DeceptionTracker {
                detection_point_name: name.to_string(),
                trigger_times: Vec::new(),
            })
            .trigger_times
            .push(step);
    }

    // ─── Properties ─────────────────────────────────────────────────────────

    /// Properties explicitly revealed on `node` (not counting ownership).
    pub fn revealed_properties(&self, node: &str) -> Option<&BTreeSet<PropertyName>> {
        self.discovered_properties.get(node)
    }

    pub fn is_property_revealed(&self, node: &str, property: &str) -> bool {
        self.discovered_properties
            .get(node)
            .is_some_and(|set| set.contains(property))
            || self.global_properties.contains(property)
    }

    /// Mark properties revealed on `node`; global ones become known everywhere.
    /// Returns how many were new for this node.
    pub fn discover_properties(
        &mut self,
        node: &str,
        properties: &[PropertyName],
        global_properties: &[PropertyName],
    ) -> usize {
        let known = self.discovered_properties.entry(node.to_string()).or_default();
        let mut added = 0;
        for p in properties {
            if known.insert(p.clone()) {
                added += 1;
            }
            if global_properties.contains(p) {
                self.global_properties.insert(p.clone());
            }
        }
        added
    }

    // ─── Exploit bookkeeping ────────────────────────────────────────────────

    /// Remember that a vulnerability ran on a node. Returns the previous step it ran at.
    pub(crate) fn record_execution(
        &mut self,
        node: &str,
        vulnerability: &str,
        vulnerability_type: VulnerabilityType,
        step: u64,
    ) -> Option<u64> {
        self.executed.insert(
            (node.to_string(), vulnerability.to_string(), vulnerability_type),
            step,
        )
    }

    /// Returns `true` the first time customer data is taken from `node`.
    pub(crate) fn gather_customer_data(&mut self, node: &str) -> bool {
        self.customer_data.insert(node.to_string())
    }

    pub fn ctf_captured(&self) -> bool {
        self.ctf_captured
    }

    pub(crate) fn capture_ctf(&mut self) {
        self.ctf_captured = true;
    }
}
