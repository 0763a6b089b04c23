//! Action-validity mask over the numeric action space.
//!
//! The mask only says whether an action is addressable from what the attacker
//! currently knows. Preconditions, firewalls and credentials are checked by
//! the actuator.

use crate::config::EnvironmentBounds;
use crate::enums::VulnerabilityType;
use crate::episode::Action;
use crate::graph::Environment;
use crate::state::EpisodeState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionMask {
    nodes: usize,
    local_vulnerabilities: usize,
    profiles: usize,
    variants: usize,
    ports: usize,
    credentials: usize,
    local: Vec<bool>,
    remote: Vec<bool>,
    connect: Vec<bool>,
}

impl ActionMask {
    /// All-false mask shaped by `bounds`.
    pub fn blank(bounds: &EnvironmentBounds) -> Self {
        let nodes = bounds.maximum_node_count;
        let profiles = bounds.maximum_profiles_count;
        let variants = bounds.maximum_vulnerability_variables;
        let ports = bounds.port_count;
        let credentials = bounds.maximum_total_credentials;
        ActionMask {
            nodes,
            local_vulnerabilities: bounds.local_vulnerabilities_count,
            profiles,
            variants,
            ports,
            credentials,
            local: vec![false; nodes * bounds.local_vulnerabilities_count],
            remote: vec![false; nodes * nodes * profiles * variants],
            connect: vec![false; nodes * nodes * ports * credentials],
        }
    }

    pub fn compute(env: &Environment, state: &EpisodeState, bounds: &EnvironmentBounds) -> Self {
        let mut mask = Self::blank(bounds);
        let ids = env.identifiers();
        let global_remote = env.global_remote_vulnerabilities().count();
        let profile_slots = bounds.profile_slots();
        let profile_count = mask.profiles;
        let known_profiles = state.discovered_profiles().len().min(profile_slots);
        let credentials = state.credential_cache().len().min(mask.credentials);
        let discovered = &state.discovered_nodes()[..state.discovered_nodes().len().min(mask.nodes)];

        for (s, source_id) in discovered.iter().enumerate() {
            let Ok(source) = env.get_node(source_id) else {
                continue;
            };
            if !source.agent_installed {
                continue;
            }

            for (v, vuln_id) in ids.local_vulnerabilities.iter().enumerate() {
                let is_local = |t: VulnerabilityType| t == VulnerabilityType::Local;
                let available = source
                    .vulnerability(vuln_id)
                    .is_some_and(|x| is_local(x.vulnerability_type))
                    || env
                        .global_vulnerability(vuln_id)
                        .is_some_and(|x| is_local(x.vulnerability_type));
                if available {
                    let i = mask.local_index(s, v);
                    mask.local[i] = true;
                }
            }

            for (t, target_id) in discovered.iter().enumerate() {
                if t == s {
                    continue;
                }
                let Ok(target) = env.get_node(target_id) else {
                    continue;
                };
                let variants = (target.remote_vulnerabilities().count() + global_remote).min(mask.variants);
                for p in 0..known_profiles {
                    let local_twin = state.ip_local().then_some(p + profile_slots);
                    for profile in std::iter::once(p)
                        .chain(local_twin)
                        .filter(|&x| x < profile_count)
                    {
                        for v in 0..variants {
                            let i = mask.remote_index(s, t, profile, v);
                            mask.remote[i] = true;
                        }
                    }
                }
                for port in 0..mask.ports {
                    for c in 0..credentials {
                        let i = mask.connect_index(s, t, port, c);
                        mask.connect[i] = true;
                    }
                }
            }
        }
        mask
    }

    fn local_index(&self, source: usize, vulnerability: usize) -> usize {
        source * self.local_vulnerabilities + vulnerability
    }

    fn remote_index(&self, source: usize, target: usize, profile: usize, variant: usize) -> usize {
        ((source * self.nodes + target) * self.profiles + profile) * self.variants + variant
    }

    fn connect_index(&self, source: usize, target: usize, port: usize, credential: usize) -> usize {
        ((source * self.nodes + target) * self.ports + port) * self.credentials + credential
    }

    /// Whether `action` is addressable. Out-of-range indices are never valid.
    pub fn is_valid(&self, action: &Action) -> bool {
        match *action {
            Action::Local {
                source,
                vulnerability,
            } => {
                source < self.nodes
                    && vulnerability < self.local_vulnerabilities
                    && self.local[self.local_index(source, vulnerability)]
            }
            Action::Remote {
                source,
                target,
                profile,
                variant,
            } => {
                source < self.nodes
                    && target < self.nodes
                    && profile < self.profiles
                    && variant < self.variants
                    && self.remote[self.remote_index(source, target, profile, variant)]
            }
            Action::Connect {
                source,
                target,
                port,
                credential,
            } => {
                source < self.nodes
                    && target < self.nodes
                    && port < self.ports
                    && credential < self.credentials
                    && self.connect[self.connect_index(source, target, port, credential)]
            }
        }
    }

    /// Every valid action: local first, then remote, then connect, each in index order.
    pub fn valid_actions(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        for source in 0..self.nodes {
            for vulnerability in 0..self.local_vulnerabilities {
                if self.local[self.local_index(source, vulnerability)] {
                    actions.push(Action::Local {
                        source,
                        vulnerability,
                    });
                }
            }
        }
        for source in 0..self.nodes {
            for target in 0..self.nodes {
                for profile in 0..self.profiles {
                    for variant in 0..self.variants {
                        if self.remote[self.remote_index(source, target, profile, variant)] {
                            actions.push(Action::Remote {
                                source,
                                target,
                                profile,
                                variant,
                            });
                        }
                    }
                }
            }
        }
        for source in 0..self.nodes {
            for target in 0..self.nodes {
                for port in 0..self.ports {
                    for credential in 0..self.credentials {
                        if self.connect[self.connect_index(source, target, port, credential)] {
                            actions.push(Action::Connect {
                                source,
                                target,
                                port,
                                credential,
                            });
                        }
                    }
                }
            }
        }
        actions
    }

    pub fn is_empty(&self) -> bool {
        !self.local.iter().chain(&self.remote).chain(&self.connect).any(|&b| b)
    }
}
