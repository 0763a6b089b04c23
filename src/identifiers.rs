//! Vocabulary collection over a network definition.
//!
//! The collectors here are shared by validation (what does the network
//! reference?) and normalization (infer the vocabularies that were not
//! declared). All collected lists are sorted and deduplicated.

use crate::enums::VulnerabilityType;
use crate::profile::{ProfileField, is_profile_symbol, split_profile_symbol};
use crate::types::*;
use std::collections::BTreeSet;

/// Every vulnerability of the definition paired with the node it sits on
/// (`None` for the global library).
pub fn all_vulnerabilities(def: &NetworkDefinition) -> impl Iterator<Item = (Option<&Node>, &Vulnerability)> {
    def.vulnerability_library
        .iter()
        .map(|v| (None, v))
        .chain(
            def.nodes
                .iter()
                .flat_map(|n| n.vulnerabilities.iter().map(move |v| (Some(n), v))),
        )
}

/// Non-profile symbols referenced by a vulnerability's preconditions.
pub fn precondition_properties(vuln: &Vulnerability) -> BTreeSet<&str> {
    vuln.preconditions()
        .flat_map(|p| p.symbols())
        .filter(|s| !is_profile_symbol(s))
        .collect()
}

/// Properties revealed by `probe_succeeded` effects of a vulnerability.
pub fn probed_properties(vuln: &Vulnerability) -> BTreeSet<&str> {
    vuln.effects()
        .filter_map(|e| match e {
            Effect::ProbeSucceeded {
                discovered_properties,
            } => Some(discovered_properties),
            _ => None,
        })
        .flatten()
        .map(String::as_str)
        .collect()
}

pub fn collect_properties(def: &NetworkDefinition, global_properties: &[PropertyName]) -> Vec<PropertyName> {
    let mut set: BTreeSet<&str> = def
        .nodes
        .iter()
        .flat_map(|n| n.properties.iter().map(String::as_str))
        .collect();
    for (_, v) in all_vulnerabilities(def) {
        set.extend(precondition_properties(v));
        set.extend(probed_properties(v));
    }
    set.extend(global_properties.iter().map(String::as_str));
    set.into_iter().map(str::to_string).collect()
}

/// Ports named by leaked credentials of a vulnerability.
pub fn credential_ports(vuln: &Vulnerability) -> impl Iterator<Item = &str> {
    vuln.effects()
        .filter_map(|e| match e {
            Effect::LeakedCredentials { credentials } => Some(credentials),
            _ => None,
        })
        .flatten()
        .map(|c| c.port.as_str())
}

pub fn collect_ports(def: &NetworkDefinition) -> Vec<PortName> {
    let mut set: BTreeSet<&str> = def
        .nodes
        .iter()
        .flat_map(|n| n.services.iter().map(|s| s.name.as_str()))
        .collect();
    for (_, v) in all_vulnerabilities(def) {
        set.extend(credential_ports(v));
    }
    set.into_iter().map(str::to_string).collect()
}

pub fn collect_vulnerability_ids(def: &NetworkDefinition, vulnerability_type: VulnerabilityType) -> Vec<VulnerabilityId> {
    all_vulnerabilities(def)
        .filter(|(_, v)| v.vulnerability_type == vulnerability_type)
        .map(|(_, v)| v.id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Usernames from `username.X` precondition symbols and leaked profile descriptors.
///
/// Descriptors that do not parse contribute nothing; validation reports them.
pub fn profile_usernames(vuln: &Vulnerability) -> BTreeSet<&str> {
    let mut set = BTreeSet::new();
    for symbol in vuln.preconditions().flat_map(|p| p.symbols()) {
        if let Some((ProfileField::Username, name)) = split_profile_symbol(symbol) {
            set.insert(name);
        }
    }
    for effect in vuln.effects() {
        if let Effect::LeakedProfiles {
            discovered_profiles,
        } = effect
        {
            for token in discovered_profiles.iter().flat_map(|d| d.split('&')) {
                if let Some((ProfileField::Username, name)) = split_profile_symbol(token.trim()) {
                    set.insert(name);
                }
            }
        }
    }
    set
}

pub fn collect_profile_usernames(def: &NetworkDefinition) -> Vec<String> {
    all_vulnerabilities(def)
        .flat_map(|(_, v)| profile_usernames(v))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn collect_detection_point_names(def: &NetworkDefinition) -> Vec<String> {
    all_vulnerabilities(def)
        .flat_map(|(_, v)| v.detection_points())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Infer the complete vocabulary of a definition.
pub fn infer_identifiers(
    def: &NetworkDefinition,
    global_properties: &[PropertyName],
    initial_properties: &[PropertyName],
) -> Identifiers {
    Identifiers {
        properties: collect_properties(def, global_properties),
        ports: collect_ports(def),
        local_vulnerabilities: collect_vulnerability_ids(def, VulnerabilityType::Local),
        remote_vulnerabilities: collect_vulnerability_ids(def, VulnerabilityType::Remote),
        profile_usernames: collect_profile_usernames(def),
        detection_point_names: collect_detection_point_names(def),
        initial_properties: initial_properties.to_vec(),
        global_properties: global_properties.to_vec(),
    }
}

/// Declared identifiers with any empty vocabulary filled in by inference.
pub fn effective_identifiers(def: &NetworkDefinition) -> Identifiers {
    let declared = def.identifiers.clone().unwrap_or_default();
    let inferred = infer_identifiers(def, &declared.global_properties, &declared.initial_properties);
    let pick = |d: Vec<String>, i: Vec<String>| if d.is_empty() { i } else { d };
    Identifiers {
        properties: pick(declared.properties, inferred.properties),
        ports: pick(declared.ports, inferred.ports),
        local_vulnerabilities: pick(declared.local_vulnerabilities, inferred.local_vulnerabilities),
        remote_vulnerabilities: pick(declared.remote_vulnerabilities, inferred.remote_vulnerabilities),
        profile_usernames: pick(declared.profile_usernames, inferred.profile_usernames),
        detection_point_names: pick(declared.detection_point_names, inferred.detection_point_names),
        initial_properties: declared.initial_properties,
        global_properties: declared.global_properties,
    }
}
