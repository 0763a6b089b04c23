//! Network definition validation against rules V-001 through V-013.
//!
//! Returns **all** errors and warnings, not just the first. Validation does not
//! modify the definition. Vocabulary rules check against the declared
//! identifiers, with any undeclared vocabulary inferred from the network itself.

use crate::enums::{PrivilegeLevel, VulnerabilityType};
use crate::error::*;
use crate::identifiers::{
    credential_ports, effective_identifiers, precondition_properties, probed_properties,
};
use crate::profile::{Profile, ProfileField, split_profile_symbol};
use crate::types::*;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

// ─── Cached regexes ─────────────────────────────────────────────────────────

static NODE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+$").unwrap());

/// A property must be writable as a precondition symbol.
static PROPERTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:/-]+$").unwrap());

/// Validate a parsed network definition.
pub fn validate(def: &NetworkDefinition) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let ids = effective_identifiers(def);
    let vulns = vulnerabilities_with_paths(def);

    v001_version(def, &mut errors);
    v002_node_ids(def, &mut errors);
    v003_entry_node(def, &mut errors);
    v004_unique_vulnerability_ids(def, &mut errors);
    v005_ports(def, &vulns, &ids, &mut errors);
    v006_properties(def, &vulns, &ids, &mut errors);
    v007_v008_vulnerability_ids(&vulns, &ids, &mut errors);
    v009_node_references(def, &vulns, &mut errors);
    v010_detection_points(&vulns, &ids, &mut errors);
    v011_profiles(&vulns, &ids, &mut errors);
    v012_numeric_ranges(def, &vulns, &mut errors);
    v013_escalation_levels(&vulns, &mut errors);

    w001_unused_vocabulary(def, &vulns, &ids, &mut warnings);
    w002_empty_branches(&vulns, &mut warnings);

    ValidationResult { errors, warnings }
}

fn error(rule: &str, path: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError {
        rule: rule.to_string(),
        path: path.into(),
        message: message.into(),
    }
}

// ─── Helper: every vulnerability with its definition path ───────────────────

fn vulnerabilities_with_paths(def: &NetworkDefinition) -> Vec<(String, &Vulnerability)> {
    let mut out: Vec<(String, &Vulnerability)> = def
        .vulnerability_library
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("vulnerability_library[{}]", i), v))
        .collect();
    for (i, node) in def.nodes.iter().enumerate() {
        for (j, v) in node.vulnerabilities.iter().enumerate() {
            out.push((format!("nodes[{}].vulnerabilities[{}]", i, j), v));
        }
    }
    out
}

fn branch_path(vuln_path: &str, vuln: &Vulnerability, index: usize) -> String {
    if vuln.branches.len() == 1 {
        vuln_path.to_string()
    } else {
        format!("{}.branches[{}]", vuln_path, index)
    }
}

// ─── V-001: version ─────────────────────────────────────────────────────────

fn v001_version(def: &NetworkDefinition, errors: &mut Vec<ValidationError>) {
    if def.version != SCHEMA_VERSION {
        errors.push(error(
            "V-001",
            "version",
            format!("unsupported version '{}', expected '{}'", def.version, SCHEMA_VERSION),
        ));
    }
}

// ─── V-002: node ids ────────────────────────────────────────────────────────

fn v002_node_ids(def: &NetworkDefinition, errors: &mut Vec<ValidationError>) {
    if def.nodes.is_empty() {
        errors.push(error("V-002", "nodes", "network must contain at least one node"));
        return;
    }
    let mut seen = HashSet::new();
    for (i, node) in def.nodes.iter().enumerate() {
        if !NODE_ID_RE.is_match(&node.id) {
            errors.push(error(
                "V-002",
                format!("nodes[{}].id", i),
                format!("node id '{}' must be non-empty and contain no whitespace", node.id),
            ));
        }
        if !seen.insert(node.id.as_str()) {
            errors.push(error(
                "V-002",
                format!("nodes[{}].id", i),
                format!("duplicate node id '{}'", node.id),
            ));
        }
    }
}

// ─── V-003: entry node ──────────────────────────────────────────────────────

fn v003_entry_node(def: &NetworkDefinition, errors: &mut Vec<ValidationError>) {
    if !def.nodes.is_empty() && !def.nodes.iter().any(|n| n.agent_installed) {
        errors.push(error(
            "V-003",
            "nodes",
            "at least one node must have agent_installed: true",
        ));
    }
}

// ─── V-004: unique vulnerability ids ────────────────────────────────────────

fn v004_unique_vulnerability_ids(def: &NetworkDefinition, errors: &mut Vec<ValidationError>) {
    let mut check = |prefix: String, vulns: &[Vulnerability]| {
        let mut seen = HashSet::new();
        for (j, v) in vulns.iter().enumerate() {
            if !seen.insert(v.id.as_str()) {
                errors.push(error(
                    "V-004",
                    format!("{}[{}].id", prefix, j),
                    format!("duplicate vulnerability id '{}'", v.id),
                ));
            }
        }
    };
    check("vulnerability_library".to_string(), &def.vulnerability_library);
    for (i, node) in def.nodes.iter().enumerate() {
        check(format!("nodes[{}].vulnerabilities", i), &node.vulnerabilities);
    }
}

// ─── V-005: ports ───────────────────────────────────────────────────────────

fn v005_ports(
    def: &NetworkDefinition,
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = ids.ports.iter().map(String::as_str).collect();
    for (i, node) in def.nodes.iter().enumerate() {
        for (j, service) in node.services.iter().enumerate() {
            if !declared.contains(service.name.as_str()) {
                errors.push(error(
                    "V-005",
                    format!("nodes[{}].services[{}].name", i, j),
                    format!("undeclared port '{}'", service.name),
                ));
            }
        }
    }
    for (path, v) in vulns {
        for port in credential_ports(v) {
            if !declared.contains(port) {
                errors.push(error(
                    "V-005",
                    path.clone(),
                    format!("leaked credential references undeclared port '{}'", port),
                ));
            }
        }
    }
}

// ─── V-006: properties ──────────────────────────────────────────────────────

fn v006_properties(
    def: &NetworkDefinition,
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = ids.properties.iter().map(String::as_str).collect();
    let mut check = |path: String, property: &str, what: &str| {
        if !PROPERTY_RE.is_match(property) {
            errors.push(error(
                "V-006",
                path.clone(),
                format!("{} '{}' is not a valid property name", what, property),
            ));
        }
        if !declared.contains(property) {
            errors.push(error(
                "V-006",
                path,
                format!("{} '{}' is not a declared property", what, property),
            ));
        }
    };

    for (i, node) in def.nodes.iter().enumerate() {
        for (j, p) in node.properties.iter().enumerate() {
            check(format!("nodes[{}].properties[{}]", i, j), p.as_str(), "node property");
        }
    }
    for (path, v) in vulns {
        for p in precondition_properties(v) {
            check(path.clone(), p, "precondition symbol");
        }
        for p in probed_properties(v) {
            check(path.clone(), p, "probed property");
        }
    }
    for (i, p) in ids.initial_properties.iter().enumerate() {
        check(format!("identifiers.initial_properties[{}]", i), p.as_str(), "initial property");
    }
}

// ─── V-007 / V-008: vulnerability vocabularies ──────────────────────────────

fn v007_v008_vulnerability_ids(
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    errors: &mut Vec<ValidationError>,
) {
    let local: HashSet<&str> = ids.local_vulnerabilities.iter().map(String::as_str).collect();
    let remote: HashSet<&str> = ids.remote_vulnerabilities.iter().map(String::as_str).collect();
    for (path, v) in vulns {
        let (rule, declared, kind) = match v.vulnerability_type {
            VulnerabilityType::Local => ("V-007", &local, "local"),
            VulnerabilityType::Remote => ("V-008", &remote, "remote"),
        };
        if !declared.contains(v.id.as_str()) {
            errors.push(error(
                rule,
                format!("{}.id", path),
                format!("undeclared {} vulnerability '{}'", kind, v.id),
            ));
        }
    }
}

// ─── V-009: node references ─────────────────────────────────────────────────

fn v009_node_references(
    def: &NetworkDefinition,
    vulns: &[(String, &Vulnerability)],
    errors: &mut Vec<ValidationError>,
) {
    let nodes: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();
    for (path, v) in vulns {
        for effect in v.effects() {
            let referenced: Vec<&str> = match effect {
                Effect::LeakedNodesId { discovered_nodes } => {
                    discovered_nodes.iter().map(String::as_str).collect()
                }
                Effect::LeakedCredentials { credentials } => {
                    credentials.iter().map(|c| c.node.as_str()).collect()
                }
                _ => continue,
            };
            for node in referenced {
                if !nodes.contains(node) {
                    errors.push(error(
                        "V-009",
                        path.clone(),
                        format!("outcome references unknown node '{}'", node),
                    ));
                }
            }
        }
    }
}

// ─── V-010: detection points ────────────────────────────────────────────────

fn v010_detection_points(
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = ids.detection_point_names.iter().map(String::as_str).collect();
    for (path, v) in vulns {
        for name in v.detection_points() {
            if !declared.contains(name) {
                errors.push(error(
                    "V-010",
                    path.clone(),
                    format!("undeclared detection point '{}'", name),
                ));
            }
        }
    }
}

// ─── V-011: profiles ────────────────────────────────────────────────────────

fn v011_profiles(
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    errors: &mut Vec<ValidationError>,
) {
    let declared: HashSet<&str> = ids.profile_usernames.iter().map(String::as_str).collect();
    for (path, v) in vulns {
        for (b, branch) in v.branches.iter().enumerate() {
            let bpath = branch_path(path, v, b);
            for symbol in branch.precondition.symbols() {
                if let Some((ProfileField::Username, name)) = split_profile_symbol(symbol)
                    && !declared.contains(name)
                {
                    errors.push(error(
                        "V-011",
                        format!("{}.precondition", bpath),
                        format!("undeclared profile username '{}'", name),
                    ));
                }
            }
            for effect in branch.outcome.iter() {
                let Effect::LeakedProfiles {
                    discovered_profiles,
                } = effect
                else {
                    continue;
                };
                for descriptor in discovered_profiles {
                    match descriptor.parse::<Profile>() {
                        Err(e) => errors.push(error("V-011", bpath.clone(), e.to_string())),
                        Ok(profile) => {
                            if let Some(name) = &profile.username
                                && !declared.contains(name.as_str())
                            {
                                errors.push(error(
                                    "V-011",
                                    bpath.clone(),
                                    format!("leaked profile has undeclared username '{}'", name),
                                ));
                            }
                        }
                    }
                }
            }
        }
    }
}

// ─── V-012: numeric ranges ──────────────────────────────────────────────────

fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

fn v012_numeric_ranges(
    def: &NetworkDefinition,
    vulns: &[(String, &Vulnerability)],
    errors: &mut Vec<ValidationError>,
) {
    for (path, v) in vulns {
        let rates = [
            ("probing_detection_rate", v.rates.probing_detection_rate),
            ("exploit_detection_rate", v.rates.exploit_detection_rate),
            ("success_rate", v.rates.success_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                errors.push(error(
                    "V-012",
                    format!("{}.rates.{}", path, name),
                    format!("rate must be within [0, 1], got {}", rate),
                ));
            }
        }
        if !non_negative(v.cost) {
            errors.push(error(
                "V-012",
                format!("{}.cost", path),
                format!("cost must be finite and non-negative, got {}", v.cost),
            ));
        }
    }
    for (i, node) in def.nodes.iter().enumerate() {
        if !non_negative(node.sla_weight) {
            errors.push(error(
                "V-012",
                format!("nodes[{}].sla_weight", i),
                "sla_weight must be finite and non-negative",
            ));
        }
        for (j, s) in node.services.iter().enumerate() {
            if !non_negative(s.sla_weight) {
                errors.push(error(
                    "V-012",
                    format!("nodes[{}].services[{}].sla_weight", i, j),
                    "sla_weight must be finite and non-negative",
                ));
            }
        }
    }
}

// ─── V-013: escalation levels ───────────────────────────────────────────────

fn v013_escalation_levels(vulns: &[(String, &Vulnerability)], errors: &mut Vec<ValidationError>) {
    for (path, v) in vulns {
        let escalates_to_nothing = v.effects().any(|e| {
            matches!(
                e,
                Effect::PrivilegeEscalation {
                    level: PrivilegeLevel::NoAccess
                }
            )
        });
        if escalates_to_nothing {
            errors.push(error(
                "V-013",
                path.clone(),
                "privilege_escalation level must be above no_access",
            ));
        }
    }
}

// ─── Warnings ───────────────────────────────────────────────────────────────

fn w001_unused_vocabulary(
    def: &NetworkDefinition,
    vulns: &[(String, &Vulnerability)],
    ids: &Identifiers,
    warnings: &mut Vec<Diagnostic>,
) {
    let mut used_properties: BTreeSet<&str> = def
        .nodes
        .iter()
        .flat_map(|n| n.properties.iter().map(String::as_str))
        .collect();
    let mut used_ports: BTreeSet<&str> = def
        .nodes
        .iter()
        .flat_map(|n| n.services.iter().map(|s| s.name.as_str()))
        .collect();
    for (_, v) in vulns {
        used_properties.extend(precondition_properties(v));
        used_properties.extend(probed_properties(v));
        used_ports.extend(credential_ports(v));
    }
    used_properties.extend(ids.global_properties.iter().map(String::as_str));

    for (i, p) in ids.properties.iter().enumerate() {
        if !used_properties.contains(p.as_str()) {
            warnings.push(Diagnostic {
                severity: DiagnosticSeverity::Warning,
                code: "W-001".to_string(),
                path: Some(format!("identifiers.properties[{}]", i)),
                message: format!("declared property '{}' is never referenced", p),
            });
        }
    }
    for (i, p) in ids.ports.iter().enumerate() {
        if !used_ports.contains(p.as_str()) {
            warnings.push(Diagnostic {
                severity: DiagnosticSeverity::Warning,
                code: "W-001".to_string(),
                path: Some(format!("identifiers.ports[{}]", i)),
                message: format!("declared port '{}' is never referenced", p),
            });
        }
    }
}

fn w002_empty_branches(vulns: &[(String, &Vulnerability)], warnings: &mut Vec<Diagnostic>) {
    for (path, v) in vulns {
        for (b, branch) in v.branches.iter().enumerate() {
            if branch.outcome.is_empty() {
                warnings.push(Diagnostic {
                    severity: DiagnosticSeverity::Warning,
                    code: "W-002".to_string(),
                    path: Some(branch_path(path, v, b)),
                    message: format!("vulnerability '{}' has a branch with no effects", v.id),
                });
            }
        }
    }
}
