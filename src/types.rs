//! Data model of a static network definition.
//!
//! These types are what a network definition deserializes into and what the
//! working [`Environment`](crate::graph::Environment) stores per node. Defaults
//! match the values a network author gets when a field is omitted.

use crate::enums::*;
use crate::precondition::Precondition;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub type NodeId = String;
pub type VulnerabilityId = String;
pub type PropertyName = String;
pub type PortName = String;
pub type CredentialId = String;

/// Definition format version understood by this crate.
pub const SCHEMA_VERSION: &str = "0.1.0";

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_cost() -> f64 {
    1.0
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

// ─── Network definition ─────────────────────────────────────────────────────

/// Root of a network definition file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDefinition {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Identifiers>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_library: Vec<Vulnerability>,
    pub nodes: Vec<Node>,
}

/// Closed vocabularies of a network. Index positions in these lists are the
/// integer encodings used by numeric actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_vulnerabilities: Vec<VulnerabilityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_vulnerabilities: Vec<VulnerabilityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile_usernames: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detection_point_names: Vec<String>,
    /// Properties known to the attacker when an episode starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_properties: Vec<PropertyName>,
    /// Properties that, once revealed anywhere, hold for every node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_properties: Vec<PropertyName>,
}

// ─── Nodes ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListeningService {
    pub name: PortName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_credentials: Vec<CredentialId>,
    #[serde(default = "default_true")]
    pub running: bool,
    #[serde(default = "default_weight")]
    pub sla_weight: f64,
}

impl ListeningService {
    pub fn new(name: impl Into<PortName>, allowed_credentials: &[&str]) -> Self {
        ListeningService {
            name: name.into(),
            allowed_credentials: allowed_credentials.iter().map(|c| c.to_string()).collect(),
            running: true,
            sla_weight: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRule {
    pub port: PortName,
    pub permission: RulePermission,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl FirewallRule {
    pub fn allow(port: impl Into<PortName>) -> Self {
        FirewallRule {
            port: port.into(),
            permission: RulePermission::Allow,
            reason: String::new(),
        }
    }

    pub fn block(port: impl Into<PortName>) -> Self {
        FirewallRule {
            port: port.into(),
            permission: RulePermission::Block,
            reason: String::new(),
        }
    }
}

fn default_rules() -> Vec<FirewallRule> {
    ["RDP", "SSH", "HTTPS", "HTTP"]
        .into_iter()
        .map(FirewallRule::allow)
        .collect()
}

/// Ordered incoming and outgoing rules. The first rule naming a port decides;
/// ports no rule names are blocked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallConfiguration {
    #[serde(default = "default_rules")]
    pub outgoing: Vec<FirewallRule>,
    #[serde(default = "default_rules")]
    pub incoming: Vec<FirewallRule>,
}

impl Default for FirewallConfiguration {
    fn default() -> Self {
        FirewallConfiguration {
            outgoing: default_rules(),
            incoming: default_rules(),
        }
    }
}

fn first_match_allows(rules: &[FirewallRule], port: &str) -> bool {
    rules
        .iter()
        .find(|r| r.port == port)
        .is_some_and(|r| r.permission == RulePermission::Allow)
}

impl FirewallConfiguration {
    pub fn allows_incoming(&self, port: &str) -> bool {
        first_match_allows(&self.incoming, port)
    }

    pub fn allows_outgoing(&self, port: &str) -> bool {
        first_match_allows(&self.outgoing, port)
    }
}

/// A machine in the simulated network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ListeningService>,
    /// Vulnerabilities in declaration order; the order fixes remote variant indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub value: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyName>,
    #[serde(default)]
    pub firewall: FirewallConfiguration,
    #[serde(default)]
    pub agent_installed: bool,
    #[serde(default)]
    pub privilege_level: PrivilegeLevel,
    #[serde(default = "default_true")]
    pub reimagable: bool,
    /// Step at which the node was last reimaged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reimaging: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owned_string: String,
    #[serde(default)]
    pub status: MachineStatus,
    #[serde(default = "default_weight")]
    pub sla_weight: f64,
}

impl Node {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Node {
            id: id.into(),
            services: Vec::new(),
            vulnerabilities: Vec::new(),
            value: 0,
            properties: Vec::new(),
            firewall: FirewallConfiguration::default(),
            agent_installed: false,
            privilege_level: PrivilegeLevel::NoAccess,
            reimagable: true,
            last_reimaging: None,
            owned_string: String::new(),
            status: MachineStatus::Running,
            sla_weight: 1.0,
        }
    }

    pub fn vulnerability(&self, id: &str) -> Option<&Vulnerability> {
        self.vulnerabilities.iter().find(|v| v.id == id)
    }

    pub fn remote_vulnerabilities(&self) -> impl Iterator<Item = &Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| v.vulnerability_type == VulnerabilityType::Remote)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    pub fn service(&self, port: &str) -> Option<&ListeningService> {
        self.services.iter().find(|s| s.name == port)
    }
}

// ─── Vulnerabilities ────────────────────────────────────────────────────────

/// Detection and success probabilities. Carried as metadata only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rates {
    #[serde(default)]
    pub probing_detection_rate: f64,
    #[serde(default)]
    pub exploit_detection_rate: f64,
    #[serde(default = "default_weight")]
    pub success_rate: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Rates {
            probing_detection_rate: 0.0,
            exploit_detection_rate: 0.0,
            success_rate: 1.0,
        }
    }
}

/// A credential leaked for a given node and port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachedCredential {
    pub node: NodeId,
    pub port: PortName,
    pub credential: CredentialId,
}

impl CachedCredential {
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortName>, credential: impl Into<CredentialId>) -> Self {
        CachedCredential {
            node: node.into(),
            port: port.into(),
            credential: credential.into(),
        }
    }
}

/// One effect of a successfully triggered vulnerability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    LeakedNodesId {
        discovered_nodes: Vec<NodeId>,
    },
    LeakedCredentials {
        credentials: Vec<CachedCredential>,
    },
    /// Profile descriptors in `&`-joined form.
    LeakedProfiles {
        discovered_profiles: Vec<String>,
    },
    ProbeSucceeded {
        discovered_properties: Vec<PropertyName>,
    },
    ProbeFailed,
    ExploitFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
        #[serde(default)]
        deception: bool,
    },
    PrivilegeEscalation {
        level: PrivilegeLevel,
    },
    CustomerData {
        #[serde(default)]
        reward: f64,
        #[serde(default)]
        ctf_flag: bool,
    },
    LateralMove {
        #[serde(default = "default_true")]
        success: bool,
    },
    DetectionPoint {
        name: String,
    },
}

impl Effect {
    pub fn admin_escalation() -> Self {
        Effect::PrivilegeEscalation {
            level: PrivilegeLevel::Admin,
        }
    }

    pub fn system_escalation() -> Self {
        Effect::PrivilegeEscalation {
            level: PrivilegeLevel::System,
        }
    }

    pub fn exploit_failed() -> Self {
        Effect::ExploitFailed {
            cost: None,
            deception: false,
        }
    }
}

/// The combined effects of one precondition branch. Effects apply together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    pub effects: Vec<Effect>,
}

impl Outcome {
    pub fn new(effects: Vec<Effect>) -> Self {
        Outcome { effects }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Effect> {
        self.effects.iter()
    }

    pub fn detection_points(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().filter_map(|e| match e {
            Effect::DetectionPoint { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn leaked_credential_count(&self) -> usize {
        self.effects
            .iter()
            .map(|e| match e {
                Effect::LeakedCredentials { credentials } => credentials.len(),
                _ => 0,
            })
            .sum()
    }
}

impl From<Effect> for Outcome {
    fn from(effect: Effect) -> Self {
        Outcome::new(vec![effect])
    }
}

impl<'a> IntoIterator for &'a Outcome {
    type Item = &'a Effect;
    type IntoIter = std::slice::Iter<'a, Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.effects.iter()
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.effects.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Outcome {
    /// Accepts `null`, a single effect mapping, or a list of effect mappings.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let effects = match value {
            Value::Null => Vec::new(),
            Value::Array(_) => serde_json::from_value(value).map_err(serde::de::Error::custom)?,
            Value::Object(_) => {
                vec![serde_json::from_value(value).map_err(serde::de::Error::custom)?]
            }
            other => {
                return Err(serde::de::Error::custom(format!(
                    "outcome must be an effect mapping or a list of effects, got {}",
                    other
                )));
            }
        };
        Ok(Outcome { effects })
    }
}

/// One precondition paired with the outcome it unlocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Branch {
    #[serde(default)]
    pub precondition: Precondition,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reward_string: String,
}

impl Branch {
    pub fn new(precondition: Precondition, outcome: impl Into<Outcome>) -> Self {
        Branch {
            precondition,
            outcome: outcome.into(),
            reward_string: String::new(),
        }
    }
}

/// A named exploitable condition. Every matching branch fires when exploited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VulnerabilityForm")]
pub struct Vulnerability {
    pub id: VulnerabilityId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type")]
    pub vulnerability_type: VulnerabilityType,
    pub branches: Vec<Branch>,
    pub rates: Rates,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub cost: f64,
}

impl Vulnerability {
    /// Single-branch vulnerability with default rates and unit cost.
    pub fn new(
        id: impl Into<VulnerabilityId>,
        vulnerability_type: VulnerabilityType,
        precondition: Precondition,
        outcome: impl Into<Outcome>,
    ) -> Self {
        Vulnerability {
            id: id.into(),
            description: String::new(),
            vulnerability_type,
            branches: vec![Branch::new(precondition, outcome)],
            rates: Rates::default(),
            url: String::new(),
            cost: 1.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn detection_points(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().flat_map(|b| b.outcome.detection_points())
    }

    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.branches.iter().flat_map(|b| b.outcome.iter())
    }

    pub fn preconditions(&self) -> impl Iterator<Item = &Precondition> {
        self.branches.iter().map(|b| &b.precondition)
    }
}

/// Wire form of a vulnerability: either single-branch shorthand or `branches`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VulnerabilityForm {
    id: VulnerabilityId,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    vulnerability_type: VulnerabilityType,
    precondition: Option<Precondition>,
    outcome: Option<Outcome>,
    reward_string: Option<String>,
    branches: Option<Vec<Branch>>,
    #[serde(default)]
    rates: Rates,
    #[serde(default)]
    url: String,
    #[serde(default = "default_cost")]
    cost: f64,
}

impl TryFrom<VulnerabilityForm> for Vulnerability {
    type Error = String;

    fn try_from(form: VulnerabilityForm) -> Result<Self, Self::Error> {
        let shorthand =
            form.precondition.is_some() || form.outcome.is_some() || form.reward_string.is_some();
        let branches = match form.branches {
            Some(_) if shorthand => {
                return Err(format!(
                    "vulnerability '{}' mixes 'branches' with top-level precondition/outcome/reward_string",
                    form.id
                ));
            }
            Some(branches) => branches,
            None => vec![Branch {
                precondition: form.precondition.unwrap_or_default(),
                outcome: form.outcome.unwrap_or_default(),
                reward_string: form.reward_string.unwrap_or_default(),
            }],
        };
        Ok(Vulnerability {
            id: form.id,
            description: form.description,
            vulnerability_type: form.vulnerability_type,
            branches,
            rates: form.rates,
            url: form.url,
            cost: form.cost,
        })
    }
}
