//! Closed enumerations used throughout the simulation model.
//!
//! All of these serialize in `snake_case`. [`PrivilegeLevel`] is the only one
//! with a meaningful order: privilege is compared and escalated with `max`.

use serde::{Deserialize, Serialize};

/// Attacker privilege on a node, ordered from no access to full system control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    #[default]
    NoAccess,
    LocalUser,
    Admin,
    System,
}

impl PrivilegeLevel {
    pub const ALL: [PrivilegeLevel; 4] = [
        PrivilegeLevel::NoAccess,
        PrivilegeLevel::LocalUser,
        PrivilegeLevel::Admin,
        PrivilegeLevel::System,
    ];

    /// Escalate to `target` without ever lowering the current level.
    pub fn escalate(self, target: PrivilegeLevel) -> PrivilegeLevel {
        self.max(target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrivilegeLevel::NoAccess => "no_access",
            PrivilegeLevel::LocalUser => "local_user",
            PrivilegeLevel::Admin => "admin",
            PrivilegeLevel::System => "system",
        }
    }
}

/// Whether a vulnerability is exploited from the node itself or against it from another node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityType {
    Local,
    Remote,
}

/// Firewall rule verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePermission {
    Allow,
    Block,
}

/// Machine running status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Stopped,
    #[default]
    Running,
    Imaging,
}

/// Kind of interaction recorded on a directed edge. Higher variants supersede lower ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeAnnotation {
    Knows,
    RemoteExploit,
    LateralMove,
}

/// Result of a probing step as reported in the observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    #[default]
    None,
    Failed,
    Succeeded,
}

/// Result of an exploit attempt as reported in the observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploitResult {
    #[default]
    NotAttempted,
    Succeeded,
    Failed,
}

/// Why an episode ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    AttackerGoalReached,
    DefenderGoalReached,
    DefenderConstraintBroken,
}
