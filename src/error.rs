use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A structured diagnostic message produced during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Error kind for parse failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    Syntax,
    TypeMismatch,
    UnknownVariant,
    InvalidExpression,
}

/// Produced by `parse` when a network definition cannot be deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "{}:{}: {}", line, col, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ParseError {}

/// Produced by `validate` when a network definition violates a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub rule: String,
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.rule, self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result of validation: errors and warnings.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A boolean precondition expression failed to parse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionError {
    pub message: String,
    /// Byte offset into the expression where parsing stopped.
    pub position: usize,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.position)
    }
}

impl std::error::Error for PreconditionError {}

/// A `&`-joined profile descriptor failed to parse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileParseError {
    pub descriptor: String,
    pub message: String,
}

impl fmt::Display for ProfileParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid profile '{}': {}", self.descriptor, self.message)
    }
}

impl std::error::Error for ProfileParseError {}

/// Error kind for actuator failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    /// The action names a node the attacker cannot address.
    InvalidNodeReference,
    /// The node id does not exist in the environment at all.
    UnknownNode,
    /// No node and no library entry declares the vulnerability id.
    UnknownVulnerability,
    NodeNotOwned,
    /// Episode bookkeeping disagrees with what the actuator was asked to do.
    InconsistentState,
}

/// Produced by the attacker or defender actuators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub(crate) fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        ActionError {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_node(node: &str) -> Self {
        ActionError::new(ActionErrorKind::UnknownNode, format!("unknown node '{}'", node))
    }

    pub(crate) fn inconsistent(message: impl Into<String>) -> Self {
        ActionError::new(ActionErrorKind::InconsistentState, message)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActionError {}

/// Produced by `Episode::step`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    /// The episode already terminated; `reset` must be called first.
    EpisodeTerminated,
    /// Strict mode surfaced an actuator error instead of a penalty reward.
    Action(ActionError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::EpisodeTerminated => {
                write!(f, "episode has terminated, a new episode must be started with reset")
            }
            StepError::Action(e) => write!(f, "invalid action: {}", e),
        }
    }
}

impl std::error::Error for StepError {}

impl From<ActionError> for StepError {
    fn from(e: ActionError) -> Self {
        StepError::Action(e)
    }
}

/// Serialization error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializeError {
    pub message: String,
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SerializeError {}

/// Combined error type for the `load` entry point.
#[derive(Clone, Debug)]
pub enum SimError {
    Parse(ParseError),
    Validation(ValidationError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Parse(e) => write!(f, "Parse error: {}", e),
            SimError::Validation(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for SimError {}
