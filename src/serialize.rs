//! [`NetworkDefinition`] → YAML serialization.

use crate::error::SerializeError;
use crate::types::NetworkDefinition;

/// Serialize a network definition to a YAML string.
///
/// Vulnerabilities are always written in their `branches` form, so the output
/// parses back to an equal definition. Normalize first to also write out the
/// inferred identifiers.
pub fn serialize(def: &NetworkDefinition) -> Result<String, SerializeError> {
    let value = serde_json::to_value(def).map_err(|e| SerializeError {
        message: format!("failed to convert network definition to JSON value: {}", e),
    })?;

    serde_saphyr::to_string(&value).map_err(|e| SerializeError {
        message: format!("failed to serialize to YAML: {}", e),
    })
}
