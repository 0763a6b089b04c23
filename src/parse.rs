use crate::error::{ParseError, ParseErrorKind};
use crate::types::NetworkDefinition;

/// Parse a YAML string into an unvalidated [`NetworkDefinition`].
///
/// Performs YAML deserialization and type mapping only. Precondition
/// expressions are parsed here, so a malformed expression is a parse error.
/// Does NOT check vocabularies or apply normalization.
pub fn parse(input: &str) -> Result<NetworkDefinition, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError {
            kind: ParseErrorKind::Syntax,
            message: "empty input".to_string(),
            path: None,
            line: None,
            column: None,
        });
    }

    check_multi_document(input)?;

    // YAML → serde_json::Value → NetworkDefinition keeps mapping order stable
    let value: serde_json::Value = serde_saphyr::from_str(input).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_saphyr_error(&msg),
            message: msg,
            path: None,
            line: None,
            column: None,
        }
    })?;

    let Some(root) = value.as_object() else {
        return Err(ParseError {
            kind: ParseErrorKind::TypeMismatch,
            message: "network definition root must be a YAML mapping".to_string(),
            path: None,
            line: None,
            column: None,
        });
    };

    for key in root.keys() {
        match key.as_str() {
            "version" | "identifiers" | "vulnerability_library" | "nodes" => {}
            other => {
                return Err(ParseError {
                    kind: ParseErrorKind::TypeMismatch,
                    message: format!("unknown top-level field: {}", other),
                    path: Some(other.to_string()),
                    line: None,
                    column: None,
                });
            }
        }
    }

    serde_json::from_value(value).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_json_error(&msg),
            message: msg,
            path: None,
            line: None,
            column: None,
        }
    })
}

/// Check for multiple YAML documents (--- separator).
/// Only matches `---` at column 0 to avoid false positives inside block scalars.
fn check_multi_document(input: &str) -> Result<(), ParseError> {
    let mut doc_count = 0;
    for (line_num, line) in input.lines().enumerate() {
        if line.starts_with("---") && line[3..].trim().is_empty() {
            doc_count += 1;
            if doc_count > 1 {
                return Err(ParseError {
                    kind: ParseErrorKind::Syntax,
                    message: "multi-document YAML is not supported".to_string(),
                    path: None,
                    line: Some(line_num + 1),
                    column: Some(1),
                });
            }
        }
    }
    Ok(())
}

fn classify_saphyr_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("unknown") || lower.contains("variant") {
        ParseErrorKind::UnknownVariant
    } else if lower.contains("type") || lower.contains("invalid") || lower.contains("expected") {
        ParseErrorKind::TypeMismatch
    } else {
        ParseErrorKind::Syntax
    }
}

fn classify_json_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("at offset") {
        // precondition expression errors render their byte offset
        ParseErrorKind::InvalidExpression
    } else if lower.contains("unknown variant") || lower.contains("unknown field") {
        ParseErrorKind::UnknownVariant
    } else {
        ParseErrorKind::TypeMismatch
    }
}
