//! Normalization of worker error responses
//!
//! The worker reports failures in several shapes depending on where they
//! originate:
//!
//! - `{"errors": [{"message", "line"?}]}` for mission validation
//! - `{"message": ...}`
//! - `{"detail": "..."}` and `{"detail": {"message", "line"?}}` from explicit rejections
//! - `{"detail": [{"msg", "loc"}]}` from request schema validation
//!
//! Everything else falls back to a message derived from the status code.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// One problem reported by the worker, optionally tied to a mission line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }

    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(message) => Some(Self::new(message.clone())),
            JsonValue::Object(map) => {
                let message = map
                    .get("message")
                    .or_else(|| map.get("msg"))
                    .and_then(JsonValue::as_str)?;
                Some(Self {
                    message: message.to_string(),
                    line: map.get("line").and_then(line_number),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A non-success worker response, normalized for display
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceFailure {
    /// HTTP status code
    pub status: u16,
    /// Human-readable summary
    pub message: String,
    /// Structured problems, in the order the worker reported them
    pub errors: Vec<ValidationIssue>,
    /// Raw response body, when it was JSON
    pub body: Option<JsonValue>,
}

impl ServiceFailure {
    /// Normalize a response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<JsonValue>(body) {
            Ok(json) => Self::from_json(status, json),
            Err(_) => Self {
                status,
                message: status_message(status),
                errors: Vec::new(),
                body: None,
            },
        }
    }

    /// Normalize an already-parsed JSON body
    pub fn from_json(status: u16, body: JsonValue) -> Self {
        let (message, errors) =
            extract(&body).unwrap_or_else(|| (status_message(status), Vec::new()));

        Self {
            status,
            message,
            errors,
            body: Some(body),
        }
    }

    /// A rejection raised before any request was sent
    pub fn rejected_locally(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: 400,
            errors: vec![ValidationIssue::new(message.clone())],
            message,
            body: None,
        }
    }

    /// Message with line-numbered details, one per line
    pub fn render(&self) -> String {
        match self.errors.as_slice() {
            [] => self.message.clone(),
            [only] if only.line.is_none() && only.message == self.message => self.message.clone(),
            issues => issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn extract(body: &JsonValue) -> Option<(String, Vec<ValidationIssue>)> {
    let map = body.as_object()?;

    if let Some(JsonValue::Array(items)) = map.get("errors") {
        let errors: Vec<ValidationIssue> =
            items.iter().filter_map(ValidationIssue::from_json).collect();
        if !errors.is_empty() {
            return Some((summarize(&errors), errors));
        }
    }

    if let Some(message) = map.get("message").and_then(JsonValue::as_str) {
        return Some((message.to_string(), Vec::new()));
    }

    match map.get("detail")? {
        JsonValue::String(detail) => Some((detail.clone(), Vec::new())),
        detail @ JsonValue::Object(_) => {
            let issue = ValidationIssue::from_json(detail)?;
            Some((issue.message.clone(), vec![issue]))
        }
        JsonValue::Array(items) => {
            let errors: Vec<ValidationIssue> = items.iter().filter_map(schema_issue).collect();
            if errors.is_empty() {
                return None;
            }
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            Some((message, errors))
        }
        _ => None,
    }
}

/// `{"msg": "...", "loc": ["body", "cell_size"]}` as produced by request validation
fn schema_issue(item: &JsonValue) -> Option<ValidationIssue> {
    let msg = item.get("msg").and_then(JsonValue::as_str)?;
    let location = item
        .get("loc")
        .and_then(JsonValue::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| match part {
                    JsonValue::String(s) => Some(s.clone()),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(".")
        })
        .filter(|loc| !loc.is_empty());

    Some(match location {
        Some(loc) => ValidationIssue::new(format!("{}: {}", loc, msg)),
        None => ValidationIssue::new(msg),
    })
}

fn summarize(errors: &[ValidationIssue]) -> String {
    match errors {
        [only] => only.to_string(),
        many => format!("Mission validation failed with {} errors", many.len()),
    }
}

fn line_number(value: &JsonValue) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn status_message(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason());
    match reason {
        Some(reason) => format!("Worker request failed with status {} ({})", status, reason),
        None => format!("Worker request failed with status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_errors_list_passes_through() {
        let body = json!({"errors": [{"message": "Unknown token", "line": 3}]});
        let failure = ServiceFailure::from_json(422, body.clone());

        assert_eq!(failure.errors, vec![ValidationIssue::at_line("Unknown token", 3)]);
        assert_eq!(failure.message, "Line 3: Unknown token");
        assert_eq!(failure.body, Some(body));
    }

    #[test]
    fn test_multiple_errors_keep_order() {
        let failure = ServiceFailure::from_response(
            422,
            r#"{"errors":[{"line":2,"message":"DWELL must follow a waypoint"},{"line":7,"message":"Unknown command"}]}"#,
        );

        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.errors[0].line, Some(2));
        assert_eq!(failure.errors[1].message, "Unknown command");
        assert_eq!(
            failure.render(),
            "Line 2: DWELL must follow a waypoint\nLine 7: Unknown command"
        );
    }

    #[test]
    fn test_message_field() {
        let failure = ServiceFailure::from_response(500, r#"{"message":"worker exploded"}"#);
        assert_eq!(failure.message, "worker exploded");
        assert!(failure.errors.is_empty());
    }

    #[test]
    fn test_detail_string() {
        let failure = ServiceFailure::from_response(400, r#"{"detail":"mission_text is required"}"#);
        assert_eq!(failure.message, "mission_text is required");
        assert_eq!(failure.render(), "mission_text is required");
    }

    #[test]
    fn test_detail_object_with_line() {
        let failure = ServiceFailure::from_response(
            400,
            r#"{"detail":{"line":4,"message":"DWELL must follow a waypoint"}}"#,
        );
        assert_eq!(failure.message, "DWELL must follow a waypoint");
        assert_eq!(
            failure.errors,
            vec![ValidationIssue::at_line("DWELL must follow a waypoint", 4)]
        );
        assert_eq!(failure.render(), "Line 4: DWELL must follow a waypoint");
    }

    #[test]
    fn test_detail_object_without_line() {
        let failure = ServiceFailure::from_response(
            400,
            r#"{"detail":{"message":"Mission does not contain any waypoints"}}"#,
        );
        assert_eq!(failure.render(), "Mission does not contain any waypoints");
    }

    #[test]
    fn test_schema_validation_detail() {
        let failure = ServiceFailure::from_response(
            422,
            r#"{"detail":[{"loc":["body","cell_size"],"msg":"field required","type":"value_error.missing"}]}"#,
        );
        assert_eq!(failure.message, "body.cell_size: field required");
        assert_eq!(failure.errors.len(), 1);
    }

    #[test]
    fn test_unrecognized_bodies_use_status() {
        let failure = ServiceFailure::from_response(502, "<html>Bad Gateway</html>");
        assert_eq!(failure.message, "Worker request failed with status 502 (Bad Gateway)");
        assert!(failure.body.is_none());

        let failure = ServiceFailure::from_response(500, r#"{"unexpected": true}"#);
        assert_eq!(
            failure.message,
            "Worker request failed with status 500 (Internal Server Error)"
        );
        assert!(failure.body.is_some());

        let failure = ServiceFailure::from_response(404, "");
        assert!(failure.message.contains("404"));
    }

    #[test]
    fn test_local_rejection() {
        let failure = ServiceFailure::rejected_locally("Cell size must be positive");
        assert_eq!(failure.status, 400);
        assert_eq!(failure.render(), "Cell size must be positive");
    }
}
