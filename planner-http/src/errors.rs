//! Bridge error types

use crate::normalize::ServiceFailure;
use planner_resilience::{Recoverable, Recovery};

/// Error type for calls to the worker
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Connection refused, reset, or otherwise failed below HTTP
    #[error("Worker unreachable: {0}")]
    Connect(String),

    #[error("Worker request timed out: {0}")]
    Timeout(String),

    /// The worker answered with a non-success status
    #[error("Worker returned {}: {}", .0.status, .0.render())]
    Service(ServiceFailure),

    /// A success response whose body is not the expected JSON
    #[error("Malformed worker response: {0}")]
    Decode(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl BridgeError {
    /// The normalized service failure, when the worker answered
    pub fn service_failure(&self) -> Option<&ServiceFailure> {
        match self {
            BridgeError::Service(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(err.to_string())
        } else if err.is_decode() {
            BridgeError::Decode(err.to_string())
        } else if err.is_builder() {
            BridgeError::InvalidEndpoint(err.to_string())
        } else {
            // is_connect, is_request, is_body and anything unclassified
            BridgeError::Connect(err.to_string())
        }
    }
}

impl Recoverable for BridgeError {
    fn recovery(&self) -> Recovery {
        match self {
            BridgeError::Connect(_) | BridgeError::Timeout(_) => Recovery::Transient,
            BridgeError::Service(failure) => Recovery::from_status(failure.status),
            BridgeError::Decode(_) | BridgeError::InvalidEndpoint(_) => Recovery::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classification() {
        assert!(BridgeError::Connect("refused".into()).is_transient());
        assert!(BridgeError::Timeout("slow".into()).is_transient());
        assert!(!BridgeError::Decode("not json".into()).is_transient());
        assert!(!BridgeError::InvalidEndpoint("grid".into()).is_transient());

        let server_error = BridgeError::Service(ServiceFailure::from_response(500, ""));
        assert!(server_error.is_transient());

        let rejected = BridgeError::Service(ServiceFailure::from_response(
            400,
            r#"{"detail":"mission_text is required"}"#,
        ));
        assert_eq!(rejected.recovery(), Recovery::Fatal);
    }

    #[test]
    fn test_display_uses_normalized_message() {
        let err = BridgeError::Service(ServiceFailure::from_response(
            400,
            r#"{"detail":"Cell size must be positive"}"#,
        ));
        assert_eq!(err.to_string(), "Worker returned 400: Cell size must be positive");
        assert!(err.service_failure().is_some());
        assert!(BridgeError::Connect("x".into()).service_failure().is_none());
    }
}
