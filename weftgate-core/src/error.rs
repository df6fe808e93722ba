//! Top-level error types for weftgate.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::refresh::RefreshError;

/// Error returned by [`ApiClient`](crate::ApiClient) calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    ///
    /// `message` is the flattened server message and `body` the normalized
    /// error body.
    #[error(
        "request failed with status {status}: {}",
        .message.as_deref().unwrap_or("no message")
    )]
    Status {
        status: StatusCode,
        message: Option<String>,
        body: Value,
    },

    /// The session could not be recovered after an authorization failure.
    /// Credentials have been cleared.
    #[error("session ended: {0}")]
    Session(#[from] RefreshError),

    /// Network or protocol error from the HTTP client.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The payload did not match the requested type.
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request path could not be joined onto the base address.
    #[error("invalid request path {path}: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Server-provided message, when there is one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// True when the caller must sign in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::Session(_))
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base address is not an absolute http(s) URL.
    #[error("invalid base URL {value:?}: {message}")]
    InvalidBaseUrl { value: String, message: String },

    /// The timeout is not a positive number of seconds.
    #[error("invalid timeout {value:?}: expected a positive number of seconds")]
    InvalidTimeout { value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_display() {
        let err = ApiError::Status {
            status: StatusCode::NOT_FOUND,
            message: Some("Order not found".to_string()),
            body: json!({"message": "Order not found"}),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 404 Not Found: Order not found"
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.message(), Some("Order not found"));
        assert!(!err.is_session_ended());
    }

    #[test]
    fn test_session_error() {
        let err = ApiError::from(RefreshError::MissingRefreshCredential);
        assert!(err.is_session_ended());
        assert!(err.status().is_none());
        assert!(err.to_string().contains("no refresh credential"));

        assert!(ApiError::from(RefreshError::SignedOut).is_session_ended());
    }
}
