//! Error taxonomy for API calls

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::{ExpiryReason, StoreError};
use crate::config::ConfigError;

/// Transport-level failure: no HTTP response was received
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading the response
    #[error("Transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Errors returned to callers of the API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The session is over and the user must sign in again
    #[error("Session expired: {0}")]
    SessionExpired(ExpiryReason),

    /// 401 on a request that carried no credential (e.g. a failed login)
    #[error("Unauthorized: {body}")]
    Unauthorized { body: String },

    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// No response was received
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// The refresh call could not complete but the session was kept
    #[error("Credential refresh unavailable: {0}")]
    RefreshUnavailable(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Credentials could not be persisted
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The client could not be built from its configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status when the error came from a response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// Extracts the backend's `{"detail": "..."}` message, if present
    ///
    /// This is the text pages show in their error toasts.
    pub fn detail(&self) -> Option<String> {
        let body = match self {
            ApiError::Unauthorized { body } | ApiError::Status { body, .. } => body,
            _ => return None,
        };

        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        match value.get("detail")? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
