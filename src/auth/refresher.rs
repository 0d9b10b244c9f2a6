//! The refresh call itself
//!
//! `POST <api>/auth/refresh` with the refresh credential in a `refresh-token`
//! header and no body. The answer must carry both a new access token and a new
//! refresh token.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use super::credentials::{CredentialPair, TokenResponse};
use crate::client::{OutboundRequest, Transport, TransportError};
use crate::security::SecretToken;

/// Header carrying the refresh credential
pub const REFRESH_TOKEN_HEADER: &str = "refresh-token";

/// Errors from a refresh attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// The backend refused the refresh credential (4xx other than 408/429)
    #[error("Refresh credential rejected (HTTP {status})")]
    Rejected { status: u16 },

    /// The refresh endpoint failed (5xx, 408, 429 or unexpected status)
    #[error("Refresh endpoint failed (HTTP {status})")]
    Server { status: u16 },

    /// No response from the refresh endpoint
    #[error("Refresh request failed: {0}")]
    Transport(#[from] TransportError),

    /// The response did not contain a full credential pair
    #[error("Malformed refresh response: {0}")]
    Malformed(String),

    /// The refresh task failed before producing an answer
    #[error("Internal refresh error: {0}")]
    Internal(String),
}

impl RefreshError {
    /// True when the refresh credential itself was refused
    pub fn is_rejection(&self) -> bool {
        matches!(self, RefreshError::Rejected { .. })
    }
}

/// Exchanges a refresh credential for a new credential pair
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretToken) -> Result<CredentialPair, RefreshError>;
}

/// Calls the backend's refresh endpoint through the raw transport
///
/// The refresh call bypasses the middleware pipeline, so it never carries a
/// stale bearer header and can never recurse into another refresh.
pub struct HttpRefresher {
    transport: Arc<dyn Transport>,
    url: Url,
}

impl HttpRefresher {
    pub fn new(transport: Arc<dyn Transport>, url: Url) -> Self {
        Self { transport, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &SecretToken) -> Result<CredentialPair, RefreshError> {
        let mut value = HeaderValue::from_str(refresh_token.expose())
            .map_err(|_| RefreshError::Malformed("Refresh token is not a valid header value".into()))?;
        value.set_sensitive(true);

        let mut request = OutboundRequest::new(Method::POST, self.url.clone());
        request.headers.insert(REFRESH_TOKEN_HEADER, value);

        let response = self.transport.execute(request).await?;
        let status = response.status;

        // Timeouts and rate limiting say nothing about the credential
        let transient = status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS;
        if status.is_client_error() && !transient {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(RefreshError::Server {
                status: status.as_u16(),
            });
        }

        let tokens: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        Ok(tokens.into())
    }
}
