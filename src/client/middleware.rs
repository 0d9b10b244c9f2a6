//! Request and response middleware
//!
//! The dispatcher runs an ordered list of [`RequestLayer`]s on every outbound
//! request and an ordered list of [`ResponseLayer`]s on every response.
//! Credential refresh is one response layer among others.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use super::dispatcher::Dispatcher;
use super::error::ApiError;
use super::request::{Attempt, OutboundRequest, RequestSpec};
use super::response::ApiResponse;
use crate::auth::CredentialStore;
use crate::security::SecretToken;

/// Transforms a request before it is transmitted
pub trait RequestLayer: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: &mut OutboundRequest, spec: &RequestSpec) -> Result<(), ApiError>;
}

/// Everything a response layer may need to know about the exchange
pub struct Exchange<'a> {
    pub spec: &'a RequestSpec,
    pub origin_id: u64,
    pub attempt: Attempt,
    /// Access token the request was sent with
    pub sent_credential: Option<&'a SecretToken>,
    /// Handle for scheduling replays of this request
    pub dispatcher: &'a Dispatcher,
}

/// Result of a response layer
#[derive(Debug)]
pub enum Flow {
    /// Hand the response to the next layer
    Continue(ApiResponse),
    /// Stop the pipeline and resolve the caller with this outcome
    Settled(Result<ApiResponse, ApiError>),
}

/// Inspects a response and either passes it on or settles the call
#[async_trait]
pub trait ResponseLayer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_response(&self, exchange: Exchange<'_>, response: ApiResponse) -> Flow;
}

/// Attaches `Authorization: Bearer <access>` from the credential store
pub struct BearerAuth {
    store: Arc<CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestLayer for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn apply(&self, request: &mut OutboundRequest, spec: &RequestSpec) -> Result<(), ApiError> {
        if !spec.authenticate {
            return Ok(());
        }

        // Read at send time so replays pick up the refreshed token
        if let Some(token) = self.store.access_token() {
            let mut value = HeaderValue::from_str(&token.bearer()).map_err(|_| {
                ApiError::InvalidRequest("Access token is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
            request.credential = Some(token);
        }

        Ok(())
    }
}

/// Adds a fixed set of headers unless the request already sets them
pub struct DefaultHeaders {
    headers: HeaderMap,
}

impl DefaultHeaders {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// `Accept: application/json`, which every backend endpoint speaks
    pub fn json() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        Self { headers }
    }
}

impl RequestLayer for DefaultHeaders {
    fn name(&self) -> &'static str {
        "default-headers"
    }

    fn apply(&self, request: &mut OutboundRequest, _spec: &RequestSpec) -> Result<(), ApiError> {
        for (name, value) in &self.headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

/// Parses a caller-supplied header pair
pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ApiError::InvalidRequest(format!("Invalid header name: {}", name)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ApiError::InvalidRequest(format!("Invalid value for header {}", name)))?;
    Ok((name, value))
}
