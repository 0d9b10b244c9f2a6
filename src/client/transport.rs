//! HTTP transport seam
//!
//! The dispatcher and the refresher only talk to the network through
//! [`Transport`]; tests substitute scripted implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::error::TransportError;
use super::request::{OutboundRequest, RequestBody};
use super::response::ApiResponse;

/// Sends a resolved request and reports either a response or a network failure
///
/// Every HTTP status, including 4xx and 5xx, is a response; only failures to
/// obtain one are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport with a cookie jar for the backend session
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<ApiResponse, TransportError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes { content_type, data } => {
                builder.header(CONTENT_TYPE, content_type).body(data)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
