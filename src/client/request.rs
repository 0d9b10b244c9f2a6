//! Request description, attempt counter and the transport-level request

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::error::ApiError;
use crate::security::SecretToken;

/// Body of an outbound request
///
/// Bodies are owned and cloneable so a request can be replayed after a
/// credential refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Raw bytes with their content type (e.g. a multipart resume upload)
    Bytes { content_type: String, data: Vec<u8> },
}

/// What a caller wants sent
///
/// A `RequestSpec` is never mutated by the client; retries are tracked with
/// an [`Attempt`] passed alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the API base, e.g. `/companies` or `mock-interviews/7/answer`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Whether the current access credential should be attached
    pub authenticate: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            authenticate: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends an extra header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serializes `body` as the JSON payload
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Sets a raw body with its content type
    pub fn with_bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        };
        self
    }

    /// Sends the request without any credential attached
    pub fn without_auth(mut self) -> Self {
        self.authenticate = false;
        self
    }
}

/// How many times a request has been sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u8);

impl Attempt {
    /// The caller's original send
    pub const FIRST: Attempt = Attempt(0);

    pub fn next(self) -> Self {
        Attempt(self.0.saturating_add(1))
    }

    /// True for any send after a credential refresh
    pub fn is_replay(self) -> bool {
        self.0 > 0
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

/// A fully resolved request as handed to the transport
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Access token attached by the bearer layer, if any
    pub credential: Option<SecretToken>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            credential: None,
        }
    }
}
