//! Request dispatcher
//!
//! Resolves a [`RequestSpec`] against the API base, runs the request layers,
//! transmits, then runs the response layers. Anything the layers leave
//! unsettled is classified here: 2xx is success, every other status becomes an
//! [`ApiError`] carrying the original body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use url::Url;

use super::error::ApiError;
use super::middleware::{parse_header, Exchange, Flow, RequestLayer, ResponseLayer};
use super::request::{Attempt, OutboundRequest, RequestSpec};
use super::response::ApiResponse;
use super::transport::Transport;
use crate::security::Sanitizer;

struct DispatcherInner {
    api_base: Url,
    transport: Arc<dyn Transport>,
    request_layers: Vec<Arc<dyn RequestLayer>>,
    response_layers: Vec<Arc<dyn ResponseLayer>>,
    next_origin: AtomicU64,
}

/// Cheap-to-clone handle to the request pipeline
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(
        api_base: Url,
        transport: Arc<dyn Transport>,
        request_layers: Vec<Arc<dyn RequestLayer>>,
        response_layers: Vec<Arc<dyn ResponseLayer>>,
    ) -> Self {
        let mut api_base = api_base;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Self {
            inner: Arc::new(DispatcherInner {
                api_base,
                transport,
                request_layers,
                response_layers,
                next_origin: AtomicU64::new(1),
            }),
        }
    }

    /// Base URL every request path is resolved against (always ends in `/`)
    pub fn api_base(&self) -> &Url {
        &self.inner.api_base
    }

    /// Sends a request on behalf of a caller
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        let origin_id = self.inner.next_origin.fetch_add(1, Ordering::Relaxed);
        self.execute(&spec, origin_id, Attempt::FIRST).await
    }

    /// Builds a deferred re-send of `spec`
    ///
    /// Nothing is transmitted until the returned future is polled; the bearer
    /// layer reads the credential store at that point.
    pub fn replay(
        &self,
        spec: RequestSpec,
        origin_id: u64,
        attempt: Attempt,
    ) -> BoxFuture<'static, Result<ApiResponse, ApiError>> {
        let this = self.clone();
        Box::pin(async move { this.execute(&spec, origin_id, attempt).await })
    }

    async fn execute(
        &self,
        spec: &RequestSpec,
        origin_id: u64,
        attempt: Attempt,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self.resolve(spec)?;
        for layer in &self.inner.request_layers {
            layer.apply(&mut request, spec)?;
        }

        let sent_credential = request.credential.clone();
        tracing::debug!(
            origin_id,
            attempt = attempt.number(),
            method = %spec.method,
            url = Sanitizer::sanitize_url(request.url.as_str()),
            authenticated = sent_credential.is_some(),
            "Sending request"
        );

        let mut response = match self.inner.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(origin_id, "Request failed without a response: {}", e);
                return Err(ApiError::Network(e));
            }
        };
        tracing::debug!(origin_id, status = %response.status, "Response received");

        for layer in &self.inner.response_layers {
            let exchange = Exchange {
                spec,
                origin_id,
                attempt,
                sent_credential: sent_credential.as_ref(),
                dispatcher: self,
            };
            match layer.on_response(exchange, response).await {
                Flow::Continue(next) => response = next,
                Flow::Settled(outcome) => {
                    tracing::trace!(origin_id, layer = layer.name(), "Response settled by layer");
                    return outcome;
                }
            }
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(response.into_error())
        }
    }

    fn resolve(&self, spec: &RequestSpec) -> Result<OutboundRequest, ApiError> {
        let path = spec.path.trim_start_matches('/');
        let mut url = self
            .inner
            .api_base
            .join(path)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid path {}: {}", spec.path, e)))?;

        if !spec.query.is_empty() {
            url.query_pairs_mut().extend_pairs(spec.query.iter());
        }

        let mut request = OutboundRequest::new(spec.method.clone(), url);
        for (name, value) in &spec.headers {
            let (name, value) = parse_header(name, value)?;
            request.headers.insert(name, value);
        }
        request.body = spec.body.clone();

        Ok(request)
    }
}
