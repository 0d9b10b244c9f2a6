//! Client module - Request pipeline for the PlacePrep backend
//!
//! - Request specs, attempts and buffered responses
//! - Ordered request/response middleware (bearer credential, refresh on 401)
//! - Pluggable transport, reqwest by default

mod api;
mod dispatcher;
mod error;
mod middleware;
mod request;
mod response;
mod transport;

pub use api::{ApiClient, ApiClientBuilder};
pub use dispatcher::Dispatcher;
pub use error::{ApiError, TransportError};
pub use middleware::{BearerAuth, DefaultHeaders, Exchange, Flow, RequestLayer, ResponseLayer};
pub use request::{Attempt, OutboundRequest, RequestBody, RequestSpec};
pub use response::ApiResponse;
pub use transport::{ReqwestTransport, Transport};
