//! PlacePrep API client - Authenticated access to the PlacePrep backend
//!
//! The client every PlacePrep page issues its requests through.
//!
//! ## Features
//!
//! - Bearer credential attached to every request
//! - Single-flight credential refresh on 401, with queued requests replayed in order
//! - Session teardown with a single re-authentication signal per episode
//! - Credential persistence (Windows Credential Manager, macOS Keychain, Linux Secret Service, or a file)
//!
//! ## Architecture
//!
//! - **Auth**: Credential store, refresh coordinator, session failure handler
//! - **Client**: Dispatcher, middleware, transport and the `ApiClient` facade
//! - **Config**: Backend URL, storage and refresh policy
//! - **Security**: Zeroizing secrets and log sanitization

pub mod auth;
pub mod client;
pub mod config;
pub mod security;
pub mod telemetry;

pub use auth::{
    CredentialPair, CredentialStore, ExpiryReason, RefreshFailurePolicy, SessionEvent,
    SessionExpired,
};
pub use client::{ApiClient, ApiClientBuilder, ApiError, ApiResponse, RequestSpec};
pub use config::{ClientConfig, StorageConfig};
pub use security::SecretToken;
