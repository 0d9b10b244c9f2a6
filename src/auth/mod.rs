//! Authentication module - Session credentials and their lifecycle
//!
//! - Credential pair storage with pluggable persistence (keyring, file, memory)
//! - Single-flight refresh of expired access credentials
//! - Session teardown and the re-authentication signal

mod credentials;
mod file_backend;
mod keyring_backend;
mod refresh;
mod refresher;
mod session;
mod store;

pub use credentials::{CredentialPair, TokenResponse};
pub use file_backend::FileBackend;
pub use keyring_backend::{KeyringBackend, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use refresh::{
    PendingRequest, RefreshCoordinator, RefreshFailurePolicy, RefreshOnUnauthorized, RefreshStats,
};
pub use refresher::{HttpRefresher, RefreshError, TokenRefresher, REFRESH_TOKEN_HEADER};
pub use session::{ExpiryCallback, ExpiryReason, SessionEvent, SessionExpired, SessionFailureHandler};
pub use store::{CredentialStore, MemoryBackend, StorageBackend, StoreError};
