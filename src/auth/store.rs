//! Credential store - the single current credential pair
//!
//! The store keeps an in-process copy of the pair behind a lock and writes
//! every change through to a [`StorageBackend`], so the session survives a
//! restart. Readers take the lock and clone the whole pair; a torn pair
//! (access token from one generation, refresh token from another) cannot be
//! observed.

use std::sync::{Mutex, PoisonError, RwLock};

use thiserror::Error;

use super::credentials::CredentialPair;
use crate::security::SecretToken;

/// Errors that can occur while persisting credentials
#[derive(Debug, Error)]
pub enum StoreError {
    /// Keyring operation failed
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be decoded
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

/// Durable storage for the credential pair
///
/// Implementations never touch the network or the UI.
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend: Send + Sync {
    /// Loads the persisted pair, `None` when nothing (or only half a pair) is stored
    fn load(&self) -> Result<Option<CredentialPair>, StoreError>;

    /// Persists both tokens of the pair
    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError>;

    /// Removes every key this backend owns
    fn clear(&self) -> Result<(), StoreError>;
}

/// Non-durable backend, for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<CredentialPair>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds a pair, as if persisted by an earlier run
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            slot: Mutex::new(Some(pair)),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Holds the current credential pair and mirrors it to durable storage
pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    current: RwLock<Option<CredentialPair>>,
}

impl CredentialStore {
    /// Opens the store, restoring whatever pair the backend persisted
    pub fn open(backend: impl StorageBackend + 'static) -> Result<Self, StoreError> {
        let restored = backend.load()?;
        if restored.is_some() {
            tracing::info!("Restored persisted session credentials");
        }

        Ok(Self {
            backend: Box::new(backend),
            current: RwLock::new(restored),
        })
    }

    /// Creates an empty store that is not persisted anywhere
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            current: RwLock::new(None),
        }
    }

    /// Returns a copy of the current pair
    pub fn get(&self) -> Option<CredentialPair> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the current access token, if a session exists
    pub fn access_token(&self) -> Option<SecretToken> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    pub fn is_present(&self) -> bool {
        self.current.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Replaces the current pair
    ///
    /// The in-process copy is replaced even when persisting fails, since the
    /// backend has already rotated the old refresh token by the time a new
    /// pair arrives.
    pub fn set(&self, pair: CredentialPair) -> Result<(), StoreError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let persisted = self.backend.save(&pair);
        *current = Some(pair);
        persisted
    }

    /// Drops the current pair and every persisted key
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = None;
        self.backend.clear()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.is_present())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_in_memory_starts_empty() {
        let store = CredentialStore::in_memory();
        assert!(store.get().is_none());
        assert!(store.access_token().is_none());
        assert!(!store.is_present());
    }

    #[test]
    fn test_set_get_clear() {
        let store = CredentialStore::in_memory();
        store.set(CredentialPair::new("a1", "r1")).unwrap();
        assert_eq!(store.get(), Some(CredentialPair::new("a1", "r1")));
        assert_eq!(store.access_token().unwrap(), "a1");

        store.clear().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_open_restores_persisted_pair() {
        let backend = MemoryBackend::with_pair(CredentialPair::new("a0", "r0"));
        let store = CredentialStore::open(backend).unwrap();
        assert_eq!(store.get(), Some(CredentialPair::new("a0", "r0")));
    }

    #[test]
    fn test_set_writes_through_to_backend() {
        let mut backend = MockStorageBackend::new();
        backend.expect_load().times(1).returning(|| Ok(None));
        backend
            .expect_save()
            .withf(|pair| pair.access_token == "a2" && pair.refresh_token == "r2")
            .times(1)
            .returning(|_| Ok(()));
        backend.expect_clear().times(1).returning(|| Ok(()));

        let store = CredentialStore::open(backend).unwrap();
        store.set(CredentialPair::new("a2", "r2")).unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_failed_persist_still_replaces_pair() {
        let mut backend = MockStorageBackend::new();
        backend.expect_load().returning(|| Ok(None));
        backend
            .expect_save()
            .returning(|_| Err(StoreError::InvalidFormat("disk full".into())));

        let store = CredentialStore::open(backend).unwrap();
        assert!(store.set(CredentialPair::new("a3", "r3")).is_err());
        assert_eq!(store.get(), Some(CredentialPair::new("a3", "r3")));
    }

    #[test]
    fn test_open_propagates_load_error() {
        let mut backend = MockStorageBackend::new();
        backend
            .expect_load()
            .returning(|| Err(StoreError::InvalidFormat("garbage".into())));

        assert!(CredentialStore::open(backend).is_err());
    }

    #[test]
    fn test_readers_never_observe_torn_pair() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("access-0", "refresh-0")).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..500 {
                    store
                        .set(CredentialPair::new(format!("access-{}", i), format!("refresh-{}", i)))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let pair = store.get().unwrap();
                        let access = pair.access_token.expose().trim_start_matches("access-");
                        let refresh = pair.refresh_token.expose().trim_start_matches("refresh-");
                        assert_eq!(access, refresh);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
