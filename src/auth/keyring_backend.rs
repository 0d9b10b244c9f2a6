//! OS credential manager backend
//!
//! Persists the pair as two entries (`access_token`, `refresh_token`) under a
//! per-client service namespace in Windows Credential Manager, macOS Keychain
//! or the Linux Secret Service, via the keyring crate.

use keyring::Entry;

use super::credentials::CredentialPair;
use super::store::{StorageBackend, StoreError};
use crate::security::SecretToken;

/// Key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Keyring-backed credential persistence
///
/// # Example
///
/// ```no_run
/// use placeprep_client::auth::{CredentialStore, KeyringBackend};
///
/// let store = CredentialStore::open(KeyringBackend::new("PlacePrep")).unwrap();
/// println!("signed in: {}", store.is_present());
/// ```
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Returns the service namespace used for this backend
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Every key owned by this backend
    pub fn known_keys() -> &'static [&'static str] {
        &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]
    }
}

/// Named secret entries the pair is spread across
trait SecretSlots {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Returns `false` if there was nothing to delete
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

impl SecretSlots for KeyringBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Entry::new(&self.service, key)?.set_password(value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(StoreError::Keyring(e)),
        }
    }
}

fn load_pair(slots: &impl SecretSlots) -> Result<Option<CredentialPair>, StoreError> {
    let access = slots.read(ACCESS_TOKEN_KEY)?;
    let refresh = slots.read(REFRESH_TOKEN_KEY)?;

    match (access, refresh) {
        (Some(access), Some(refresh)) => Ok(Some(CredentialPair {
            access_token: SecretToken::from(access),
            refresh_token: SecretToken::from(refresh),
        })),
        (None, None) => Ok(None),
        _ => {
            // Half a pair means an earlier save was interrupted
            tracing::warn!("Discarding incomplete persisted credential pair");
            clear_pair(slots)?;
            Ok(None)
        }
    }
}

/// Access is removed first and written last, so an interrupted save leaves
/// half a pair (discarded on load) rather than a new refresh token next to
/// the old access token.
fn save_pair(slots: &impl SecretSlots, pair: &CredentialPair) -> Result<(), StoreError> {
    slots.delete(ACCESS_TOKEN_KEY)?;
    slots.write(REFRESH_TOKEN_KEY, pair.refresh_token.expose())?;
    slots.write(ACCESS_TOKEN_KEY, pair.access_token.expose())
}

fn clear_pair(slots: &impl SecretSlots) -> Result<(), StoreError> {
    let mut first_error = None;
    for key in KeyringBackend::known_keys() {
        if let Err(e) = slots.delete(key) {
            tracing::warn!(key, "Failed to delete keyring entry: {}", e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

impl StorageBackend for KeyringBackend {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        load_pair(self)
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        save_pair(self, pair)
    }

    fn clear(&self) -> Result<(), StoreError> {
        tracing::debug!(service = %self.service, "Clearing keyring credentials");
        clear_pair(self)
    }
}
