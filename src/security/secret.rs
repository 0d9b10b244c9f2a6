//! Zeroizing storage for bearer tokens
//!
//! Access and refresh tokens are opaque to this crate. They are only ever
//! compared, attached to headers, and persisted; the backing memory is wiped
//! when the last copy is dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An opaque bearer token whose memory is zeroed on drop
///
/// `Debug` never prints the token itself, so a `SecretToken` can sit inside
/// structs that are logged with `{:?}`.
///
/// # Example
///
/// ```
/// use placeprep_client::security::SecretToken;
///
/// let token = SecretToken::new("eyJhbGciOi.payload.sig");
/// assert_eq!(token.expose(), "eyJhbGciOi.payload.sig");
/// assert!(!format!("{:?}", token).contains("payload"));
/// ```
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for header construction or persistence
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Formats the token as an `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretToken")
            .field("len", &self.0.len())
            .field("content", &"[REDACTED]")
            .finish()
    }
}

impl From<String> for SecretToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq for SecretToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl Eq for SecretToken {}

impl PartialEq<str> for SecretToken {
    fn eq(&self, other: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), other.as_bytes())
    }
}

impl PartialEq<&str> for SecretToken {
    fn eq(&self, other: &&str) -> bool {
        constant_time_eq(self.0.as_bytes(), other.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
