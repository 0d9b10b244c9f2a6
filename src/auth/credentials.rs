//! Credential pair and the backend's token payload

use serde::{Deserialize, Serialize};

use crate::security::SecretToken;

/// The current access/refresh credential pair
///
/// Both halves are always replaced together; there is no way to update one
/// side of a stored pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived bearer token attached to every request
    pub access_token: SecretToken,
    /// Longer-lived token used only against the refresh endpoint
    pub refresh_token: SecretToken,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<SecretToken>, refresh_token: impl Into<SecretToken>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Body returned by `/auth/login`, `/auth/register` and `/auth/refresh`
///
/// Both fields are required. Any extra fields (user profile, token type) are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretToken,
    pub refresh_token: SecretToken,
}

impl From<TokenResponse> for CredentialPair {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}
