//! Security module - Secret handling and log redaction
//!
//! - Zeroizing token type for credential material
//! - Sanitizers for tokens, emails and URLs before they reach the logs

mod sanitizer;
mod secret;

pub use sanitizer::Sanitizer;
pub use secret::SecretToken;
