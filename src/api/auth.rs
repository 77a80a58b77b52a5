//! Basic authentication and token storage.
//!
//! JIRA Cloud takes `Authorization: Basic base64(email:token)`. Tokens can be
//! kept in the OS keyring (service `jira-quick-create`, user = email) instead
//! of the environment.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::config::ConfigError;

const KEYRING_SERVICE: &str = "jira-quick-create";

/// A precomputed `Authorization` header for one account.
#[derive(Clone)]
pub struct Auth {
    email: String,
    header: String,
}

impl Auth {
    /// Encode the header up front; the raw token is not kept.
    pub fn new(email: &str, token: &str) -> Self {
        let pair = format!("{}:{}", email, token);
        Self {
            email: email.to_string(),
            header: format!("Basic {}", BASE64.encode(pair)),
        }
    }

    pub fn header_value(&self) -> &str {
        &self.header
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("email", &self.email)
            .field("header", &"Basic <redacted>")
            .finish()
    }
}

fn keyring_entry(email: &str) -> keyring::Result<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, email)
}

/// Save `token` in the keyring for `email`.
pub fn store_token(email: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(email)
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(format!("could not store token for {}: {}", email, e)))
}

/// The keyring token for `email`, if there is a non-empty one.
///
/// A missing entry and an unusable keyring look the same here; either way the
/// token is reported as missing configuration.
pub fn lookup_token(email: &str) -> Option<String> {
    match keyring_entry(email).and_then(|entry| entry.get_password()) {
        Ok(token) => Some(token).filter(|t| !t.is_empty()),
        Err(e) => {
            debug!("No keyring token for {}: {}", email, e);
            None
        }
    }
}
