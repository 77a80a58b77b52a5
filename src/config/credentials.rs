//! JIRA connection credentials.

use std::fmt;

use super::{ConfigError, Result};

/// Connection details for the JIRA instance.
///
/// The token is kept private so it only leaves through [`api_token`] and
/// never shows up in `Debug` output or logs.
///
/// [`api_token`]: Credentials::api_token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The JIRA instance URL, without a trailing slash.
    pub base_url: String,

    /// The user's email address.
    ///
    /// Used for JIRA API authentication along with the API token.
    pub email: String,

    api_token: String,
}

impl Credentials {
    /// Create credentials, trimming whitespace and trailing slashes.
    pub fn new(base_url: &str, email: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            email: email.trim().to_string(),
            api_token: api_token.trim().to_string(),
        }
    }

    /// The API token.
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Validate these credentials.
    ///
    /// Checks that:
    /// - The URL is non-empty and uses http or https
    /// - The email is non-empty and looks like an address
    /// - The token is non-empty
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base URL cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "base URL '{}' must start with http:// or https://",
                self.base_url
            )));
        }

        if self.email.is_empty() {
            return Err(ConfigError::ValidationError(
                "email cannot be empty".to_string(),
            ));
        }

        if !self.email.contains('@') {
            return Err(ConfigError::ValidationError(format!(
                "'{}' does not appear to be a valid email address",
                self.email
            )));
        }

        if self.api_token.is_empty() {
            return Err(ConfigError::ValidationError(
                "API token cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}
