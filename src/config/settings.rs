//! Application settings configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};
use crate::api::{ClientOptions, DEFAULT_RATE_LIMIT_BACKOFF_SECS, DEFAULT_TIMEOUT_SECS};
use crate::cache::MetadataCache;

/// Which form renderer to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A YAD dialog. Also chosen by the launcher's `gtk` preference, since
    /// the launcher runs without a terminal.
    #[default]
    #[serde(alias = "gtk")]
    #[value(alias = "gtk")]
    Yad,
    /// Line prompts on the terminal.
    #[serde(alias = "terminal")]
    #[value(alias = "terminal")]
    Prompt,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yad" | "gtk" => Ok(Backend::Yad),
            "prompt" | "terminal" => Ok(Backend::Prompt),
            other => Err(ConfigError::ValidationError(format!(
                "unknown UI backend '{}', expected 'yad' or 'prompt'",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Yad => "yad",
            Backend::Prompt => "prompt",
        })
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Project preselected in the form.
    pub default_project_key: Option<String>,
    /// The form renderer.
    pub backend: Backend,
    /// Where cached metadata is kept; the platform cache dir if unset.
    pub cache_dir: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Wait before retrying a rate-limited request, in seconds.
    pub rate_limit_backoff_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_project_key: None,
            backend: Backend::default(),
            cache_dir: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit_backoff_secs: DEFAULT_RATE_LIMIT_BACKOFF_SECS,
        }
    }
}

impl Settings {
    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP client options derived from these settings.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
        }
    }

    /// The cache directory to use.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(MetadataCache::default_dir)
    }
}
