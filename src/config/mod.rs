//! Configuration management.
//!
//! Connection details and settings come from, lowest to highest precedence:
//! an optional TOML file, the launcher's `ULAUNCHER_EXTENSION_*` variables and
//! `JIRA_*` variables. The API token may also live in the OS keyring.

mod credentials;
mod settings;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use credentials::Credentials;
pub use settings::{Backend, Settings};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform has no configuration directory.
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The config file is not valid TOML.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A required value is not set anywhere; holds the variable name.
    #[error("{0} is not configured")]
    Missing(&'static str),

    /// A value is set but unusable.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The OS keyring could not be used.
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Prefix of the variables the launcher exports for extension preferences.
const LAUNCHER_PREFIX: &str = "ULAUNCHER_EXTENSION_";

/// Prefix of the plain environment variables.
const ENV_PREFIX: &str = "JIRA_";

/// On-disk layout of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    jira: JiraSection,
    settings: Settings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JiraSection {
    base_url: Option<String>,
    email: Option<String>,
    api_token: Option<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl Config {
    /// Default location of `config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("jira-quick-create").join("config.toml"))
    }

    /// Load configuration from the file, the environment and the keyring.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::resolve(
            read_optional(path)?,
            |name| std::env::var(name).ok(),
            crate::api::auth::lookup_token,
        )
    }

    /// Load only the settings, for commands that do not talk to JIRA.
    pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
        let file = read_optional(path)?;
        resolve_settings(file.settings, &|name: &str| std::env::var(name).ok())
    }

    /// Merge the sources. `env` looks up a variable, `keyring` a token by email.
    fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        keyring: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let base_url = lookup(&env, "BASE_URL", file.jira.base_url)
            .ok_or(ConfigError::Missing("JIRA_BASE_URL"))?;
        let email =
            lookup(&env, "EMAIL", file.jira.email).ok_or(ConfigError::Missing("JIRA_EMAIL"))?;
        let api_token = match lookup(&env, "API_TOKEN", file.jira.api_token) {
            Some(token) => token,
            None => {
                debug!("No API token in file or environment, trying keyring");
                keyring(&email).ok_or(ConfigError::Missing("JIRA_API_TOKEN"))?
            }
        };

        let credentials = Credentials::new(&base_url, &email, &api_token);
        credentials.validate()?;

        Ok(Self {
            credentials,
            settings: resolve_settings(file.settings, &env)?,
        })
    }
}

/// First non-blank value of `JIRA_<name>`, `ULAUNCHER_EXTENSION_<name>` and
/// `fallback`, trimmed.
fn lookup(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
    fallback: Option<String>,
) -> Option<String> {
    [
        env(&format!("{}{}", ENV_PREFIX, name)),
        env(&format!("{}{}", LAUNCHER_PREFIX, name)),
        fallback,
    ]
    .into_iter()
    .flatten()
    .map(|value| value.trim().to_string())
    .find(|value| !value.is_empty())
}

fn resolve_settings(
    mut settings: Settings,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    settings.default_project_key =
        lookup(env, "DEFAULT_PROJECT_KEY", settings.default_project_key.take())
            .map(|key| key.to_uppercase());
    if let Some(backend) = lookup(env, "UI_BACKEND", None) {
        settings.backend = backend.parse()?;
    }
    settings.validate()?;
    Ok(settings)
}

fn read_optional(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => read_file(path),
        None => match Config::default_path() {
            Ok(path) if path.exists() => read_file(&path),
            _ => Ok(ConfigFile::default()),
        },
    }
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    debug!("Reading config file {:?}", path);
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn no_keyring(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_resolve_from_env() {
        let config = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://x.atlassian.net/"),
                ("JIRA_EMAIL", "me@x.com"),
                ("JIRA_API_TOKEN", "secret"),
                ("JIRA_DEFAULT_PROJECT_KEY", " proj "),
            ]),
            no_keyring,
        )
        .unwrap();

        assert_eq!(config.credentials.base_url, "https://x.atlassian.net");
        assert_eq!(config.credentials.email, "me@x.com");
        assert_eq!(config.credentials.api_token(), "secret");
        assert_eq!(config.settings.default_project_key.as_deref(), Some("PROJ"));
        assert_eq!(config.settings.backend, Backend::Yad);
    }

    #[test]
    fn test_precedence_jira_over_launcher_over_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [jira]
            base_url = "https://file.atlassian.net"
            email = "file@x.com"
            api_token = "file-token"

            [settings]
            default_project_key = "FILE"
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            file,
            env_of(&[
                ("ULAUNCHER_EXTENSION_BASE_URL", "https://launcher.atlassian.net"),
                ("ULAUNCHER_EXTENSION_EMAIL", "launcher@x.com"),
                ("JIRA_EMAIL", "env@x.com"),
                ("ULAUNCHER_EXTENSION_UI_BACKEND", "prompt"),
            ]),
            no_keyring,
        )
        .unwrap();

        assert_eq!(config.credentials.base_url, "https://launcher.atlassian.net");
        assert_eq!(config.credentials.email, "env@x.com");
        assert_eq!(config.credentials.api_token(), "file-token");
        assert_eq!(config.settings.default_project_key.as_deref(), Some("FILE"));
        assert_eq!(config.settings.backend, Backend::Prompt);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "  "),
                ("JIRA_EMAIL", "me@x.com"),
                ("JIRA_API_TOKEN", "secret"),
            ]),
            no_keyring,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JIRA_BASE_URL")));
    }

    #[test]
    fn test_token_from_keyring() {
        let config = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://x.atlassian.net"),
                ("JIRA_EMAIL", "me@x.com"),
            ]),
            |email| (email == "me@x.com").then(|| "from-keyring".to_string()),
        )
        .unwrap();
        assert_eq!(config.credentials.api_token(), "from-keyring");
    }

    #[test]
    fn test_missing_token() {
        let err = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://x.atlassian.net"),
                ("JIRA_EMAIL", "me@x.com"),
            ]),
            no_keyring,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "JIRA_API_TOKEN is not configured");
    }

    #[test]
    fn test_launcher_gtk_preference_uses_yad() {
        let config = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://x.atlassian.net"),
                ("JIRA_EMAIL", "me@x.com"),
                ("JIRA_API_TOKEN", "secret"),
                ("ULAUNCHER_EXTENSION_UI_BACKEND", "gtk"),
            ]),
            no_keyring,
        )
        .unwrap();
        assert_eq!(config.settings.backend, Backend::Yad);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let err = Config::resolve(
            ConfigFile::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://x.atlassian.net"),
                ("JIRA_EMAIL", "me@x.com"),
                ("JIRA_API_TOKEN", "secret"),
                ("ULAUNCHER_EXTENSION_UI_BACKEND", "qt"),
            ]),
            no_keyring,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[jira\nbase_url = 1").unwrap();
        assert!(matches!(
            Config::load(Some(path.as_path())),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(Some(dir.path().join("absent.toml").as_path())),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[settings]\nrequest_timeout_secs = 5\nbackend = \"prompt\"\n",
        )
        .unwrap();

        std::env::set_var("JIRA_BASE_URL", "https://env.atlassian.net");
        std::env::set_var("JIRA_EMAIL", "env@x.com");
        std::env::set_var("JIRA_API_TOKEN", "env-token");
        let result = Config::load(Some(path.as_path()));
        std::env::remove_var("JIRA_BASE_URL");
        std::env::remove_var("JIRA_EMAIL");
        std::env::remove_var("JIRA_API_TOKEN");

        let config = result.unwrap();
        assert_eq!(config.credentials.base_url, "https://env.atlassian.net");
        assert_eq!(config.settings.request_timeout_secs, 5);
        assert_eq!(config.settings.backend, Backend::Prompt);
    }

    #[test]
    fn test_settings_without_credentials() {
        let settings = resolve_settings(
            Settings::default(),
            &env_of(&[("ULAUNCHER_EXTENSION_DEFAULT_PROJECT_KEY", "ops")]),
        )
        .unwrap();
        assert_eq!(settings.default_project_key.as_deref(), Some("OPS"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[settings]\ncache_dir = \"/tmp/jqc\"\n").unwrap();
        let settings = Config::load_settings(Some(path.as_path())).unwrap();
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/jqc")));
    }
}
