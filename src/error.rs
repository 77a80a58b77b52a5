//! Centralized error types for jira-quick-create.
//!
//! Each layer has its own `thiserror` enum; [`AppError`] gathers them for the
//! binary and turns them into messages fit for a notification or dialog.

use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::ConfigError;
use crate::create::CreateError;

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Issue creation errors.
    #[error("{0}")]
    Create(#[from] CreateError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The form renderer failed.
    #[error("Form error: {0}")]
    Frontend(String),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a frontend error.
    pub fn frontend(msg: impl Into<String>) -> Self {
        AppError::Frontend(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// Get a user-friendly message for display.
    ///
    /// This returns a message suitable for a desktop notification or dialog,
    /// without technical jargon.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file exists and is readable.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::Missing(name) => {
                    format!("Missing configuration: {} is not set.", name)
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::Keyring(_) => {
                    "Could not access secure storage for the API token.".to_string()
                }
            },
            AppError::Api(e) => api_message(e),
            AppError::Create(e) => match e {
                CreateError::Validation { field, message } => {
                    format!("Please check the {}: {}", field, message)
                }
                CreateError::Rejected { .. } => e.to_string(),
                CreateError::Auth(inner) => api_message(inner),
                CreateError::NotFound(what) => format!("'{}' was not found.", what),
                CreateError::RateLimited => {
                    "Too many requests. Please wait a moment and try again.".to_string()
                }
                CreateError::Transport(_) => {
                    "Could not reach JIRA. The issue was not created.".to_string()
                }
            },
            AppError::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
            AppError::Frontend(msg) => format!("Form error: {}", msg),
            AppError::Other(msg) => msg.clone(),
        }
    }

    /// Check if this error is critical and ends the session.
    ///
    /// Configuration and authentication problems cannot be fixed from the form.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Api(ApiError::Unauthorized)
                | AppError::Api(ApiError::Forbidden)
                | AppError::Create(CreateError::Auth(_))
                | AppError::Frontend(_)
        )
    }

    /// Check if the form can be shown again so the user can fix the input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Create(CreateError::Validation { .. })
                | AppError::Create(CreateError::Rejected { .. })
        )
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AppError::Config(ConfigError::Missing(_)) => Some(
                "Set JIRA_BASE_URL, JIRA_EMAIL and JIRA_API_TOKEN, or the extension preferences.",
            ),
            AppError::Config(ConfigError::Keyring(_)) => {
                Some("Run 'jira-create set-token --email <EMAIL>' to store the token again.")
            }
            AppError::Api(ApiError::Unauthorized)
            | AppError::Create(CreateError::Auth(ApiError::Unauthorized)) => Some(
                "Check your API token at https://id.atlassian.com/manage-profile/security/api-tokens",
            ),
            AppError::Api(ApiError::RateLimited { .. }) | AppError::Create(CreateError::RateLimited) => {
                Some("Wait a few seconds and try again.")
            }
            AppError::Api(ApiError::Transport(_)) | AppError::Create(CreateError::Transport(_)) => {
                Some("Check your internet connection and JIRA URL.")
            }
            _ => None,
        }
    }
}

fn api_message(error: &ApiError) -> String {
    match error {
        ApiError::Unauthorized => {
            "Authentication failed. Please check your email and API token.".to_string()
        }
        ApiError::Forbidden => {
            "Access denied. You don't have permission to access this resource.".to_string()
        }
        ApiError::NotFound(resource) => format!("'{}' was not found.", resource),
        ApiError::RateLimited { .. } => {
            "Too many requests. Please wait a moment and try again.".to_string()
        }
        ApiError::BadRequest { .. } => format!("JIRA refused the request: {}", error),
        ApiError::Transport(_) => {
            "Connection failed. Please check your internet connection.".to_string()
        }
        ApiError::InvalidResponse(_) => {
            "Unexpected response from JIRA. Please try again.".to_string()
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::DraftField;

    #[test]
    fn test_app_error_from_config_error() {
        let app_err: AppError = ConfigError::NoConfigDir.into();
        assert!(matches!(app_err, AppError::Config(ConfigError::NoConfigDir)));
    }

    #[test]
    fn test_app_error_from_create_error() {
        let app_err: AppError = CreateError::RateLimited.into();
        assert!(matches!(app_err, AppError::Create(CreateError::RateLimited)));
    }

    #[test]
    fn test_user_message_unauthorized() {
        let msg = AppError::Api(ApiError::Unauthorized).user_message();
        assert!(msg.contains("Authentication failed"));
        assert!(msg.contains("API token"));
    }

    #[test]
    fn test_user_message_missing_config() {
        let msg = AppError::Config(ConfigError::Missing("JIRA_EMAIL")).user_message();
        assert_eq!(msg, "Missing configuration: JIRA_EMAIL is not set.");
    }

    #[test]
    fn test_user_message_validation() {
        let err = AppError::Create(CreateError::Validation {
            field: DraftField::Summary,
            message: "summary cannot be empty".to_string(),
        });
        assert_eq!(
            err.user_message(),
            "Please check the summary: summary cannot be empty"
        );
        assert!(err.is_recoverable());
        assert!(!err.is_critical());
    }

    #[test]
    fn test_auth_is_critical_everywhere() {
        assert!(AppError::Api(ApiError::Forbidden).is_critical());
        assert!(AppError::Create(CreateError::Auth(ApiError::Unauthorized)).is_critical());
        assert!(AppError::Config(ConfigError::NoConfigDir).is_critical());
        assert!(!AppError::Create(CreateError::RateLimited).is_critical());
    }

    #[test]
    fn test_suggested_action_unauthorized() {
        let action = AppError::Create(CreateError::Auth(ApiError::Unauthorized))
            .suggested_action()
            .unwrap();
        assert!(action.contains("api-tokens"));
    }

    #[test]
    fn test_suggested_action_transport() {
        let err = AppError::Api(ApiError::Transport("dns".to_string()));
        assert!(err.suggested_action().unwrap().contains("internet"));
        assert!(AppError::other("x").suggested_action().is_none());
    }

    #[test]
    fn test_other_and_frontend_errors() {
        assert_eq!(AppError::other("something went wrong").user_message(), "something went wrong");
        assert_eq!(AppError::frontend("yad missing").user_message(), "Form error: yad missing");
    }
}
