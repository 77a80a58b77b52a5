//! Issue creation.
//!
//! [`IssueCreator`] turns an [`IssueDraft`] into a JIRA issue: it validates
//! the draft, resolves how the project links epics when an epic was picked,
//! converts the description to ADF and submits exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::types::{
    AccountRef, CreateIssueFields, CreateIssueRequest, EpicLink, IdRef, KeyRef,
};
use crate::api::{ApiError, JiraApi};
use crate::cache::MetadataCache;
use crate::document::to_document;
use crate::resolver::FieldSchemaResolver;

/// The user's in-progress issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueDraft {
    pub project_key: String,
    pub issue_type_id: String,
    pub summary: String,
    pub epic_key: Option<String>,
    pub description: String,
    pub assignee_id: Option<String>,
}

impl IssueDraft {
    /// The epic key, if set to something other than whitespace.
    pub fn epic(&self) -> Option<&str> {
        non_blank(self.epic_key.as_deref())
    }

    /// The assignee account id, if set to something other than whitespace.
    pub fn assignee(&self) -> Option<&str> {
        non_blank(self.assignee_id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A successfully created issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    /// The issue key, e.g. "PROJ-42".
    pub key: String,
    /// Browser URL of the issue.
    pub url: String,
}

/// The draft fields that are validated before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Project,
    IssueType,
    Summary,
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DraftField::Project => "project",
            DraftField::IssueType => "issue type",
            DraftField::Summary => "summary",
        })
    }
}

/// Why an issue could not be created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CreateError {
    /// The draft is incomplete; nothing was sent.
    #[error("{field}: {message}")]
    Validation { field: DraftField, message: String },

    /// JIRA refused the issue.
    #[error("JIRA rejected the issue: {}", describe_rejection(.messages, .field_errors))]
    Rejected {
        field_errors: BTreeMap<String, String>,
        messages: Vec<String>,
    },

    /// Credentials were refused.
    #[error("Authentication failed: {0}")]
    Auth(ApiError),

    /// The project or issue type does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Still rate limited after the client's backoff.
    #[error("Rate limited by JIRA")]
    RateLimited,

    /// Network, server or response failure.
    #[error("Could not reach JIRA: {0}")]
    Transport(String),
}

impl CreateError {
    fn validation(field: DraftField, message: &str) -> Self {
        CreateError::Validation {
            field,
            message: message.to_string(),
        }
    }
}

fn describe_rejection(messages: &[String], field_errors: &BTreeMap<String, String>) -> String {
    let mut parts: Vec<String> = messages.to_vec();
    parts.extend(
        field_errors
            .iter()
            .map(|(field, error)| format!("{}: {}", field, error)),
    );
    if parts.is_empty() {
        "no details given".to_string()
    } else {
        parts.join("; ")
    }
}

impl From<ApiError> for CreateError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized | ApiError::Forbidden => CreateError::Auth(error),
            ApiError::NotFound(what) => CreateError::NotFound(what),
            ApiError::RateLimited { .. } => CreateError::RateLimited,
            ApiError::BadRequest {
                messages,
                field_errors,
            } => CreateError::Rejected {
                field_errors,
                messages,
            },
            ApiError::Transport(msg) => CreateError::Transport(msg),
            ApiError::InvalidResponse(msg) => {
                CreateError::Transport(format!("invalid response: {}", msg))
            }
        }
    }
}

/// Submits drafts to JIRA.
#[derive(Clone)]
pub struct IssueCreator {
    api: Arc<dyn JiraApi>,
    resolver: FieldSchemaResolver,
    base_url: String,
}

impl IssueCreator {
    /// Create an orchestrator; `base_url` is used for browse links.
    pub fn new(api: Arc<dyn JiraApi>, cache: Arc<MetadataCache>, base_url: &str) -> Self {
        Self {
            resolver: FieldSchemaResolver::new(api.clone(), cache),
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Browser URL for an issue key.
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }

    /// Validate and submit `draft`.
    ///
    /// The create request is sent at most once. The epic goes into the
    /// project's epic-link field, or into `parent` when the project only has
    /// that. An epic on a project with neither is dropped.
    #[instrument(skip(self, draft), fields(project = %draft.project_key))]
    pub async fn create(&self, draft: &IssueDraft) -> Result<CreatedIssue, CreateError> {
        let request = self.build_request(draft).await?;

        let created = self.api.create_issue(&request).await.map_err(|e| {
            warn!("Issue creation failed: {}", e);
            CreateError::from(e)
        })?;

        info!("Created issue {}", created.key);
        Ok(CreatedIssue {
            url: self.browse_url(&created.key),
            key: created.key,
        })
    }

    async fn build_request(&self, draft: &IssueDraft) -> Result<CreateIssueRequest, CreateError> {
        let project_key = draft.project_key.trim();
        if project_key.is_empty() {
            return Err(CreateError::validation(
                DraftField::Project,
                "a project is required",
            ));
        }
        let issue_type_id = draft.issue_type_id.trim();
        if issue_type_id.is_empty() {
            return Err(CreateError::validation(
                DraftField::IssueType,
                "an issue type is required",
            ));
        }
        let summary = draft.summary.trim();
        if summary.is_empty() {
            return Err(CreateError::validation(
                DraftField::Summary,
                "summary cannot be empty",
            ));
        }

        let mut custom = BTreeMap::new();
        let mut parent = None;
        if let Some(epic_key) = draft.epic() {
            match self.resolver.resolve_epic_link(project_key).await? {
                Some(EpicLink::Field(field)) => {
                    custom.insert(
                        field.as_str().to_string(),
                        serde_json::Value::String(epic_key.to_string()),
                    );
                }
                Some(EpicLink::Parent) => {
                    parent = Some(KeyRef {
                        key: epic_key.to_string(),
                    });
                }
                None => info!(
                    "Project {} has no epic link field, leaving out epic {}",
                    project_key, epic_key
                ),
            }
        }

        Ok(CreateIssueRequest {
            fields: CreateIssueFields {
                project: KeyRef {
                    key: project_key.to_string(),
                },
                issuetype: IdRef {
                    id: issue_type_id.to_string(),
                },
                summary: summary.to_string(),
                description: to_document(&draft.description),
                assignee: draft.assignee().map(|id| AccountRef {
                    account_id: id.to_string(),
                }),
                parent,
                custom,
            },
        })
    }
}
