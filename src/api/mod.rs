//! JIRA API client and types.
//!
//! This module provides the interface for communicating with the JIRA REST API.
//! Everything above it talks to the [`JiraApi`] trait so the cache, the
//! resolver and the orchestrator can be exercised without a server.

pub mod auth;
mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod types;

use async_trait::async_trait;

pub use auth::Auth;
pub use client::{
    ClientOptions, JiraClient, DEFAULT_RATE_LIMIT_BACKOFF_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use error::ApiError;

use types::{
    AssigneeSummary, CreateIssueRequest, CreatedIssueResponse, EpicSummary, FieldSchema,
    IssueTypeSummary, ProjectSummary,
};

/// The JIRA operations the issue form needs.
#[async_trait]
pub trait JiraApi: Send + Sync {
    /// List every project visible to the user.
    async fn list_projects(&self) -> error::Result<Vec<ProjectSummary>>;

    /// List the issue types that can be created in a project.
    async fn list_issue_types(&self, project_key: &str) -> error::Result<Vec<IssueTypeSummary>>;

    /// Search a project's epics, optionally narrowed by summary text.
    async fn search_epics(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> error::Result<Vec<EpicSummary>>;

    /// Search users assignable in a project, optionally narrowed by name.
    async fn search_assignable_users(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> error::Result<Vec<AssigneeSummary>>;

    /// Fetch the fields of a project's create screens.
    async fn create_field_schema(&self, project_key: &str) -> error::Result<Vec<FieldSchema>>;

    /// Submit a new issue.
    async fn create_issue(&self, request: &CreateIssueRequest)
        -> error::Result<CreatedIssueResponse>;
}
