//! In-memory `JiraApi` for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{ApiError, Result};
use super::types::{
    AssigneeSummary, CreateIssueRequest, CreatedIssueResponse, EpicSummary, FieldSchema,
    IssueTypeSummary, ProjectSummary,
};
use super::JiraApi;

/// A scripted JIRA that counts calls per operation.
#[derive(Default)]
pub struct FakeJira {
    pub projects: Vec<ProjectSummary>,
    pub issue_types: Vec<IssueTypeSummary>,
    pub epics: Vec<EpicSummary>,
    pub assignees: Vec<AssigneeSummary>,
    pub fields: Vec<FieldSchema>,
    pub created_key: String,
    pub delay: Option<Duration>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    calls: Mutex<Vec<&'static str>>,
    requests: Mutex<Vec<CreateIssueRequest>>,
}

impl FakeJira {
    pub fn new() -> Self {
        Self {
            created_key: "PROJ-1".to_string(),
            ..Self::default()
        }
    }

    /// Make every later call of `op` fail with `error`.
    pub fn fail(&self, op: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    /// Let `op` succeed again.
    pub fn recover(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CreateIssueRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JiraApi for FakeJira {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.enter("list_projects").await?;
        Ok(self.projects.clone())
    }

    async fn list_issue_types(&self, project_key: &str) -> Result<Vec<IssueTypeSummary>> {
        self.enter("list_issue_types").await?;
        Ok(self
            .issue_types
            .iter()
            .filter(|t| t.project_key == project_key)
            .cloned()
            .collect())
    }

    async fn search_epics(
        &self,
        _project_key: &str,
        filter: Option<&str>,
    ) -> Result<Vec<EpicSummary>> {
        self.enter("search_epics").await?;
        Ok(self
            .epics
            .iter()
            .filter(|e| filter.map_or(true, |f| e.summary.contains(f)))
            .cloned()
            .collect())
    }

    async fn search_assignable_users(
        &self,
        _project_key: &str,
        filter: Option<&str>,
    ) -> Result<Vec<AssigneeSummary>> {
        self.enter("search_assignable_users").await?;
        Ok(self
            .assignees
            .iter()
            .filter(|a| filter.map_or(true, |f| a.display_name.contains(f)))
            .cloned()
            .collect())
    }

    async fn create_field_schema(&self, _project_key: &str) -> Result<Vec<FieldSchema>> {
        self.enter("create_field_schema").await?;
        Ok(self.fields.clone())
    }

    async fn create_issue(&self, request: &CreateIssueRequest) -> Result<CreatedIssueResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.enter("create_issue").await?;
        Ok(CreatedIssueResponse {
            id: "10001".to_string(),
            key: self.created_key.clone(),
            self_url: None,
        })
    }
}

pub fn project(key: &str, name: &str) -> ProjectSummary {
    ProjectSummary {
        key: key.to_string(),
        name: name.to_string(),
        id: format!("id-{}", key),
    }
}

pub fn issue_type(id: &str, name: &str, project_key: &str) -> IssueTypeSummary {
    IssueTypeSummary {
        id: id.to_string(),
        name: name.to_string(),
        project_key: project_key.to_string(),
    }
}

pub fn epic(key: &str, summary: &str) -> EpicSummary {
    EpicSummary {
        key: key.to_string(),
        summary: summary.to_string(),
    }
}

pub fn assignee(account_id: &str, display_name: &str) -> AssigneeSummary {
    AssigneeSummary {
        account_id: account_id.to_string(),
        display_name: display_name.to_string(),
    }
}

pub fn field(id: &str, name: &str, custom_type: Option<&str>) -> FieldSchema {
    FieldSchema {
        id: id.to_string(),
        name: name.to_string(),
        custom_type: custom_type.map(str::to_string),
    }
}
