//! The form session.
//!
//! A [`FormSession`] holds the in-progress [`IssueDraft`] and the picker data
//! for the form, and is the only place the draft changes. It offers two ways
//! in: plain async calls ([`FormSession::list_epics`], [`FormSession::submit`],
//! ...) and background loads whose results arrive as [`SessionEvent`]s.
//!
//! Picking a project bumps the session's generation; results for an older
//! generation are dropped when applied.

mod catalog;
mod tasks;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::error::Result as ApiResult;
use crate::api::types::{AssigneeSummary, EpicSummary, IssueTypeSummary, ProjectSummary};
use crate::api::{ApiError, JiraApi};
use crate::cache::MetadataCache;
use crate::create::{CreateError, CreatedIssue, IssueCreator, IssueDraft};

pub use catalog::{Catalog, Freshness, Listing};
pub use tasks::{create_task_channel, SessionEvent, TaskSpawner};

/// State of one quick-create form.
pub struct FormSession {
    catalog: Catalog,
    creator: IssueCreator,
    spawner: TaskSpawner,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    draft: IssueDraft,
    generation: u64,
    projects: Vec<ProjectSummary>,
    issue_types: Vec<IssueTypeSummary>,
    epics: Vec<EpicSummary>,
    assignees: Vec<AssigneeSummary>,
    /// Messages for the user about degraded or failed loads.
    notices: Vec<String>,
    last_error: Option<ApiError>,
    loading_projects: bool,
    /// Project-scoped loads still outstanding for the current generation.
    pending_metadata: usize,
    /// Handles of tasks belonging to the current generation.
    metadata_tasks: Vec<JoinHandle<()>>,
    /// Handles of everything else.
    tasks: Vec<JoinHandle<()>>,
    outcome: Option<Result<CreatedIssue, CreateError>>,
    submitting: bool,
}

impl FormSession {
    /// Create a session with an empty draft.
    pub fn new(api: Arc<dyn JiraApi>, cache: Arc<MetadataCache>, base_url: &str) -> Self {
        let catalog = Catalog::new(api.clone(), cache.clone());
        let creator = IssueCreator::new(api, cache, base_url);
        let (rx, spawner) = create_task_channel(catalog.clone(), creator.clone());
        Self {
            catalog,
            creator,
            spawner,
            rx,
            draft: IssueDraft::default(),
            generation: 0,
            projects: Vec::new(),
            issue_types: Vec::new(),
            epics: Vec::new(),
            assignees: Vec::new(),
            notices: Vec::new(),
            last_error: None,
            loading_projects: false,
            pending_metadata: 0,
            metadata_tasks: Vec::new(),
            tasks: Vec::new(),
            outcome: None,
            submitting: false,
        }
    }

    // Direct calls

    /// All projects.
    pub async fn list_projects(&self) -> ApiResult<Listing<ProjectSummary>> {
        self.catalog.list_projects().await
    }

    /// Issue types of a project.
    pub async fn list_issue_types(&self, project_key: &str) -> ApiResult<Listing<IssueTypeSummary>> {
        self.catalog.list_issue_types(project_key).await
    }

    /// Epics of a project, optionally filtered by text.
    pub async fn list_epics(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> ApiResult<Listing<EpicSummary>> {
        self.catalog.list_epics(project_key, filter).await
    }

    /// Assignable users of a project, optionally filtered by name.
    pub async fn list_assignees(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> ApiResult<Listing<AssigneeSummary>> {
        self.catalog.list_assignees(project_key, filter).await
    }

    /// Submit the current draft and wait for the outcome.
    pub async fn submit(&self) -> Result<CreatedIssue, CreateError> {
        self.creator.create(&self.draft).await
    }

    // Draft

    pub fn draft(&self) -> &IssueDraft {
        &self.draft
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.draft.summary = summary.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
    }

    pub fn set_issue_type(&mut self, issue_type_id: impl Into<String>) {
        self.draft.issue_type_id = issue_type_id.into();
    }

    pub fn set_epic(&mut self, epic_key: Option<String>) {
        self.draft.epic_key = epic_key;
    }

    pub fn set_assignee(&mut self, account_id: Option<String>) {
        self.draft.assignee_id = account_id;
    }

    /// Take over a draft edited by a frontend.
    ///
    /// Returns `true` if the project changed, in which case the new project
    /// is selected and its metadata is loading; only the summary and
    /// description of `draft` carry over.
    pub fn update_draft(&mut self, draft: IssueDraft) -> bool {
        let project_changed = !draft
            .project_key
            .trim()
            .eq_ignore_ascii_case(self.draft.project_key.trim());
        if project_changed {
            self.select_project(&draft.project_key);
            self.draft.summary = draft.summary;
            self.draft.description = draft.description;
        } else {
            self.draft = IssueDraft {
                project_key: self.draft.project_key.clone(),
                ..draft
            };
        }
        project_changed
    }

    // Background loads

    /// Start loading the project list.
    pub fn load_projects(&mut self) {
        self.loading_projects = true;
        self.track(self.spawner.spawn_load_projects());
    }

    /// Switch the form to `project_key` and start loading its metadata.
    ///
    /// Clears the project-specific parts of the draft. Returns the new
    /// generation.
    pub fn select_project(&mut self, project_key: &str) -> u64 {
        let project_key = project_key.trim().to_uppercase();
        for handle in self.metadata_tasks.drain(..) {
            handle.abort();
        }

        self.generation += 1;
        info!("Selected project {} (generation {})", project_key, self.generation);
        self.draft.project_key = project_key.clone();
        self.draft.issue_type_id.clear();
        self.draft.epic_key = None;
        self.draft.assignee_id = None;
        self.issue_types.clear();
        self.epics.clear();
        self.assignees.clear();

        if project_key.is_empty() {
            self.pending_metadata = 0;
            return self.generation;
        }

        let generation = self.generation;
        self.metadata_tasks = vec![
            self.spawner
                .spawn_load_issue_types(project_key.clone(), generation),
            self.spawner.spawn_load_epics(project_key.clone(), generation),
            self.spawner.spawn_load_assignees(project_key, generation),
        ];
        self.pending_metadata = self.metadata_tasks.len();
        generation
    }

    /// Submit the current draft in the background.
    ///
    /// The outcome arrives as [`SessionEvent::Submitted`].
    pub fn start_submit(&mut self) {
        self.submitting = true;
        self.outcome = None;
        self.track(self.spawner.spawn_submit(self.draft.clone()));
    }

    /// Wait for the next background result.
    ///
    /// Returns `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Apply a background result. Returns `false` if it was stale and dropped.
    pub fn apply_event(&mut self, event: SessionEvent) -> bool {
        if let Some(generation) = event.generation() {
            if generation != self.generation {
                debug!(
                    "Dropping result for generation {} (current {})",
                    generation, self.generation
                );
                return false;
            }
        }

        match event {
            SessionEvent::ProjectsLoaded(result) => {
                self.loading_projects = false;
                if let Some(items) = self.accept(result, "projects") {
                    self.projects = items;
                }
            }
            SessionEvent::IssueTypesLoaded { result, .. } => {
                self.metadata_done();
                if let Some(items) = self.accept(result, "issue types") {
                    if !items.iter().any(|t| t.id == self.draft.issue_type_id) {
                        self.draft.issue_type_id =
                            items.first().map(|t| t.id.clone()).unwrap_or_default();
                    }
                    self.issue_types = items;
                }
            }
            SessionEvent::EpicsLoaded { result, .. } => {
                self.metadata_done();
                if let Some(items) = self.accept(result, "epics") {
                    self.epics = items;
                }
            }
            SessionEvent::AssigneesLoaded { result, .. } => {
                self.metadata_done();
                if let Some(items) = self.accept(result, "assignees") {
                    self.assignees = items;
                }
            }
            SessionEvent::Submitted(result) => {
                self.submitting = false;
                self.outcome = Some(result);
            }
        }
        true
    }

    /// Apply results until no background load is outstanding.
    pub async fn wait_until_loaded(&mut self) {
        while self.is_loading() {
            match self.next_event().await {
                Some(event) => {
                    self.apply_event(event);
                }
                None => break,
            }
        }
    }

    /// Wait for a background submit to finish.
    pub async fn wait_for_outcome(&mut self) -> Option<Result<CreatedIssue, CreateError>> {
        while self.submitting {
            match self.next_event().await {
                Some(event) => {
                    self.apply_event(event);
                }
                None => break,
            }
        }
        self.outcome.take()
    }

    /// Stop all background work. Later results are discarded.
    pub fn close(&mut self) {
        for handle in self.metadata_tasks.iter().chain(self.tasks.iter()) {
            handle.abort();
        }
        self.rx.close();
        self.loading_projects = false;
        self.pending_metadata = 0;
        self.submitting = false;
    }

    // Accessors

    /// Whether any picker data is still loading.
    pub fn is_loading(&self) -> bool {
        self.loading_projects || self.pending_metadata > 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn projects(&self) -> &[ProjectSummary] {
        &self.projects
    }

    pub fn issue_types(&self) -> &[IssueTypeSummary] {
        &self.issue_types
    }

    pub fn epics(&self) -> &[EpicSummary] {
        &self.epics
    }

    pub fn assignees(&self) -> &[AssigneeSummary] {
        &self.assignees
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// The most recent load failure.
    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// Whether a load failed in a way the form cannot recover from.
    pub fn has_fatal_error(&self) -> bool {
        self.last_error.as_ref().is_some_and(ApiError::is_auth)
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|h| !h.is_finished());
        self.tasks.push(handle);
    }

    fn metadata_done(&mut self) {
        self.pending_metadata = self.pending_metadata.saturating_sub(1);
    }

    /// Unwrap a listing, recording notices for stale data and failures.
    fn accept<T>(&mut self, result: ApiResult<Listing<T>>, what: &str) -> Option<Vec<T>> {
        match result {
            Ok(listing) => {
                if let Some(notice) = listing.freshness.notice(what) {
                    self.notices.push(notice);
                }
                Some(listing.items)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", what, e);
                self.notices.push(format!("Could not load {}: {}", what, e));
                self.last_error = Some(e);
                None
            }
        }
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        for handle in self.metadata_tasks.iter().chain(self.tasks.iter()) {
            handle.abort();
        }
    }
}
