//! Form renderers.
//!
//! The binary drives the form through [`FormFrontend`] and never needs to know
//! which renderer is behind it. Renderers block on user input, so the driver
//! calls them from `spawn_blocking`.

pub mod prompt;
pub mod yad;

use crate::api::types::{AssigneeSummary, EpicSummary, IssueTypeSummary, ProjectSummary};
use crate::config::Backend;
use crate::create::{CreatedIssue, IssueDraft};
use crate::error::AppError;
use crate::session::FormSession;

pub use prompt::PromptFrontend;
pub use yad::YadFrontend;

/// Snapshot of everything a renderer shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormView {
    pub projects: Vec<ProjectSummary>,
    pub issue_types: Vec<IssueTypeSummary>,
    pub epics: Vec<EpicSummary>,
    pub assignees: Vec<AssigneeSummary>,
    /// The current draft; its values are preselected.
    pub draft: IssueDraft,
    /// Warnings about stale or missing data.
    pub notices: Vec<String>,
}

impl FormView {
    pub fn from_session(session: &FormSession) -> Self {
        Self {
            projects: session.projects().to_vec(),
            issue_types: session.issue_types().to_vec(),
            epics: session.epics().to_vec(),
            assignees: session.assignees().to_vec(),
            draft: session.draft().clone(),
            notices: session.notices().to_vec(),
        }
    }
}

/// A way of showing the form to the user.
pub trait FormFrontend: Send {
    /// Prepare or show the form for `view`.
    fn render_form(&mut self, view: &FormView) -> anyhow::Result<()>;

    /// Collect the user's input. `None` means the user cancelled.
    fn get_draft(&mut self) -> anyhow::Result<Option<IssueDraft>>;

    /// Tell the user how the submit went.
    fn report_result(&mut self, result: &Result<CreatedIssue, AppError>) -> anyhow::Result<()>;
}

/// The renderer for a configured backend.
pub fn for_backend(backend: Backend) -> Box<dyn FormFrontend> {
    match backend {
        Backend::Yad => Box::new(YadFrontend::new()),
        Backend::Prompt => Box::new(PromptFrontend::stdio()),
    }
}

/// Text shown for a failed submit.
pub(crate) fn describe_error(error: &AppError) -> String {
    let mut text = error.user_message();
    if let Some(action) = error.suggested_action() {
        text.push_str("\n\n");
        text.push_str(action);
    }
    text
}
