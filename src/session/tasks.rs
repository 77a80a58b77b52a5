//! Background loading for the form session.
//!
//! Loads run on spawned tokio tasks and report back through an unbounded
//! channel, so a renderer never waits on the network.
//!
//! # Architecture
//!
//! 1. The session asks the [`TaskSpawner`] for a load
//! 2. The spawner clones what the task needs and spawns it
//! 3. The task sends a [`SessionEvent`] when done
//! 4. The session applies the event, dropping it if its project generation
//!    is no longer current
//!
//! Every spawn returns its `JoinHandle` so the session can abort work that is
//! no longer wanted.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::catalog::{Catalog, Listing};
use crate::api::types::{AssigneeSummary, EpicSummary, IssueTypeSummary, ProjectSummary};
use crate::api::ApiError;
use crate::create::{CreateError, CreatedIssue, IssueCreator, IssueDraft};

/// Results sent from background tasks to the session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The project list.
    ProjectsLoaded(Result<Listing<ProjectSummary>, ApiError>),

    /// Issue types for the project selected at `generation`.
    IssueTypesLoaded {
        generation: u64,
        result: Result<Listing<IssueTypeSummary>, ApiError>,
    },

    /// Epics for the project selected at `generation`.
    EpicsLoaded {
        generation: u64,
        result: Result<Listing<EpicSummary>, ApiError>,
    },

    /// Assignees for the project selected at `generation`.
    AssigneesLoaded {
        generation: u64,
        result: Result<Listing<AssigneeSummary>, ApiError>,
    },

    /// Outcome of a submit.
    Submitted(Result<CreatedIssue, CreateError>),
}

impl SessionEvent {
    /// The project generation the event belongs to, if it is project scoped.
    pub fn generation(&self) -> Option<u64> {
        match self {
            SessionEvent::IssueTypesLoaded { generation, .. }
            | SessionEvent::EpicsLoaded { generation, .. }
            | SessionEvent::AssigneesLoaded { generation, .. } => Some(*generation),
            SessionEvent::ProjectsLoaded(_) | SessionEvent::Submitted(_) => None,
        }
    }
}

/// Spawns background tasks for the session.
#[derive(Clone)]
pub struct TaskSpawner {
    tx: mpsc::UnboundedSender<SessionEvent>,
    catalog: Catalog,
    creator: IssueCreator,
}

impl TaskSpawner {
    /// Create a new TaskSpawner with the given channel sender.
    pub fn new(
        tx: mpsc::UnboundedSender<SessionEvent>,
        catalog: Catalog,
        creator: IssueCreator,
    ) -> Self {
        Self {
            tx,
            catalog,
            creator,
        }
    }

    /// Spawn a task to load the project list.
    pub fn spawn_load_projects(&self) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let result = catalog.list_projects().await;
            let _ = tx.send(SessionEvent::ProjectsLoaded(result));
        })
    }

    /// Spawn a task to load a project's issue types.
    pub fn spawn_load_issue_types(&self, project_key: String, generation: u64) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let result = catalog.list_issue_types(&project_key).await;
            let _ = tx.send(SessionEvent::IssueTypesLoaded { generation, result });
        })
    }

    /// Spawn a task to load a project's epics.
    pub fn spawn_load_epics(&self, project_key: String, generation: u64) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let result = catalog.list_epics(&project_key, None).await;
            let _ = tx.send(SessionEvent::EpicsLoaded { generation, result });
        })
    }

    /// Spawn a task to load a project's assignable users.
    pub fn spawn_load_assignees(&self, project_key: String, generation: u64) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let result = catalog.list_assignees(&project_key, None).await;
            let _ = tx.send(SessionEvent::AssigneesLoaded { generation, result });
        })
    }

    /// Spawn a task to submit a draft.
    pub fn spawn_submit(&self, draft: IssueDraft) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let creator = self.creator.clone();
        tokio::spawn(async move {
            let result = creator.create(&draft).await;
            let _ = tx.send(SessionEvent::Submitted(result));
        })
    }
}

/// Create a new task channel and spawner.
///
/// Returns a tuple of (receiver, spawner). The receiver is drained by the
/// session, and the spawner is used to spawn tasks.
pub fn create_task_channel(
    catalog: Catalog,
    creator: IssueCreator,
) -> (mpsc::UnboundedReceiver<SessionEvent>, TaskSpawner) {
    let (tx, rx) = mpsc::unbounded_channel();
    (rx, TaskSpawner::new(tx, catalog, creator))
}
