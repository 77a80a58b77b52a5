//! Cached listings for the form's pickers.
//!
//! Every listing goes through the [`MetadataCache`]. When a refresh fails for
//! a transient reason and an expired copy is still around, the expired copy is
//! served and the [`Listing`] says so.

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::api::error::Result;
use crate::api::types::{AssigneeSummary, EpicSummary, IssueTypeSummary, ProjectSummary};
use crate::api::{ApiError, JiraApi};
use crate::cache::{CacheKey, MetadataCache};

/// How current a listing is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a valid cache entry or a fresh fetch.
    Current,
    /// Served from an expired entry because the refresh failed.
    Stale {
        /// When the served data was fetched (Unix seconds).
        fetched_at: u64,
        /// The refresh failure.
        error: ApiError,
    },
}

impl Freshness {
    /// Get the display icon for the freshness.
    pub fn icon(&self) -> &'static str {
        match self {
            Freshness::Current => "●",
            Freshness::Stale { .. } => "○",
        }
    }

    /// Get the display text for the freshness.
    pub fn text(&self) -> &'static str {
        match self {
            Freshness::Current => "Live",
            Freshness::Stale { .. } => "Offline",
        }
    }

    /// The line shown in the form for a stale listing of `what`.
    pub fn notice(&self, what: &str) -> Option<String> {
        match self {
            Freshness::Current => None,
            Freshness::Stale { error, .. } => Some(format!(
                "{} {}: showing cached {} ({})",
                self.icon(),
                self.text(),
                what,
                error
            )),
        }
    }
}

/// Items for a picker plus how current they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub freshness: Freshness,
}

impl<T> Listing<T> {
    pub fn current(items: Vec<T>) -> Self {
        Self {
            items,
            freshness: Freshness::Current,
        }
    }
}

/// Picker data source backed by the cache.
#[derive(Clone)]
pub struct Catalog {
    api: Arc<dyn JiraApi>,
    cache: Arc<MetadataCache>,
}

impl Catalog {
    pub fn new(api: Arc<dyn JiraApi>, cache: Arc<MetadataCache>) -> Self {
        Self { api, cache }
    }

    /// All projects.
    pub async fn list_projects(&self) -> Result<Listing<ProjectSummary>> {
        self.cached(CacheKey::projects(), || self.api.list_projects())
            .await
    }

    /// Issue types of a project.
    pub async fn list_issue_types(&self, project_key: &str) -> Result<Listing<IssueTypeSummary>> {
        self.cached(CacheKey::issue_types(project_key), || {
            self.api.list_issue_types(project_key)
        })
        .await
    }

    /// Epics of a project.
    ///
    /// A filter goes straight to JIRA; the unfiltered list is cached.
    pub async fn list_epics(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> Result<Listing<EpicSummary>> {
        let key = CacheKey::epics(project_key);
        match non_blank(filter) {
            None => {
                self.cached(key, || self.api.search_epics(project_key, None))
                    .await
            }
            Some(filter) => match self.api.search_epics(project_key, Some(filter)).await {
                Ok(items) => Ok(Listing::current(items)),
                Err(e) => self.stale_filtered(&key, e, |epic: &EpicSummary| {
                    contains_ignore_case(&epic.key, filter)
                        || contains_ignore_case(&epic.summary, filter)
                }),
            },
        }
    }

    /// Assignable users of a project.
    ///
    /// A filter goes straight to JIRA; the unfiltered list is cached.
    pub async fn list_assignees(
        &self,
        project_key: &str,
        filter: Option<&str>,
    ) -> Result<Listing<AssigneeSummary>> {
        let key = CacheKey::assignees(project_key);
        match non_blank(filter) {
            None => {
                self.cached(key, || {
                    self.api.search_assignable_users(project_key, None)
                })
                .await
            }
            Some(filter) => match self
                .api
                .search_assignable_users(project_key, Some(filter))
                .await
            {
                Ok(items) => Ok(Listing::current(items)),
                Err(e) => self.stale_filtered(&key, e, |user: &AssigneeSummary| {
                    contains_ignore_case(&user.display_name, filter)
                }),
            },
        }
    }

    async fn cached<T, F, Fut>(&self, key: CacheKey, load: F) -> Result<Listing<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        match self.cache.get(&key, load).await {
            Ok(items) => Ok(Listing::current(items)),
            Err(e) => self.stale_filtered(&key, e, |_: &T| true),
        }
    }

    /// Fall back to the expired slot for `key` if `error` allows it.
    fn stale_filtered<T, P>(&self, key: &CacheKey, error: ApiError, keep: P) -> Result<Listing<T>>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        if !error.allows_stale_fallback() {
            return Err(error);
        }
        match self.cache.get_stale::<Vec<T>>(key) {
            Some(entry) => {
                warn!("Serving stale {} after refresh failed: {}", key, error);
                Ok(Listing {
                    items: entry.value.into_iter().filter(|item| keep(item)).collect(),
                    freshness: Freshness::Stale {
                        fetched_at: entry.fetched_at,
                        error,
                    },
                })
            }
            None => Err(error),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
