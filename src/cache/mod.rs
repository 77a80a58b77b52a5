//! Metadata caching for the issue form.
//!
//! This module keeps projects, issue types, epics, assignees and resolved
//! epic-link fields in memory with a fixed time-to-live per entity kind, and
//! mirrors every slot to disk so a fresh launcher invocation starts warm.
//! Features include:
//! - Independent TTLs per entity kind
//! - A single outstanding load per key, shared by concurrent callers
//! - Expired entries kept around so callers can fall back to them

mod store;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::api::ApiError;

pub use store::{CacheStore, StoredEntry};

/// The kinds of metadata the cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The project list.
    Project,
    /// A project's issue types.
    IssueType,
    /// A project's epics.
    Epic,
    /// A project's assignable users.
    Assignee,
    /// A project's resolved epic-link custom field.
    EpicLinkField,
}

impl EntityKind {
    /// Time-to-live for entries of this kind.
    pub fn ttl(&self) -> Duration {
        match self {
            EntityKind::Project | EntityKind::IssueType | EntityKind::EpicLinkField => {
                Duration::from_secs(24 * 60 * 60)
            }
            EntityKind::Epic | EntityKind::Assignee => Duration::from_secs(10 * 60),
        }
    }

    /// Directory name used on disk.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::IssueType => "issue_types",
            EntityKind::Epic => "epics",
            EntityKind::Assignee => "assignees",
            EntityKind::EpicLinkField => "epic_link_fields",
        }
    }
}

/// Which slice of an entity kind a slot holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Not tied to a project.
    Global,
    /// Tied to the project with this key.
    Project(String),
}

/// Identifies one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The entity kind.
    pub kind: EntityKind,
    /// The scope within the kind.
    pub scope: Scope,
}

impl CacheKey {
    /// The project list.
    pub fn projects() -> Self {
        Self {
            kind: EntityKind::Project,
            scope: Scope::Global,
        }
    }

    /// A project's issue types.
    pub fn issue_types(project_key: &str) -> Self {
        Self::scoped(EntityKind::IssueType, project_key)
    }

    /// A project's epics.
    pub fn epics(project_key: &str) -> Self {
        Self::scoped(EntityKind::Epic, project_key)
    }

    /// A project's assignable users.
    pub fn assignees(project_key: &str) -> Self {
        Self::scoped(EntityKind::Assignee, project_key)
    }

    /// A project's epic-link field.
    pub fn epic_link_field(project_key: &str) -> Self {
        Self::scoped(EntityKind::EpicLinkField, project_key)
    }

    fn scoped(kind: EntityKind, project_key: &str) -> Self {
        Self {
            kind,
            scope: Scope::Project(project_key.to_string()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global => write!(f, "{}", self.kind.dir_name()),
            Scope::Project(project) => write!(f, "{}/{}", self.kind.dir_name(), project),
        }
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// A cached value with the time it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached data.
    pub value: T,
    /// When the value was fetched (Unix seconds).
    pub fetched_at: u64,
    /// How long the value stays valid.
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create an entry fetched now.
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: now_secs(),
            ttl,
        }
    }

    /// Whether the entry is still within its TTL.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    /// Whether the entry is within its TTL at `now` (Unix seconds).
    pub fn is_valid_at(&self, now: u64) -> bool {
        now.saturating_sub(self.fetched_at) < self.ttl.as_secs()
    }

    /// Get the age of the entry.
    pub fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.fetched_at))
    }
}

/// Summary of one slot, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// The slot key.
    pub key: CacheKey,
    /// When the value was fetched (Unix seconds).
    pub fetched_at: u64,
    /// The slot's TTL.
    pub ttl: Duration,
    /// Whether the slot is still valid.
    pub valid: bool,
}

type Flight = Arc<OnceCell<Result<serde_json::Value, ApiError>>>;

/// Cache of form metadata with per-kind TTLs.
///
/// Construct one per process, share it by `Arc`, and call [`persist`] on the
/// way out.
///
/// [`persist`]: MetadataCache::persist
pub struct MetadataCache {
    /// Slots by key; values are kept as JSON so one map serves every kind.
    entries: RwLock<HashMap<CacheKey, CacheEntry<serde_json::Value>>>,
    /// Loads in progress, one per key.
    in_flight: Mutex<HashMap<CacheKey, Flight>>,
    /// Disk mirror, absent for purely in-memory caches.
    store: Option<CacheStore>,
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// Create a cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Open a cache mirrored to `dir`, loading whatever is already there.
    ///
    /// Expired slots are loaded too; [`get`](Self::get) treats them as misses.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let store = CacheStore::new(dir);
        let mut entries = HashMap::new();
        for stored in store.load_all() {
            let (key, entry) = stored.into_parts();
            entries.insert(key, entry);
        }
        debug!("Loaded {} cache slots from {:?}", entries.len(), store.dir());

        Self {
            entries: RwLock::new(entries),
            in_flight: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// The platform cache directory for this application.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("jira-quick-create"))
    }

    /// The directory the cache is mirrored to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.store.as_ref().map(CacheStore::dir)
    }

    /// Get a value, running `loader` if the slot is missing or expired.
    ///
    /// Concurrent callers for the same key share one `loader` run and all
    /// receive its result. On failure the previous entry is left untouched
    /// and the error is returned.
    pub async fn get<T, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(value) = self.valid_value(key) {
            match serde_json::from_value::<T>(value) {
                Ok(decoded) => {
                    trace!("Cache hit for {}", key);
                    return Ok(decoded);
                }
                Err(e) => debug!("Cached {} has an unexpected shape: {}", key, e),
            }
        }

        let value = self.load_shared::<T, F, Fut>(key, loader).await?;
        serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Join the in-flight load for `key`, starting it if there is none.
    ///
    /// The slot is checked again once the flight is joined: a load that
    /// finished between the caller's lookup and the join has already stored
    /// a fresh value, and `loader` must not run a second time.
    async fn load_shared<T, F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
    ) -> Result<serde_json::Value, ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let flight = self.join_flight(key);
        let result = flight
            .get_or_init(|| async {
                if let Some(value) = self.valid_value(key) {
                    if T::deserialize(&value).is_ok() {
                        trace!("{} was refreshed by another load", key);
                        return Ok(value);
                    }
                }
                debug!("Cache miss for {}, loading", key);
                let loaded = loader().await?;
                let value = serde_json::to_value(&loaded)
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
                self.store_value(key, value.clone());
                Ok::<_, ApiError>(value)
            })
            .await
            .clone();
        self.leave_flight(key, &flight);
        result
    }

    /// Read a slot regardless of its TTL.
    ///
    /// Used to fall back to an expired value after a failed refresh.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        let value = serde_json::from_value(entry.value.clone()).ok()?;
        Some(CacheEntry {
            value,
            fetched_at: entry.fetched_at,
            ttl: entry.ttl,
        })
    }

    /// Drop one slot from memory and disk.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key) {
                warn!("Failed to remove cache file for {}: {}", key, e);
            }
        }
    }

    /// Drop every slot from memory and disk.
    pub fn clear(&self) -> std::io::Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        match &self.store {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }

    /// Describe every slot, sorted by key.
    pub fn entries(&self) -> Vec<SlotInfo> {
        let now = now_secs();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut slots: Vec<SlotInfo> = entries
            .iter()
            .map(|(key, entry)| SlotInfo {
                key: key.clone(),
                fetched_at: entry.fetched_at,
                ttl: entry.ttl,
                valid: entry.is_valid_at(now),
            })
            .collect();
        slots.sort_by_key(|slot| slot.key.to_string());
        slots
    }

    /// Files and bytes used on disk.
    pub fn disk_usage(&self) -> (u64, u64) {
        self.store.as_ref().map(CacheStore::usage).unwrap_or((0, 0))
    }

    /// Write every slot to disk.
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        for (key, entry) in entries.iter() {
            if let Err(e) = store.save(&StoredEntry::new(key, entry), key) {
                warn!("Failed to persist cache slot {}: {}", key, e);
            }
        }
        debug!("Persisted {} cache slots", entries.len());
    }

    /// The slot's value if it is within its TTL.
    fn valid_value(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.value.clone())
    }

    /// Get or start the load for `key`.
    fn join_flight(&self, key: &CacheKey) -> Flight {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key.clone()).or_default().clone()
    }

    /// Retire a finished load so the next miss starts a new one.
    fn leave_flight(&self, key: &CacheKey, flight: &Flight) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            in_flight.remove(key);
        }
    }

    /// Replace a slot with a freshly fetched value and mirror it to disk.
    fn store_value(&self, key: &CacheKey, value: serde_json::Value) {
        let entry = CacheEntry::new(value, key.kind.ttl());
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&StoredEntry::new(key, &entry), key) {
                warn!("Failed to write cache slot {}: {}", key, e);
            }
        }
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), entry);
    }

    /// Backdate a slot so it reads as expired.
    #[cfg(test)]
    pub(crate) fn expire_for_test(&self, key: &CacheKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(key) {
            entry.fetched_at = now_secs().saturating_sub(entry.ttl.as_secs() + 1);
        }
    }

    #[cfg(test)]
    fn insert_entry(&self, key: CacheKey, entry: CacheEntry<serde_json::Value>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn expired_entry(value: serde_json::Value, kind: EntityKind) -> CacheEntry<serde_json::Value> {
        let ttl = kind.ttl();
        CacheEntry {
            value,
            fetched_at: now_secs() - ttl.as_secs() - 5,
            ttl,
        }
    }

    #[test]
    fn test_ttl_table() {
        let day = Duration::from_secs(86_400);
        let ten_minutes = Duration::from_secs(600);
        assert_eq!(EntityKind::Project.ttl(), day);
        assert_eq!(EntityKind::IssueType.ttl(), day);
        assert_eq!(EntityKind::Epic.ttl(), ten_minutes);
        assert_eq!(EntityKind::Assignee.ttl(), ten_minutes);
        assert_eq!(EntityKind::EpicLinkField.ttl(), day);
    }

    #[test]
    fn test_cache_entry_validity_boundary() {
        let entry = CacheEntry {
            value: (),
            fetched_at: 1_000,
            ttl: Duration::from_secs(60),
        };
        assert!(entry.is_valid_at(1_000));
        assert!(entry.is_valid_at(1_059));
        assert!(!entry.is_valid_at(1_060));
    }

    #[test]
    fn test_cache_entry_new_is_valid() {
        let entry = CacheEntry::new("data", Duration::from_secs(60));
        assert!(entry.is_valid());
        assert!(entry.age() < Duration::from_secs(2));
    }

    #[test]
    fn test_cache_key_display() {
        assert_eq!(CacheKey::projects().to_string(), "projects");
        assert_eq!(CacheKey::epics("PROJ").to_string(), "epics/PROJ");
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_loader() {
        let cache = MetadataCache::in_memory();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let key = CacheKey::projects();

        let load = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(names(&["ABC", "PROJ"]))
        };
        let first: Vec<String> = cache.get(&key, load).await.unwrap();
        let second: Vec<String> = cache
            .get(&key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(names(&["changed"]))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_entry_is_reloaded_once() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::epics("PROJ");
        cache.insert_entry(
            key.clone(),
            expired_entry(serde_json::json!(["old"]), EntityKind::Epic),
        );
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let value: Vec<String> = cache
            .get(&key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(names(&["new"]))
            })
            .await
            .unwrap();

        assert_eq!(value, names(&["new"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get_stale::<Vec<String>>(&key).unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::assignees("PROJ");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let loader = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(names(&["Anna"]))
        };
        let (a, b, c) = tokio::join!(
            cache.get::<Vec<String>, _, _>(&key, loader),
            cache.get::<Vec<String>, _, _>(&key, loader),
            cache.get::<Vec<String>, _, _>(&key, loader),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), names(&["Anna"]));
        assert_eq!(b.unwrap(), names(&["Anna"]));
        assert_eq!(c.unwrap(), names(&["Anna"]));
    }

    #[tokio::test]
    async fn test_concurrent_failure_is_shared() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::issue_types("PROJ");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let loader = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<Vec<String>, _>(ApiError::Transport("connection reset".to_string()))
        };
        let (a, b) = tokio::join!(cache.get(&key, loader), cache.get(&key, loader));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(a, Err(ApiError::Transport(_))));
        assert!(matches!(b, Err(ApiError::Transport(_))));

        // The failed flight is retired, so the next call tries again.
        let retried: Vec<String> = cache
            .get(&key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(names(&["Bug"]))
            })
            .await
            .unwrap();
        assert_eq!(retried, names(&["Bug"]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slot_filled_before_join_skips_loader() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::assignees("PROJ");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        // Another caller finished its load after this one saw a miss.
        cache.store_value(&key, serde_json::json!(["Anna"]));
        let value = cache
            .load_shared::<Vec<String>, _, _>(&key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(names(&["Bruno"]))
            })
            .await
            .unwrap();

        assert_eq!(value, serde_json::json!(["Anna"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_misshapen_slot_is_reloaded_after_join() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::epic_link_field("PROJ");
        cache.store_value(&key, serde_json::json!({"unexpected": true}));

        let value: Vec<String> = cache
            .get(&key, || async { Ok(names(&["reloaded"])) })
            .await
            .unwrap();
        assert_eq!(value, names(&["reloaded"]));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_old_entry() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::epics("PROJ");
        let old = expired_entry(serde_json::json!(["PROJ-1"]), EntityKind::Epic);
        let old_fetched_at = old.fetched_at;
        cache.insert_entry(key.clone(), old);

        let result: Result<Vec<String>, _> = cache
            .get(&key, || async { Err(ApiError::Unauthorized) })
            .await;
        assert_eq!(result.unwrap_err(), ApiError::Unauthorized);

        let stale = cache.get_stale::<Vec<String>>(&key).unwrap();
        assert_eq!(stale.value, names(&["PROJ-1"]));
        assert_eq!(stale.fetched_at, old_fetched_at);
        assert!(!stale.is_valid());
    }

    #[tokio::test]
    async fn test_empty_result_is_cached() {
        let cache = MetadataCache::in_memory();
        let key = CacheKey::epics("EMPTY");
        assert!(cache.get_stale::<Vec<String>>(&key).is_none());

        let first: Vec<String> = cache.get(&key, || async { Ok(Vec::new()) }).await.unwrap();
        assert!(first.is_empty());

        let second: Vec<String> = cache
            .get(&key, || async { Err(ApiError::Transport("reloaded".to_string())) })
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let key = CacheKey::projects();
        {
            let cache = MetadataCache::open(dir.path());
            let _: Vec<String> = cache
                .get(&key, || async { Ok(names(&["PROJ"])) })
                .await
                .unwrap();
            cache.persist();
        }

        let reopened = MetadataCache::open(dir.path());
        let value: Vec<String> = reopened
            .get(&key, || async { Err(ApiError::Transport("reloaded".to_string())) })
            .await
            .unwrap();
        assert_eq!(value, names(&["PROJ"]));
    }

    #[tokio::test]
    async fn test_expired_entries_on_disk_are_misses() {
        let dir = tempdir().unwrap();
        let key = CacheKey::assignees("PROJ");
        {
            let cache = MetadataCache::open(dir.path());
            cache.insert_entry(
                key.clone(),
                expired_entry(serde_json::json!(["old"]), EntityKind::Assignee),
            );
            cache.persist();
        }

        let reopened = MetadataCache::open(dir.path());
        let slots = reopened.entries();
        assert_eq!(slots.len(), 1);
        assert!(!slots[0].valid);

        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value: Vec<String> = reopened
            .get(&key, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(names(&["new"]))
            })
            .await
            .unwrap();
        assert_eq!(value, names(&["new"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let dir = tempdir().unwrap();
        let cache = MetadataCache::open(dir.path().join("cache"));
        let _: Vec<String> = cache
            .get(&CacheKey::epics("A"), || async { Ok(names(&["A-1"])) })
            .await
            .unwrap();
        let _: Vec<String> = cache
            .get(&CacheKey::epics("B"), || async { Ok(names(&["B-1"])) })
            .await
            .unwrap();
        assert_eq!(cache.disk_usage().0, 2);

        cache.invalidate(&CacheKey::epics("A"));
        assert_eq!(cache.entries().len(), 1);
        assert_eq!(cache.disk_usage().0, 1);

        cache.clear().unwrap();
        assert!(cache.entries().is_empty());
        assert_eq!(cache.disk_usage(), (0, 0));
    }
}
