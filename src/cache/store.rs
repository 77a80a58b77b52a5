//! On-disk persistence for the metadata cache.
//!
//! Each cache slot lives in its own JSON file at
//! `<cache_dir>/<kind>/<scope>.json`. Files carry their own key, so the file
//! name only needs to be unique and filesystem safe.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{CacheEntry, CacheKey, EntityKind, Scope};

/// File name used for globally scoped slots.
const GLOBAL_SCOPE_FILE: &str = "_global";

/// A cache slot as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The entity kind.
    pub kind: EntityKind,
    /// The project key, or `None` for global slots.
    pub scope: Option<String>,
    /// When the value was fetched (Unix seconds).
    pub fetched_at: u64,
    /// Time-to-live in seconds.
    pub ttl_secs: u64,
    /// The cached value.
    pub value: serde_json::Value,
}

impl StoredEntry {
    /// Build the on-disk form of a cache slot.
    pub fn new(key: &CacheKey, entry: &CacheEntry<serde_json::Value>) -> Self {
        Self {
            kind: key.kind,
            scope: match &key.scope {
                Scope::Global => None,
                Scope::Project(project) => Some(project.clone()),
            },
            fetched_at: entry.fetched_at,
            ttl_secs: entry.ttl.as_secs(),
            value: entry.value.clone(),
        }
    }

    /// Split back into key and entry.
    pub fn into_parts(self) -> (CacheKey, CacheEntry<serde_json::Value>) {
        let scope = match self.scope {
            Some(project) => Scope::Project(project),
            None => Scope::Global,
        };
        (
            CacheKey {
                kind: self.kind,
                scope,
            },
            CacheEntry {
                value: self.value,
                fetched_at: self.fetched_at,
                ttl: Duration::from_secs(self.ttl_secs),
            },
        )
    }
}

/// Directory-backed store for cache slots.
#[derive(Debug)]
pub struct CacheStore {
    /// Base directory for cache storage.
    dir: PathBuf,
    /// Serializes writers; a whole-file replace per slot needs nothing finer.
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Create a store rooted at `dir`. Nothing is touched until the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the file path for a slot.
    fn slot_path(&self, key: &CacheKey) -> PathBuf {
        let file = match &key.scope {
            Scope::Global => GLOBAL_SCOPE_FILE.to_string(),
            Scope::Project(project) => {
                project.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '.'], "_")
            }
        };
        self.dir
            .join(key.kind.dir_name())
            .join(format!("{}.json", file))
    }

    /// Read every slot on disk, expired ones included.
    ///
    /// Unreadable or corrupt files are removed.
    pub fn load_all(&self) -> Vec<StoredEntry> {
        if !self.dir.exists() {
            return Vec::new();
        }

        let mut loaded = Vec::new();
        for entry in walkdir::WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        {
            let path = entry.path();
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<StoredEntry>(&content).map_err(|e| e.to_string())
                });

            match parsed {
                Ok(stored) => {
                    trace!("Loaded cache slot {:?}", path);
                    loaded.push(stored);
                }
                Err(e) => {
                    debug!("Discarding unreadable cache file {:?}: {}", path, e);
                    let _ = fs::remove_file(path);
                }
            }
        }
        loaded
    }

    /// Write one slot, replacing the previous file.
    pub fn save(&self, stored: &StoredEntry, key: &CacheKey) -> io::Result<()> {
        let path = self.slot_path(key);
        let content = serde_json::to_string_pretty(stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        trace!("Cached data to {:?}", path);
        Ok(())
    }

    /// Remove one slot's file, if present.
    pub fn remove(&self, key: &CacheKey) -> io::Result<()> {
        let path = self.slot_path(key);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove every cached file.
    pub fn clear(&self) -> io::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
            debug!("Cleared cache directory {:?}", self.dir);
        }
        Ok(())
    }

    /// Count files and bytes on disk.
    pub fn usage(&self) -> (u64, u64) {
        let mut file_count = 0u64;
        let mut total_size = 0u64;
        if self.dir.exists() {
            for entry in walkdir::WalkDir::new(&self.dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                file_count += 1;
                match entry.metadata() {
                    Ok(metadata) => total_size += metadata.len(),
                    Err(e) => warn!("Failed to stat cache file {:?}: {}", entry.path(), e),
                }
            }
        }
        (file_count, total_size)
    }
}
