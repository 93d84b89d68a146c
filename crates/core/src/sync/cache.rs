//! One-shot snapshot cache for display windows that start after the last SYNC.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PidsError;

use super::message::Snapshot;

/// Storage for the most recent published snapshot. `take` consumes it.
pub trait SnapshotStore: Send + Sync {
    fn store(&self, snapshot: &Snapshot) -> Result<(), PidsError>;
    fn take(&self) -> Result<Option<Snapshot>, PidsError>;
}

/// On-disk form of the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub snapshot: Snapshot,
    pub written_at: DateTime<Utc>,
}

/// Cache file location inside `root`.
pub fn cache_path(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join("last-sync.json")
}

/// JSON file cache shared by every window of the process.
pub struct FileSnapshotCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Cache at the default file name inside `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self::new(cache_path(root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents without consuming them.
    pub fn peek(&self) -> Result<Option<CachedSnapshot>, PidsError> {
        let _guard = self.lock.lock();
        self.read()
    }

    fn read(&self) -> Result<Option<CachedSnapshot>, PidsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        match serde_json::from_str(&contents) {
            Ok(cached) => Ok(Some(cached)),
            Err(err) => {
                warn!(path = %self.path.display(), "discarding unreadable snapshot cache: {err}");
                Ok(None)
            }
        }
    }

    fn io_error(&self, source: io::Error) -> PidsError {
        PidsError::Cache {
            path: self.path.clone(),
            source,
        }
    }
}

impl SnapshotStore for FileSnapshotCache {
    fn store(&self, snapshot: &Snapshot) -> Result<(), PidsError> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let cached = CachedSnapshot {
            snapshot: snapshot.clone(),
            written_at: Utc::now(),
        };
        let serialized = serde_json::to_string_pretty(&cached)?;
        fs::write(&self.path, serialized).map_err(|source| self.io_error(source))
    }

    fn take(&self) -> Result<Option<Snapshot>, PidsError> {
        let _guard = self.lock.lock();
        let cached = self.read()?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(self.io_error(source)),
        }
        if let Some(cached) = &cached {
            debug!(written_at = %cached.written_at, "restored cached snapshot");
        }
        Ok(cached.map(|cached| cached.snapshot))
    }
}

/// Process-local cache.
#[derive(Default)]
pub struct MemorySnapshotCache {
    slot: Mutex<Option<Snapshot>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotCache {
    fn store(&self, snapshot: &Snapshot) -> Result<(), PidsError> {
        *self.slot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn take(&self) -> Result<Option<Snapshot>, PidsError> {
        Ok(self.slot.lock().take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineData, RouteState, RunState, Station};

    fn snapshot() -> Snapshot {
        Snapshot {
            line: LineData {
                stations: vec![Station::new("西直门", "Xizhimen"), Station::new("积水潭", "Jishuitan")],
                ..LineData::default()
            },
            route: RouteState::new(1, RunState::Running),
        }
    }

    #[test]
    fn file_cache_is_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::in_dir(dir.path().join("nested"));
        assert!(cache.take().unwrap().is_none());

        cache.store(&snapshot()).unwrap();
        assert!(cache.peek().unwrap().is_some());
        assert_eq!(cache.take().unwrap(), Some(snapshot()));
        assert!(cache.take().unwrap().is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn corrupt_cache_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::in_dir(dir.path());
        fs::write(cache.path(), "{not json").unwrap();
        assert!(cache.take().unwrap().is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn memory_cache_is_consumed_once() {
        let cache = MemorySnapshotCache::new();
        cache.store(&snapshot()).unwrap();
        assert!(cache.take().unwrap().is_some());
        assert!(cache.take().unwrap().is_none());
    }
}
