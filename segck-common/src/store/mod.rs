//! Annotation store
//!
//! Owns the loaded segments, the annotation map and the lock table.
//!
//! # Mutex discipline
//!
//! Two independent read/write mutexes:
//! - `data` guards segments, annotations and annotation file writes.
//!   Navigation and stats read; save writes.
//! - the [`LockManager`]'s own mutex guards the lock table.
//!
//! They are never held at the same time. Code that needs both copies the lock
//! table first ([`LockManager::snapshot`]), drops it, then takes `data`.
//! Claims made after a selection go through [`LockManager::lock`], which is
//! the single point deciding who gets a segment.

pub mod loader;
pub mod locks;
pub mod navigator;
pub mod persist;
pub mod stats;

pub use loader::{LoadedData, ProjectDirs};
pub use locks::LockManager;
pub use navigator::Navigator;
pub use stats::Stats;

use crate::model::{Annotation, Query, Segment};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct StoreData {
    /// Traversal order, fixed at load
    segments: Vec<Segment>,
    /// Segment id -> position in `segments`
    positions: HashMap<String, usize>,
    /// Persisted annotations by id
    annotations: HashMap<String, Annotation>,
}

/// Authoritative in-memory view of a project plus its lock table
#[derive(Debug)]
pub struct SegmentStore {
    annotation_dir: PathBuf,
    data: RwLock<StoreData>,
    locks: LockManager,
}

impl SegmentStore {
    /// Load `project_dir` (see [`loader::load`]). Any load error is fatal.
    pub fn open(project_dir: impl AsRef<Path>) -> Result<Self> {
        let dirs = ProjectDirs::new(project_dir.as_ref());
        let loaded = loader::load(&dirs)?;
        Ok(Self::from_loaded(dirs.annotation, loaded))
    }

    /// Build a store from already loaded data that writes to `annotation_dir`
    pub fn from_loaded(annotation_dir: impl Into<PathBuf>, loaded: LoadedData) -> Self {
        let positions = loaded
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            annotation_dir: annotation_dir.into(),
            data: RwLock::new(StoreData {
                segments: loaded.segments,
                positions,
                annotations: loaded.annotations,
            }),
            locks: LockManager::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn annotation_dir(&self) -> &Path {
        &self.annotation_dir
    }

    pub fn segment_count(&self) -> usize {
        self.read().segments.len()
    }

    /// Persisted annotation for `id`, or a default unchecked annotation that
    /// is not written anywhere. The returned annotation carries its 1-based
    /// index.
    pub fn get(&self, id: &str) -> Result<Annotation> {
        let data = self.read();
        let position = *data
            .positions
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(Self::annotation_at(&data, position))
    }

    /// Persisted annotation for `id`, if there is one
    pub fn annotation(&self, id: &str) -> Option<Annotation> {
        self.read().annotations.get(id).cloned()
    }

    fn annotation_at(data: &StoreData, position: usize) -> Annotation {
        let segment = &data.segments[position];
        let mut annotation = data
            .annotations
            .get(&segment.id)
            .cloned()
            .unwrap_or_else(|| Annotation::from_segment(segment.clone()));
        annotation.index = Some(position + 1);
        annotation
    }

    /// Segments nobody has annotated yet, in traversal order
    pub fn list_unchecked(&self) -> Vec<Segment> {
        let data = self.read();
        data.segments
            .iter()
            .filter(|s| !data.annotations.contains_key(&s.id))
            .cloned()
            .collect()
    }

    /// Select the segment `query` asks for.
    ///
    /// With `lock_for_user` the selection is claimed for `query.user_name`.
    /// A walk that loses a race for its pick to another claimant walks again
    /// with the fresh lock table. An absolute jump onto a held segment fails
    /// with [`Error::AlreadyLocked`].
    ///
    /// `Ok(None)` means no segment matched.
    pub fn next_segment(&self, query: &Query, lock_for_user: bool) -> Result<Option<Annotation>> {
        if lock_for_user && query.user_name.is_empty() {
            return Err(Error::InvalidInput("no user name".to_string()));
        }
        let jump = query.request_index()?.is_some();

        let attempts = self.segment_count() + 1;
        for _ in 0..attempts {
            let locked = self.locks.snapshot();
            let selected = {
                let data = self.read();
                Navigator::new(&data.segments, &data.positions, &data.annotations)
                    .find(query, |id| locked.contains_key(id))?
                    .map(|position| Self::annotation_at(&data, position))
            };

            let Some(annotation) = selected else {
                debug!(user = %query.user_name, "No matching segment");
                return Ok(None);
            };
            if !lock_for_user {
                return Ok(Some(annotation));
            }

            match self.locks.lock(annotation.id(), &query.user_name) {
                Ok(()) => return Ok(Some(annotation)),
                Err(e @ Error::AlreadyLocked { .. }) if jump => return Err(e),
                Err(Error::AlreadyLocked { id, by }) => {
                    debug!(segment_id = %id, holder = %by, "Lost race for segment, walking again");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Internal(format!(
            "no claimable segment found after {} attempts",
            attempts
        )))
    }

    /// Store a new version of an annotation.
    ///
    /// The stored history is authoritative: the previous current status is
    /// appended to it (unless it was the untouched default) and any history
    /// sent by the client is ignored. The in-memory map is updated before the
    /// file write and is kept when the write fails; the error is returned and
    /// disk stays authoritative across restarts.
    pub fn save(&self, mut annotation: Annotation) -> Result<Annotation> {
        let id = annotation.id().to_string();
        if id.is_empty() {
            return Err(Error::InvalidInput("no id".to_string()));
        }
        annotation.validate().map_err(Error::InvalidInput)?;

        let mut data = self.write();
        let position = *data
            .positions
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        annotation
            .matches_segment(&data.segments[position])
            .map_err(Error::InvalidInput)?;

        let (mut history, previous) = match data.annotations.get(&id) {
            Some(prev) => (prev.status_history.clone(), Some(prev.current_status.clone())),
            None => (Vec::new(), None),
        };
        if let Some(previous) = previous.filter(|s| !s.is_default()) {
            history.push(previous);
        }
        annotation.status_history = history;
        annotation.index = None;

        data.annotations.insert(id.clone(), annotation.clone());

        let path = persist::write_annotation(&self.annotation_dir, &annotation)
            .map_err(|source| Error::Persist {
                id: id.clone(),
                source,
            })?;
        info!(
            segment_id = %id,
            status = %annotation.current_status.name,
            user = %annotation.current_status.source,
            "Saved annotation to {}",
            path.display()
        );

        annotation.index = Some(position + 1);
        Ok(annotation)
    }

    /// Current counts.
    ///
    /// Annotation records are re-read from disk on every call so the numbers
    /// follow the persisted state, including edits made outside the server.
    /// If the directory cannot be read the in-memory map is used instead.
    pub fn stats(&self) -> Stats {
        self.stats_with(loader::load_annotations)
    }

    /// The directory scan runs before the data lock is taken, so saves never
    /// queue behind it
    fn stats_with<F>(&self, scan: F) -> Stats
    where
        F: FnOnce(&Path) -> Result<HashMap<String, Annotation>>,
    {
        let on_disk = scan(&self.annotation_dir);
        let locked = self.locks.snapshot();
        let data = self.read();
        match on_disk {
            Ok(on_disk) => {
                let known: HashMap<String, Annotation> = on_disk
                    .into_iter()
                    .filter(|(id, _)| data.positions.contains_key(id))
                    .collect();
                stats::aggregate(&data.segments, &known, &locked)
            }
            Err(e) => {
                warn!("Stats falling back to in-memory annotations: {}", e);
                stats::aggregate(&data.segments, &data.annotations, &locked)
            }
        }
    }

    pub fn lock(&self, id: &str, user: &str) -> Result<()> {
        if !self.read().positions.contains_key(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        self.locks.lock(id, user)
    }

    pub fn unlock(&self, id: &str, user: &str) -> Result<()> {
        self.locks.unlock(id, user)
    }

    pub fn unlock_all(&self, user: &str) -> usize {
        self.locks.unlock_all(user)
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locks.is_locked(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, Status};
    use tempfile::TempDir;

    fn store(ids: &[&str]) -> (TempDir, SegmentStore) {
        let tmp = TempDir::new().unwrap();
        let segments = ids
            .iter()
            .map(|id| Segment {
                id: id.to_string(),
                url: format!("http://localhost/{}.wav", id),
                segment_type: "silence".to_string(),
                chunk: Chunk::new(0, 1000),
            })
            .collect();
        let loaded = LoadedData {
            segments,
            annotations: HashMap::new(),
        };
        let store = SegmentStore::from_loaded(tmp.path(), loaded);
        (tmp, store)
    }

    fn reviewed(store: &SegmentStore, id: &str) -> Annotation {
        let mut annotation = store.get(id).unwrap();
        annotation.current_status = Status {
            name: "ok".to_string(),
            source: "u1".to_string(),
            timestamp: String::new(),
        };
        annotation
    }

    #[test]
    fn test_save_completes_during_stats_scan() {
        let (_tmp, store) = store(&["a", "b"]);

        let stats = store.stats_with(|dir| {
            // Data lock must be free while the directory is read
            assert!(store.data.try_write().is_ok());
            store.save(reviewed(&store, "a")).unwrap();
            loader::load_annotations(dir)
        });

        assert_eq!(stats.get("checked"), 1);
        assert_eq!(stats.get("total"), 2);
    }

    #[test]
    fn test_stats_fall_back_to_memory_when_scan_fails() {
        let (_tmp, store) = store(&["a", "b"]);
        store.save(reviewed(&store, "b")).unwrap();

        let stats = store.stats_with(|dir| Err(Error::load(dir, "unreadable")));
        assert_eq!(stats.get("checked"), 1);
        assert_eq!(stats.get("unchecked"), 1);
    }
}
