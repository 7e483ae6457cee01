//! Progress reconciliation store.
//!
//! A flat map from job id to the latest known stage-progress snapshot,
//! written by the pollers and read by the rendered table. Snapshots are
//! `Arc`-wrapped and replaced wholesale, never mutated in place, so consumers
//! relying on pointer-equality memoization render correctly. Writes are
//! last-writer-wins per key; there is no cross-job coupling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use crate::api::{Stage, StageProgress};

/// Latest known progress of one job's active stage.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub progress: StageProgress,
}

/// In-memory map of job id -> latest progress snapshot.
pub struct ProgressStore {
    entries: RwLock<HashMap<String, Arc<StageSnapshot>>>,
    version_tx: watch::Sender<u64>,
}

impl ProgressStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            version_tx,
        }
    }

    /// Inserts or replaces the snapshot for a job. The previous snapshot, if
    /// any, is dropped untouched.
    pub fn insert(&self, job_id: &str, snapshot: StageSnapshot) {
        let mut entries = self.entries.write().expect("store lock poisoned");
        entries.insert(job_id.to_string(), Arc::new(snapshot));
        drop(entries);
        self.version_tx.send_modify(|v| *v += 1);
    }

    /// Returns the current snapshot for a job, if tracked.
    pub fn get(&self, job_id: &str) -> Option<Arc<StageSnapshot>> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .get(job_id)
            .cloned()
    }

    /// Removes a job's snapshot. No-op when the job is not tracked.
    pub fn remove(&self, job_id: &str) {
        let removed = self
            .entries
            .write()
            .expect("store lock poisoned")
            .remove(job_id);
        if removed.is_some() {
            self.version_tx.send_modify(|v| *v += 1);
        }
    }

    /// Returns all tracked snapshots, in no particular order.
    pub fn snapshot_all(&self) -> Vec<(String, Arc<StageSnapshot>)> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    /// Returns true when no jobs are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to change notifications (monotonic version counter,
    /// bumped on every insert and removal).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Current version counter value.
    pub fn version(&self) -> u64 {
        *self.version_tx.borrow()
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StageStatus;

    fn snapshot(processed: u64) -> StageSnapshot {
        StageSnapshot {
            stage: Stage::Db,
            progress: StageProgress {
                job_id: "j1".into(),
                status: StageStatus::Processing,
                total: 100,
                processed,
                success: processed,
                failed: 0,
                progress_percentage: None,
                message: None,
            },
        }
    }

    #[test]
    fn insert_replaces_rather_than_mutates() {
        let store = ProgressStore::new();
        store.insert("j1", snapshot(10));
        let first = store.get("j1").unwrap();

        store.insert("j1", snapshot(20));
        let second = store.get("j1").unwrap();

        // A write produces a new snapshot object; the old one is unchanged.
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.progress.processed, 10);
        assert_eq!(second.progress.processed, 20);
    }

    #[test]
    fn writes_are_independent_per_key() {
        let store = ProgressStore::new();
        store.insert("j1", snapshot(10));
        store.insert("j2", snapshot(99));

        store.insert("j1", snapshot(50));

        assert_eq!(store.get("j2").unwrap().progress.processed, 99);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_untracks_job() {
        let store = ProgressStore::new();
        store.insert("j1", snapshot(10));
        store.remove("j1");

        assert!(store.get("j1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn version_bumps_on_insert_and_remove_only() {
        let store = ProgressStore::new();
        assert_eq!(store.version(), 0);

        store.insert("j1", snapshot(10));
        assert_eq!(store.version(), 1);

        store.remove("j1");
        assert_eq!(store.version(), 2);

        // Removing an untracked job does not notify.
        store.remove("j1");
        assert_eq!(store.version(), 2);
    }
}
