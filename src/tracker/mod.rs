//! Bulk job tracking engine.
//!
//! `BulkTracker` is the orchestration surface over the rest of the crate: it
//! runs chunked uploads, triggers stage transitions, and owns one poller task
//! per tracked job. Pollers are cancellable individually (a view unmounting
//! stops its poller without touching the snapshot) and collectively (tracker
//! shutdown tears down every task through a shared root token).

pub mod store;

pub(crate) mod poller;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::stage::{StageOps, TriggerOutcome};
use crate::api::upload::{UploadClient, UploadOutcome};
use crate::api::{redact_id, Stage};
use crate::config::TrackerConfig;
use crate::error::AppError;
use crate::notify::Notifier;
use crate::registry::JobRegistry;
use crate::tracker::poller::PollContext;
use crate::tracker::store::ProgressStore;
use crate::validation;

/// One tracked job's poller handle. The generation guards against a finished
/// poller evicting the handle of a newer poller for the same job.
struct TaskSlot {
    generation: u64,
    token: CancellationToken,
}

/// Orchestrates uploads, stage triggers, and per-job progress pollers.
pub struct BulkTracker {
    upload: UploadClient,
    stage_ops: Arc<dyn StageOps>,
    store: Arc<ProgressStore>,
    registry: Arc<JobRegistry>,
    notifier: Arc<dyn Notifier>,
    config: TrackerConfig,
    tasks: Arc<Mutex<HashMap<String, TaskSlot>>>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl BulkTracker {
    /// Creates a tracker over the given clients and shared registry.
    pub fn new(
        upload: UploadClient,
        stage_ops: Arc<dyn StageOps>,
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn Notifier>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            upload,
            stage_ops,
            store: Arc::new(ProgressStore::new()),
            registry,
            notifier,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// The live progress store read by the rendered table.
    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// Validates and uploads a CSV file, refreshing the registry on success.
    ///
    /// The registry's uploading flag is held for the duration so intermediate
    /// chunk requests do not flicker the loading overlay. On failure the error
    /// is surfaced as a notification and returned; no refresh happens.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidFile` - pre-flight validation failed
    /// - `AppError::ChunkUploadFailed` - a chunk request failed
    /// - `AppError::ConnectionFailed` - network error
    pub async fn upload<F>(&self, path: &Path, on_progress: F) -> Result<UploadOutcome, AppError>
    where
        F: Fn(u8),
    {
        if let Err(e) = validation::require_csv(path).await {
            self.notifier.error(&e.to_presentation().message);
            return Err(e);
        }

        self.registry.set_uploading(true);
        let result = self
            .upload
            .upload_file(path, self.config.chunk_size_mb, on_progress)
            .await;
        self.registry.set_uploading(false);

        match result {
            Ok(outcome) => {
                if let Err(e) = self.registry.refresh().await {
                    warn!("[TRACKER] Post-upload registry refresh failed: {}", e);
                }
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("file");
                self.notifier.success(&format!("{} uploaded", file_name));
                Ok(outcome)
            }
            Err(e) => {
                self.notifier.error(&e.to_presentation().message);
                Err(e)
            }
        }
    }

    /// Triggers a stage transition for a job and starts polling its progress.
    ///
    /// A 409 from the trigger endpoint means the stage is already running
    /// server-side; polling starts in that case too, attaching to the
    /// in-flight work. Any other trigger failure is surfaced as a
    /// notification and no poller is started.
    ///
    /// # Errors
    ///
    /// - `AppError::PortalError` - trigger rejected by the API
    /// - `AppError::ConnectionFailed` - network error
    pub async fn start_stage(
        &self,
        stage: Stage,
        job_id: &str,
    ) -> Result<TriggerOutcome, AppError> {
        match self.stage_ops.trigger(stage, job_id).await {
            Ok(outcome) => {
                info!(
                    "[TRACKER] {} {} for {}",
                    trigger_verb(outcome),
                    stage.label(),
                    redact_id(job_id)
                );
                self.spawn_poller(stage, job_id);
                Ok(outcome)
            }
            Err(e) => {
                self.notifier.error(&e.to_presentation().message);
                Err(e)
            }
        }
    }

    /// Stops the poller for one job, leaving its last snapshot in the store.
    /// No-op when the job is not tracked.
    pub fn stop_tracking(&self, job_id: &str) {
        let slot = self
            .tasks
            .lock()
            .expect("tracker lock poisoned")
            .remove(job_id);
        if let Some(slot) = slot {
            slot.token.cancel();
            info!("[TRACKER] Stopped tracking {}", redact_id(job_id));
        }
    }

    /// Returns whether a poller is registered for the job.
    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.tasks
            .lock()
            .expect("tracker lock poisoned")
            .contains_key(job_id)
    }

    /// Cancels every poller. Further `start_stage` calls spawn pollers that
    /// are already cancelled, so a shut-down tracker stays inert.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.tasks.lock().expect("tracker lock poisoned").clear();
        info!("[TRACKER] Shut down");
    }

    /// Spawns (or replaces) the poller task for one job.
    fn spawn_poller(&self, stage: Stage, job_id: &str) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = self.root.child_token();

        {
            let mut tasks = self.tasks.lock().expect("tracker lock poisoned");
            if let Some(previous) = tasks.insert(
                job_id.to_string(),
                TaskSlot {
                    generation,
                    token: token.clone(),
                },
            ) {
                // Re-triggering a tracked job replaces its poller.
                previous.token.cancel();
            }
        }

        let ctx = PollContext {
            stage,
            job_id: job_id.to_string(),
            ops: self.stage_ops.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            config: self.config.clone(),
        };

        let tasks = self.tasks.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            poller::run(ctx, token).await;
            let mut tasks = tasks.lock().expect("tracker lock poisoned");
            if tasks
                .get(&job_id)
                .is_some_and(|slot| slot.generation == generation)
            {
                tasks.remove(&job_id);
            }
        });
    }
}

impl Drop for BulkTracker {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn trigger_verb(outcome: TriggerOutcome) -> &'static str {
    match outcome {
        TriggerOutcome::Started => "Started",
        TriggerOutcome::AlreadyRunning => "Attached to running",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
