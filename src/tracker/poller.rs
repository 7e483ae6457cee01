//! Per-(job, stage) progress polling loop.
//!
//! One poller task is spawned the moment a stage transition is triggered and
//! runs until the stage reports a terminal status or the owning tracker is
//! torn down. The loop follows the portal's cadence:
//!
//! - a tick whose observation is unchanged, or whose write falls inside the
//!   1 s throttle window, skips the store write and reschedules after the
//!   skip interval (2 s);
//! - a tick that writes reschedules after the normal interval (3 s);
//! - a failed fetch keeps the previous snapshot visible and retries after
//!   the normal interval, indefinitely;
//! - a transition into `completed`/`failed` writes immediately, bypassing
//!   the throttle, then notifies, lingers, removes the store entry, and
//!   refreshes the registry.
//!
//! Cancellation is structured: the token is checked before every reschedule
//! and after every fetch, so an unmounted view never observes a late write.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::stage::StageOps;
use crate::api::{redact_id, Stage, StageStatus};
use crate::config::TrackerConfig;
use crate::notify::Notifier;
use crate::registry::JobRegistry;
use crate::tracker::store::{ProgressStore, StageSnapshot};

/// Everything one poller task needs, bundled at spawn time.
pub(crate) struct PollContext {
    pub stage: Stage,
    pub job_id: String,
    pub ops: Arc<dyn StageOps>,
    pub store: Arc<ProgressStore>,
    pub registry: Arc<JobRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub config: TrackerConfig,
}

/// Runs the polling loop for one (job, stage) pair until terminal or cancelled.
pub(crate) async fn run(ctx: PollContext, cancel: CancellationToken) {
    let mut last_write: Option<Instant> = None;

    info!(
        "[POLLER] Tracking {} for {}",
        ctx.stage.label(),
        redact_id(&ctx.job_id)
    );

    let terminal = loop {
        if cancel.is_cancelled() {
            return;
        }

        let delay = match ctx.ops.fetch_progress(ctx.stage, &ctx.job_id).await {
            Ok(progress) => {
                // In-flight fetches resolve after teardown; discard them.
                if cancel.is_cancelled() {
                    return;
                }

                if progress.status.is_terminal() {
                    // Terminal transitions bypass the write throttle.
                    ctx.store.insert(
                        &ctx.job_id,
                        StageSnapshot {
                            stage: ctx.stage,
                            progress: progress.clone(),
                        },
                    );
                    break progress;
                }

                let unchanged = ctx
                    .store
                    .get(&ctx.job_id)
                    .is_some_and(|prev| prev.progress.same_observation(&progress));

                if unchanged {
                    ctx.config.skip_interval
                } else if last_write
                    .is_some_and(|at| at.elapsed() < ctx.config.write_throttle)
                {
                    // Throttled: drop this observation, keep the old snapshot.
                    ctx.config.skip_interval
                } else {
                    ctx.store.insert(
                        &ctx.job_id,
                        StageSnapshot {
                            stage: ctx.stage,
                            progress,
                        },
                    );
                    last_write = Some(Instant::now());
                    ctx.config.poll_interval
                }
            }
            Err(e) => {
                // Transient failures never surface; the row keeps showing the
                // last known progress.
                warn!(
                    "[POLLER] Progress fetch for {} failed: {} (retrying)",
                    redact_id(&ctx.job_id),
                    e
                );
                ctx.config.poll_interval
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    };

    match terminal.status {
        StageStatus::Completed => {
            info!(
                "[POLLER] {} completed for {} ({} ok, {} failed)",
                ctx.stage.label(),
                redact_id(&ctx.job_id),
                terminal.success,
                terminal.failed
            );
            let message = terminal.message.clone().unwrap_or_else(|| {
                format!(
                    "{} completed: {} succeeded, {} failed",
                    ctx.stage.label(),
                    terminal.success,
                    terminal.failed
                )
            });
            ctx.notifier.success(&message);
        }
        StageStatus::Failed => {
            info!(
                "[POLLER] {} failed for {}",
                ctx.stage.label(),
                redact_id(&ctx.job_id)
            );
            let message = terminal
                .message
                .clone()
                .unwrap_or_else(|| format!("{} failed", ctx.stage.label()));
            ctx.notifier.error(&message);
        }
        // Loop only breaks on terminal statuses.
        StageStatus::Pending | StageStatus::Processing => {}
    }

    // Keep the terminal snapshot visible briefly, then hand the row back to
    // the registry's coarse status.
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(ctx.config.terminal_linger) => {}
    }

    ctx.store.remove(&ctx.job_id);
    if let Err(e) = ctx.registry.refresh().await {
        warn!(
            "[POLLER] Registry refresh after {} failed: {}",
            ctx.stage.label(),
            e
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
