//! Shared fakes for tracker tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::history::{HistoryOps, HistoryPage, HistoryQuery};
use crate::api::stage::{StageOps, TriggerOutcome};
use crate::api::{Stage, StageProgress, StageStatus};
use crate::error::AppError;
use crate::overlay::LoadingOverlay;
use crate::registry::JobRegistry;

/// How a scripted trigger call behaves.
#[derive(Debug, Clone)]
pub(crate) enum TriggerScript {
    Started,
    AlreadyRunning,
    Fail(String),
}

/// Stage source driven by a scripted sequence of progress fetches. When the
/// script runs out, the last successful observation repeats forever.
pub(crate) struct ScriptedStageOps {
    trigger: TriggerScript,
    script: Mutex<VecDeque<Result<StageProgress, AppError>>>,
    last: Mutex<Option<StageProgress>>,
    fetch_calls: AtomicU64,
    trigger_calls: AtomicU64,
}

impl ScriptedStageOps {
    pub(crate) fn with_progress(script: Vec<Result<StageProgress, AppError>>) -> Arc<Self> {
        Self::with_trigger(TriggerScript::Started, script)
    }

    pub(crate) fn with_trigger(
        trigger: TriggerScript,
        script: Vec<Result<StageProgress, AppError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            trigger,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            fetch_calls: AtomicU64::new(0),
            trigger_calls: AtomicU64::new(0),
        })
    }

    /// Builds a processing-style observation.
    pub(crate) fn progress(status: StageStatus, processed: u64, total: u64) -> StageProgress {
        StageProgress {
            job_id: "job-1".into(),
            status,
            total,
            processed,
            success: processed,
            failed: 0,
            progress_percentage: None,
            message: None,
        }
    }

    /// Builds a failed terminal observation with a server message.
    pub(crate) fn failed_with_message(message: &str) -> StageProgress {
        StageProgress {
            job_id: "job-1".into(),
            status: StageStatus::Failed,
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn trigger_calls(&self) -> u64 {
        self.trigger_calls.load(Ordering::SeqCst)
    }
}

impl StageOps for ScriptedStageOps {
    fn trigger<'a>(
        &'a self,
        _stage: Stage,
        _job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TriggerOutcome, AppError>> + Send + 'a>> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.trigger.clone();
        Box::pin(async move {
            match outcome {
                TriggerScript::Started => Ok(TriggerOutcome::Started),
                TriggerScript::AlreadyRunning => Ok(TriggerOutcome::AlreadyRunning),
                TriggerScript::Fail(msg) => Err(AppError::PortalError(msg)),
            }
        })
    }

    fn fetch_progress<'a>(
        &'a self,
        _stage: Stage,
        _job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StageProgress, AppError>> + Send + 'a>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => {
                if let Ok(ref progress) = result {
                    *self.last.lock().unwrap() = Some(progress.clone());
                }
                result
            }
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("scripted fetch exhausted before any observation")),
        };
        Box::pin(async move { result })
    }
}

/// History source that returns an empty page and counts refreshes.
struct CountingHistory {
    calls: Arc<AtomicU64>,
}

impl HistoryOps for CountingHistory {
    fn fetch_history<'a>(
        &'a self,
        _query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<HistoryPage, AppError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(HistoryPage::default()) })
    }
}

/// Builds a registry over a counting fake; returns the refresh counter.
pub(crate) fn registry_with_counter() -> (Arc<JobRegistry>, Arc<AtomicU64>) {
    let calls = Arc::new(AtomicU64::new(0));
    let registry = JobRegistry::new(
        Arc::new(CountingHistory {
            calls: calls.clone(),
        }),
        Arc::new(LoadingOverlay::new()),
    );
    (Arc::new(registry), calls)
}
