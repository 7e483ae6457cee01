//! Job registry: the materialized upload-history view.
//!
//! Owns the current page of past/current bulk-upload jobs and refetches it
//! wholesale on demand; there is no incremental patching. The registry drives
//! the loading overlay, except while a chunked upload is in flight, where the
//! flag is suppressed to avoid flicker between chunk requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::info;

use crate::api::history::{HistoryOps, HistoryPage, HistoryQuery};
use crate::error::AppError;
use crate::overlay::LoadingOverlay;

/// Paginated, filterable view of bulk-upload jobs.
pub struct JobRegistry {
    ops: Arc<dyn HistoryOps>,
    overlay: Arc<LoadingOverlay>,
    query: RwLock<HistoryQuery>,
    page: RwLock<HistoryPage>,
    uploading: AtomicBool,
    version_tx: watch::Sender<u64>,
}

impl JobRegistry {
    /// Creates a registry over a history source and the shared overlay.
    pub fn new(ops: Arc<dyn HistoryOps>, overlay: Arc<LoadingOverlay>) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            ops,
            overlay,
            query: RwLock::new(HistoryQuery::default()),
            page: RwLock::new(HistoryPage::default()),
            uploading: AtomicBool::new(false),
            version_tx,
        }
    }

    /// Replaces the pagination/filter query. Takes effect on the next refresh.
    pub fn set_query(&self, query: HistoryQuery) {
        *self.query.write().expect("registry lock poisoned") = query;
    }

    /// Marks a bulk upload as in flight, suppressing the loading flag.
    pub fn set_uploading(&self, uploading: bool) {
        self.uploading.store(uploading, Ordering::SeqCst);
    }

    /// Returns whether a bulk upload is currently in flight.
    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    /// Returns a clone of the current materialized page.
    pub fn current_page(&self) -> HistoryPage {
        self.page.read().expect("registry lock poisoned").clone()
    }

    /// Subscribes to page-change notifications (monotonic version counter).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Refetches the current page with the current query.
    ///
    /// Drives the loading overlay unless an upload is in flight.
    ///
    /// # Errors
    ///
    /// - `AppError::PortalError` - API error
    /// - `AppError::ConnectionFailed` - network error
    pub async fn refresh(&self) -> Result<(), AppError> {
        let query = self.query.read().expect("registry lock poisoned").clone();

        let show_loading = !self.is_uploading();
        if show_loading {
            self.overlay.increment();
        }

        let result = self.ops.fetch_history(&query).await;

        if show_loading {
            self.overlay.decrement();
        }

        let fetched = result?;
        info!(
            "[REGISTRY] Refreshed page {} ({} rows, {} total)",
            fetched.page,
            fetched.file_uploads.len(),
            fetched.total
        );

        *self.page.write().expect("registry lock poisoned") = fetched;
        self.version_tx.send_modify(|v| *v += 1);

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
