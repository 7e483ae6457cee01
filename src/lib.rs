//! Client engine for the credential portal's bulk user-creation pipeline.
//!
//! The portal ingests institutional users from a CSV file through a
//! server-executed, multi-stage pipeline: the file is uploaded in chunks,
//! parsed and validated, synced into the database, and finally activated on
//! chain. This crate is the client side of that pipeline: it uploads, triggers
//! stage transitions, polls their progress, listens for pushed completion
//! events, and keeps a UI-facing progress model consistent throughout.
//!
//! Main entry points:
//!
//! - [`tracker::BulkTracker`] - uploads, stage triggers, per-job pollers
//! - [`registry::JobRegistry`] - the paginated upload-history view
//! - [`tracker::store::ProgressStore`] - live per-job progress snapshots
//! - [`push::PushListener`] - out-of-band completion notifications
//!
//! The engine renders nothing itself. Hosts observe it through `watch`
//! subscriptions on the store and registry, the [`notify::Notifier`] toast
//! trait, and the progress callbacks on upload.

pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod overlay;
pub mod push;
pub mod registry;
pub mod tracker;
pub mod validation;

pub use api::history::{HistoryClient, HistoryPage, HistoryQuery, UploadJob};
pub use api::stage::{StageClient, TriggerOutcome};
pub use api::upload::{UploadClient, UploadOutcome};
pub use api::{ApiContext, JobStatus, Stage, StageProgress, StageStatus};
pub use config::{PushConfig, TrackerConfig};
pub use error::{AppError, ErrorPresentation};
pub use notify::{LogNotifier, Notifier};
pub use overlay::LoadingOverlay;
pub use push::decode::{PushEvent, PushOutcome};
pub use push::PushListener;
pub use registry::JobRegistry;
pub use tracker::store::{ProgressStore, StageSnapshot};
pub use tracker::BulkTracker;
