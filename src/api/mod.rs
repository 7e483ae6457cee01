//! Portal HTTP client layer.
//!
//! Thin clients over a shared `reqwest::Client`, one per API area:
//!
//! - [`upload::UploadClient`] - chunked CSV upload
//! - [`history::HistoryClient`] - upload-history pagination
//! - [`stage::StageClient`] - stage triggers and progress fetches
//!
//! # Security
//!
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged
//! - Job ids are redacted to a short prefix in log lines

pub mod history;
pub mod stage;
pub mod upload;

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Context
// ─────────────────────────────────────────────────────────────────────────────

/// Shared request context for all portal API clients.
#[derive(Clone)]
pub struct ApiContext {
    /// Shared HTTP client.
    pub(crate) client: Arc<Client>,
    /// Base portal URL (e.g., "https://portal.example.edu/api").
    pub(crate) base_url: Url,
    /// Access token for authentication.
    pub(crate) access_token: String,
    /// Identity of the authenticated user, used for history scoping and the
    /// push-channel room.
    pub(crate) user_id: String,
}

impl ApiContext {
    /// Creates a new API context.
    pub fn new(client: Arc<Client>, base_url: Url, access_token: String, user_id: String) -> Self {
        Self {
            client,
            base_url,
            access_token,
            user_id,
        }
    }

    /// Returns the authenticated user's identity.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Joins a path onto the base URL.
    pub(crate) fn join(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Failed to build URL for {}: {}", path, e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse job lifecycle status, server-authoritative.
///
/// Monotonic through `pending -> sync_db -> sync_blockchain` with `failed`
/// reachable from any non-terminal state. Unknown values default to `Pending`
/// so the view never renders a missing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    SyncDb,
    SyncBlockchain,
    Failed,
    // serde requires the catch-all variant to be declared last.
    #[default]
    #[serde(other)]
    Pending,
}

impl JobStatus {
    /// Whether the "sync DB" action may be triggered for a job in this state.
    /// Disabled once the DB stage has run, the chain stage has run, or the
    /// job has permanently failed.
    pub fn can_sync_db(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }

    /// Whether the "sync blockchain" action may be triggered for a job in
    /// this state.
    pub fn can_sync_blockchain(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::SyncDb)
    }

    /// String form used in history filter query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::SyncDb => "sync_db",
            JobStatus::SyncBlockchain => "sync_blockchain",
            JobStatus::Failed => "failed",
        }
    }
}

/// One phase of the bulk pipeline. Each stage has its own trigger and
/// progress endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// DB sync: parse/validate rows and create user records.
    Db,
    /// Blockchain sync: activate created users on chain.
    Blockchain,
}

impl Stage {
    /// Path of the stage-start endpoint.
    pub(crate) fn trigger_path(&self) -> &'static str {
        match self {
            Stage::Db => "users/bulk",
            Stage::Blockchain => "users/bulk/activate-blockchain",
        }
    }

    /// Path prefix of the progress endpoint; the job id is appended.
    pub(crate) fn progress_path(&self) -> &'static str {
        match self {
            Stage::Db => "users/bulk/create-progress",
            Stage::Blockchain => "users/bulk/blockchain-progress",
        }
    }

    /// Human label used in notifications and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Db => "database sync",
            Stage::Blockchain => "blockchain sync",
        }
    }
}

/// Stage-local processing status, distinct from the coarse [`JobStatus`].
/// Unknown values default to `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Processing,
    Completed,
    Failed,
    // serde requires the catch-all variant to be declared last.
    #[default]
    #[serde(other)]
    Pending,
}

impl StageStatus {
    /// Returns true if the stage cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

/// Progress of one stage of one job, as reported by the server.
///
/// `processed = success + failed` is expected server-side but not enforced
/// here; the server is the source of truth. `total` may be 0 while the
/// server is still counting rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageProgress {
    #[serde(rename = "history_file_upload_id")]
    pub job_id: String,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub failed: u64,
    /// Server-computed percentage, when provided. The server may report a
    /// fractional or out-of-range value; it is rounded into 0-100 on decode,
    /// and anything non-numeric defaults to absent rather than failing the
    /// whole observation.
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub progress_percentage: Option<u8>,
    /// Optional server message, surfaced in terminal notifications.
    #[serde(default)]
    pub message: Option<String>,
}

/// Decodes a reported percentage without rejecting the surrounding body:
/// numbers are rounded and clamped to 0-100, anything else becomes `None`.
fn lenient_percentage<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().map(|p| p.round().clamp(0.0, 100.0) as u8))
}

impl StageProgress {
    /// Percent complete: the server-provided value when present, otherwise
    /// `round(processed / total * 100)`, defined as 0 while `total` is 0.
    pub fn percent(&self) -> u8 {
        if let Some(p) = self.progress_percentage {
            return p.min(100);
        }
        if self.total == 0 {
            return 0;
        }
        let pct = (self.processed as f64 / self.total as f64) * 100.0;
        pct.round().min(100.0) as u8
    }

    /// Whether two fetches describe the same observation. Used to suppress
    /// redundant store writes; compares exactly the fields the view renders.
    pub(crate) fn same_observation(&self, other: &StageProgress) -> bool {
        self.processed == other.processed
            && self.status == other.status
            && self.success == other.success
            && self.failed == other.failed
            && self.progress_percentage == other.progress_percentage
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Portal API error response format.
#[derive(Debug, Deserialize)]
struct PortalErrorBody {
    message: String,
}

/// Parses a non-2xx response into an `AppError`.
pub(crate) async fn parse_error_response(
    response: reqwest::Response,
    status: reqwest::StatusCode,
) -> AppError {
    if status == reqwest::StatusCode::NOT_FOUND {
        return AppError::NotFound("The requested portal resource was not found".to_string());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    if let Ok(err) = serde_json::from_str::<PortalErrorBody>(&body) {
        return AppError::PortalError(err.message);
    }

    AppError::PortalError(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Redacts a job ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
