//! Stage trigger and progress endpoints.
//!
//! Each pipeline stage (DB sync, blockchain sync) has a trigger endpoint and
//! a progress endpoint. A `409 Conflict` on trigger is not an error: it means
//! the stage is already running server-side (for example, started by a
//! concurrent session) and the caller should begin polling anyway.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::info;

use crate::api::{parse_error_response, redact_id, ApiContext, Stage, StageProgress};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for both stage triggers.
#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    history_file_upload_id: &'a str,
}

/// Result of a stage-trigger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The stage was started by this call.
    Started,
    /// The stage was already running server-side (409). Polling should begin
    /// exactly as if this call had started it.
    AlreadyRunning,
}

// ─────────────────────────────────────────────────────────────────────────────
// StageOps Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for stage operations, allowing test fakes behind the poller.
pub trait StageOps: Send + Sync {
    /// Triggers a stage for a job.
    fn trigger<'a>(
        &'a self,
        stage: Stage,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TriggerOutcome, AppError>> + Send + 'a>>;

    /// Fetches the current progress of a stage for a job.
    fn fetch_progress<'a>(
        &'a self,
        stage: Stage,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StageProgress, AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// StageClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the stage trigger/progress endpoint pairs.
#[derive(Clone)]
pub struct StageClient {
    ctx: ApiContext,
}

impl StageClient {
    /// Creates a new stage client over the shared API context.
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Triggers a stage for a job.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - job not found
    /// - `AppError::PortalError` - API error other than 409
    /// - `AppError::ConnectionFailed` - network error
    pub async fn trigger(&self, stage: Stage, job_id: &str) -> Result<TriggerOutcome, AppError> {
        let url = self.ctx.join(stage.trigger_path())?;
        let body = TriggerRequest {
            history_file_upload_id: job_id,
        };

        info!(
            "[STAGE] POST /{} (triggering {} for {})",
            stage.trigger_path(),
            stage.label(),
            redact_id(job_id)
        );

        let response = self
            .ctx
            .client
            .post(url)
            .bearer_auth(&self.ctx.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Stage trigger failed: {}", e)))?;

        let status = response.status();
        info!(
            "[STAGE] POST /{} -> {}",
            stage.trigger_path(),
            status.as_u16()
        );

        if status == reqwest::StatusCode::CONFLICT {
            info!(
                "[STAGE] {} already running for {}, polling anyway",
                stage.label(),
                redact_id(job_id)
            );
            return Ok(TriggerOutcome::AlreadyRunning);
        }

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        Ok(TriggerOutcome::Started)
    }

    /// Fetches the current progress of a stage for a job.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - job not found
    /// - `AppError::PortalError` - API error or malformed body
    /// - `AppError::ConnectionFailed` - network error
    pub async fn fetch_progress(
        &self,
        stage: Stage,
        job_id: &str,
    ) -> Result<StageProgress, AppError> {
        let url = self
            .ctx
            .join(&format!("{}/{}", stage.progress_path(), job_id))?;

        let response = self
            .ctx
            .client
            .get(url)
            .bearer_auth(&self.ctx.access_token)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Progress fetch failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| {
            AppError::PortalError(format!("Failed to parse progress response: {}", e))
        })
    }
}

impl StageOps for StageClient {
    fn trigger<'a>(
        &'a self,
        stage: Stage,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TriggerOutcome, AppError>> + Send + 'a>> {
        Box::pin(StageClient::trigger(self, stage, job_id))
    }

    fn fetch_progress<'a>(
        &'a self,
        stage: Stage,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StageProgress, AppError>> + Send + 'a>> {
        Box::pin(StageClient::fetch_progress(self, stage, job_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StageStatus;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(mock_url: &str) -> StageClient {
        let ctx = ApiContext::new(
            Arc::new(reqwest::Client::new()),
            Url::parse(&format!("{}/", mock_url)).unwrap(),
            "test_token".to_string(),
            "user-1".to_string(),
        );
        StageClient::new(ctx)
    }

    #[tokio::test]
    async fn trigger_db_sync_sends_job_id() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/users/bulk"))
            .and(body_json(
                serde_json::json!({"history_file_upload_id": "job-1"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = client.trigger(Stage::Db, "job-1").await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Started);
    }

    #[tokio::test]
    async fn trigger_blockchain_uses_activate_endpoint() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/users/bulk/activate-blockchain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = client.trigger(Stage::Blockchain, "job-1").await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Started);
    }

    #[tokio::test]
    async fn trigger_conflict_means_already_running() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/users/bulk"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&mock_server)
            .await;

        let outcome = client.trigger(Stage::Db, "job-1").await.unwrap();
        assert_eq!(outcome, TriggerOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn trigger_failure_surfaces_portal_message() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/users/bulk"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "file not yet parsed"})),
            )
            .mount(&mock_server)
            .await;

        let result = client.trigger(Stage::Db, "job-1").await;
        match result {
            Err(AppError::PortalError(msg)) => assert!(msg.contains("file not yet parsed")),
            other => panic!("Expected PortalError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_progress_parses_body() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/users/bulk/create-progress/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "history_file_upload_id": "job-1",
                "status": "processing",
                "total": 100,
                "processed": 50,
                "success": 48,
                "failed": 2,
                "progress_percentage": 50
            })))
            .mount(&mock_server)
            .await;

        let progress = client.fetch_progress(Stage::Db, "job-1").await.unwrap();
        assert_eq!(progress.status, StageStatus::Processing);
        assert_eq!(progress.processed, 50);
        assert_eq!(progress.percent(), 50);
    }

    #[tokio::test]
    async fn fetch_progress_blockchain_endpoint() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/users/bulk/blockchain-progress/job-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "history_file_upload_id": "job-2",
                "status": "completed",
                "total": 10,
                "processed": 10,
                "success": 10,
                "failed": 0
            })))
            .mount(&mock_server)
            .await;

        let progress = client
            .fetch_progress(Stage::Blockchain, "job-2")
            .await
            .unwrap();
        assert!(progress.status.is_terminal());
        assert_eq!(progress.percent(), 100);
    }

    #[tokio::test]
    async fn fetch_progress_not_found() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/users/bulk/create-progress/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let result = client.fetch_progress(Stage::Db, "ghost").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
