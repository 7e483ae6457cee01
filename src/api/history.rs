//! Upload-history pagination for the job registry.
//!
//! Pure request/response pagination over `GET /upload/history`. Rows with
//! absent fields are defaulted through serde so the view layer never has to
//! deal with missing values.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{parse_error_response, ApiContext, JobStatus};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// One bulk-upload job row from the history endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub status: JobStatus,
}

/// One materialized page of the upload history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    #[serde(default)]
    pub file_uploads: Vec<UploadJob>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub total_pages: u64,
}

/// Query parameters for a history fetch.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub limit: u64,
    /// Free-text search over file names.
    pub search: Option<String>,
    /// Coarse-status filter; `None` means no server-side filter ("ALL").
    pub status: Option<JobStatus>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            status: None,
        }
    }
}

impl HistoryQuery {
    /// Parses a UI filter value. Absent, `"ALL"` (any case), and anything
    /// unrecognized all mean no filter; the wire catch-all that maps unknown
    /// statuses to `pending` must not apply here, or a stale filter string
    /// would silently narrow the history to pending jobs.
    pub fn status_filter(value: Option<&str>) -> Option<JobStatus> {
        match value? {
            "pending" => Some(JobStatus::Pending),
            "sync_db" => Some(JobStatus::SyncDb),
            "sync_blockchain" => Some(JobStatus::SyncBlockchain),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HistoryOps Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for history fetches, allowing test fakes behind the registry.
pub trait HistoryOps: Send + Sync {
    /// Fetches one page of the upload history.
    fn fetch_history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<HistoryPage, AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HistoryClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the upload-history endpoint.
#[derive(Clone)]
pub struct HistoryClient {
    ctx: ApiContext,
}

impl HistoryClient {
    /// Creates a new history client over the shared API context.
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Fetches one page of upload history for the authenticated user.
    ///
    /// # Errors
    ///
    /// - `AppError::PortalError` - API error
    /// - `AppError::ConnectionFailed` - network error
    pub async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryPage, AppError> {
        let url = self.ctx.join("upload/history")?;

        let mut params: Vec<(&str, String)> = vec![
            ("page", query.page.to_string()),
            ("pageSize", query.limit.to_string()),
            ("userId", self.ctx.user_id.clone()),
        ];
        if let Some(ref search) = query.search {
            params.push(("search", search.clone()));
        }
        if let Some(status) = query.status {
            params.push(("status", status.as_str().to_string()));
        }

        info!(
            "[REGISTRY] GET /upload/history (page {}, pageSize {})",
            query.page, query.limit
        );

        let response = self
            .ctx
            .client
            .get(url)
            .query(&params)
            .bearer_auth(&self.ctx.access_token)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("History fetch failed: {}", e)))?;

        let status = response.status();
        info!("[REGISTRY] GET /upload/history -> {}", status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| {
            AppError::PortalError(format!("Failed to parse history response: {}", e))
        })
    }
}

impl HistoryOps for HistoryClient {
    fn fetch_history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<HistoryPage, AppError>> + Send + 'a>> {
        Box::pin(HistoryClient::fetch_history(self, query))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(mock_url: &str) -> HistoryClient {
        let ctx = ApiContext::new(
            Arc::new(reqwest::Client::new()),
            Url::parse(&format!("{}/", mock_url)).unwrap(),
            "test_token".to_string(),
            "user-7".to_string(),
        );
        HistoryClient::new(ctx)
    }

    #[tokio::test]
    async fn fetch_history_sends_pagination_and_user() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/upload/history"))
            .and(query_param("page", "2"))
            .and(query_param("pageSize", "25"))
            .and(query_param("userId", "user-7"))
            .and(query_param_is_missing("status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileUploads": [
                    {"id": "j1", "fileName": "a.csv", "createdAt": "2026-01-01", "status": "sync_db"}
                ],
                "total": 1,
                "page": 2,
                "pageSize": 25,
                "totalPages": 1
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let query = HistoryQuery {
            page: 2,
            limit: 25,
            search: None,
            status: None,
        };
        let page = client.fetch_history(&query).await.unwrap();

        assert_eq!(page.file_uploads.len(), 1);
        assert_eq!(page.file_uploads[0].status, JobStatus::SyncDb);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn status_filter_is_passed_through() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/upload/history"))
            .and(query_param("status", "failed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let query = HistoryQuery {
            status: Some(JobStatus::Failed),
            ..Default::default()
        };
        client.fetch_history(&query).await.unwrap();
    }

    #[tokio::test]
    async fn absent_row_fields_are_defaulted() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        // Sparse rows and a sparse envelope must still materialize.
        Mock::given(method("GET"))
            .and(path("/upload/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fileUploads": [{"id": "j2"}]
            })))
            .mount(&mock_server)
            .await;

        let page = client.fetch_history(&HistoryQuery::default()).await.unwrap();

        assert_eq!(page.total, 0);
        assert_eq!(page.file_uploads[0].file_name, "");
        assert_eq!(page.file_uploads[0].status, JobStatus::Pending);
    }

    #[test]
    fn all_filter_means_no_status() {
        assert_eq!(HistoryQuery::status_filter(None), None);
        assert_eq!(HistoryQuery::status_filter(Some("ALL")), None);
        assert_eq!(HistoryQuery::status_filter(Some("all")), None);
        assert_eq!(
            HistoryQuery::status_filter(Some("sync_db")),
            Some(JobStatus::SyncDb)
        );
        assert_eq!(
            HistoryQuery::status_filter(Some("failed")),
            Some(JobStatus::Failed)
        );
    }

    #[test]
    fn unrecognized_filter_means_no_status() {
        // Not the wire default: an unknown filter string must widen to no
        // filter, never narrow to pending.
        assert_eq!(HistoryQuery::status_filter(Some("bogus")), None);
        assert_eq!(HistoryQuery::status_filter(Some("PENDING")), None);
        assert_eq!(HistoryQuery::status_filter(Some("")), None);
    }
}
