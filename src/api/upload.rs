//! Chunked CSV upload to the portal collector endpoint.
//!
//! Splits a source file into fixed-size byte ranges and streams them to
//! `POST /upload/chunk` strictly sequentially: chunk `n + 1` is never sent
//! before chunk `n`'s response has been received. The server may signal early
//! completion (`complete = true`) when it already holds the full file, in
//! which case the remaining chunks are not sent.

use std::path::Path;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::api::{parse_error_response, ApiContext};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response body for one chunk request.
#[derive(Debug, Default, Deserialize)]
struct ChunkUploadResponse {
    /// Set when the server considers the upload finished, possibly before
    /// all chunks were sent.
    #[serde(default)]
    complete: bool,
}

/// Outcome of a completed chunked upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Number of chunk requests actually issued.
    pub chunks_sent: u64,
    /// Number of chunks planned from the file size.
    pub total_chunks: u64,
    /// True when the server signaled completion before all chunks were sent.
    pub early_complete: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the chunk collector endpoint.
#[derive(Clone)]
pub struct UploadClient {
    ctx: ApiContext,
}

impl UploadClient {
    /// Creates a new upload client over the shared API context.
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Uploads a file in `chunk_size_mb`-MiB chunks, strictly sequentially.
    ///
    /// `on_progress` receives the percent complete after every acknowledged
    /// chunk, computed as `round((index + 1) / total * 100)`. On failure the
    /// observer is reset to 0 before the error is returned; no chunk retry is
    /// attempted and the remaining sequence is abandoned.
    ///
    /// The caller is expected to have validated the file extension already;
    /// it is not re-checked here.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidFile` - file is empty or unreadable
    /// - `AppError::ChunkUploadFailed` - a chunk request failed
    /// - `AppError::ConnectionFailed` - network error
    pub async fn upload_file<F>(
        &self,
        path: &Path,
        chunk_size_mb: u64,
        on_progress: F,
    ) -> Result<UploadOutcome, AppError>
    where
        F: Fn(u8),
    {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidFile("file has no usable name".to_string()))?
            .to_string();

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| AppError::InvalidFile(format!("cannot open file: {}", e)))?;

        let size = file
            .metadata()
            .await
            .map_err(|e| AppError::InvalidFile(format!("cannot read file metadata: {}", e)))?
            .len();

        if size == 0 {
            return Err(AppError::InvalidFile("file is empty".to_string()));
        }

        let chunk_bytes = chunk_size_mb.max(1) * 1024 * 1024;
        let total_chunks = size.div_ceil(chunk_bytes);

        info!(
            "[UPLOAD] Starting chunked upload of {} ({} bytes, {} chunks)",
            file_name, size, total_chunks
        );

        let mut buf = vec![0u8; chunk_bytes as usize];
        let mut early_complete = false;
        let mut chunks_sent = 0u64;

        for index in 0..total_chunks {
            let read = read_up_to(&mut file, &mut buf).await.map_err(|e| {
                on_progress(0);
                AppError::InvalidFile(format!("failed to read chunk {}: {}", index, e))
            })?;

            let result = self
                .send_chunk(&file_name, index, total_chunks, buf[..read].to_vec())
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    // Abort the remaining sequence; the caller surfaces the error.
                    warn!("[UPLOAD] Chunk {}/{} failed, aborting", index + 1, total_chunks);
                    on_progress(0);
                    return Err(e);
                }
            };

            chunks_sent += 1;
            let percent = (((index + 1) as f64 / total_chunks as f64) * 100.0).round() as u8;
            on_progress(percent);

            if response.complete && index + 1 < total_chunks {
                info!(
                    "[UPLOAD] Server signaled early completion after chunk {}/{}",
                    index + 1,
                    total_chunks
                );
                early_complete = true;
                break;
            }
        }

        info!(
            "[UPLOAD] Upload of {} finished ({}/{} chunks sent)",
            file_name, chunks_sent, total_chunks
        );

        Ok(UploadOutcome {
            chunks_sent,
            total_chunks,
            early_complete,
        })
    }

    /// Sends one chunk and decodes its response.
    ///
    /// A malformed or empty response body is not an error; it decodes to
    /// `complete = false` and the sequence continues.
    async fn send_chunk(
        &self,
        file_name: &str,
        index: u64,
        total_chunks: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkUploadResponse, AppError> {
        let url = self.ctx.join("upload/chunk")?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| AppError::Internal(format!("Failed to build chunk part: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("fileName", file_name.to_string())
            .text("chunkNumber", index.to_string())
            .text("totalChunks", total_chunks.to_string())
            .part("chunk", part);

        info!(
            "[UPLOAD] POST /upload/chunk ({}/{})",
            index + 1,
            total_chunks
        );

        let response = self
            .ctx
            .client
            .post(url)
            .bearer_auth(&self.ctx.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Chunk upload failed: {}", e)))?;

        let status = response.status();
        info!("[UPLOAD] POST /upload/chunk -> {}", status.as_u16());

        if !status.is_success() {
            let err = parse_error_response(response, status).await;
            return Err(AppError::ChunkUploadFailed {
                chunk: index,
                message: err.to_string(),
            });
        }

        let body = response.bytes().await.unwrap_or_default();
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}

/// Fills `buf` from the file, returning the number of bytes read. Stops at
/// EOF or when the buffer is full; a final short chunk is expected.
async fn read_up_to(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
