//! Pre-flight file validation.
//!
//! The bulk pipeline accepts CSV files only. Validation happens before any
//! network call; the chunk uploader itself does not re-check the extension.
//! Structure is checked against a fixed-size sample so very large files are
//! safe to validate.

use std::io::Cursor;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::AppError;

/// Size of the sample read for structural validation (64 KB).
const VALIDATION_SAMPLE_SIZE: usize = 64 * 1024;

/// Checks that the file looks like an uploadable CSV: a `.csv` extension
/// (case-insensitive), a non-zero size, and a readable header row.
///
/// # Errors
///
/// Returns `AppError::InvalidFile` with a user-presentable reason.
pub async fn require_csv(path: &Path) -> Result<(), AppError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if !is_csv {
        return Err(AppError::InvalidFile(
            "only .csv files can be uploaded".to_string(),
        ));
    }

    let mut file = File::open(path)
        .await
        .map_err(|e| AppError::InvalidFile(format!("cannot read file: {}", e)))?;

    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::InvalidFile(format!("cannot read file metadata: {}", e)))?
        .len();

    if size == 0 {
        return Err(AppError::InvalidFile("file is empty".to_string()));
    }

    // Structural check on a bounded sample only.
    let mut sample = vec![0u8; VALIDATION_SAMPLE_SIZE.min(size as usize)];
    file.read_exact(&mut sample)
        .await
        .map_err(|e| AppError::InvalidFile(format!("cannot read file: {}", e)))?;

    check_header(&sample)
}

/// Verifies the sample starts with a parseable, non-empty CSV header row.
fn check_header(sample: &[u8]) -> Result<(), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(sample));

    let headers = reader
        .byte_headers()
        .map_err(|e| AppError::InvalidFile(format!("unreadable CSV header: {}", e)))?;

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::InvalidFile(
            "CSV file has no header row".to_string(),
        ));
    }

    Ok(())
}
