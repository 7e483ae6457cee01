use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "refresh_token",
    "access_token",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the toast surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    // ── File ──────────────────────────────────────────────────────────────────
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Chunk {chunk} upload failed: {message}")]
    ChunkUploadFailed { chunk: u64, message: String },

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Portal error: {0}")]
    PortalError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for a toast.
    /// Never leaks tokens or auth headers.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "You need to log in to the portal to continue.".into(),
                action: Some("Log in".into()),
            },

            AppError::InvalidFile(msg) => ErrorPresentation {
                title: "Invalid File".into(),
                message: format!("The selected file cannot be uploaded: {}", msg),
                action: Some("Choose a .csv file and try again".into()),
            },

            AppError::ChunkUploadFailed { chunk: _, message } => ErrorPresentation {
                title: "Upload Failed".into(),
                message: sanitize_message(message, "The file upload failed."),
                action: Some("Try uploading again".into()),
            },

            AppError::PortalError(msg) => ErrorPresentation {
                title: "Portal Error".into(),
                message: sanitize_message(msg, "A portal error occurred."),
                action: None,
            },

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested item was not found."),
                action: None,
            },

            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the portal. Please check your internet connection."
                    .into(),
                action: Some("Check network and retry".into()),
            },

            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

// Allow AppError to cross the UI boundary as a toast payload.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
