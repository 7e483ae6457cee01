//! Toast notification surface.
//!
//! The engine never renders UI; it reports user-visible outcomes through the
//! [`Notifier`] trait. Host applications bridge this to their toast system.

use tracing::{error, info};

/// User-facing notification sink.
///
/// Implementations must be cheap and non-blocking; callers may invoke them
/// from async tasks. De-duplication beyond the push listener's built-in
/// window is left to implementors.
pub trait Notifier: Send + Sync {
    /// Shows a success toast.
    fn success(&self, message: &str);

    /// Shows an error toast.
    fn error(&self, message: &str);
}

/// Notifier that routes toasts to the tracing log. Useful as a default and
/// in headless deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        info!("[NOTIFY] {}", message);
    }

    fn error(&self, message: &str) {
        error!("[NOTIFY] {}", message);
    }
}
