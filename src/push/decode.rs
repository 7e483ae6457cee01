//! Defensive decoding of push-event payloads.
//!
//! The event publisher wraps its payload twice: the wire frame carries a
//! JSON array (possibly with leading protocol noise), whose second element is
//! itself a JSON-encoded object `{status, email}`. This nested encoding is a
//! fixed wire contract; decoding walks it step by step and fails closed, so a
//! malformed frame yields "no event" rather than an error reaching the UI.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Why a frame failed to decode. Internal only; callers see `Option`.
#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("no embedded JSON array in frame")]
    NoArray,
    #[error("outer array is not valid JSON: {0}")]
    BadEnvelope(serde_json::Error),
    #[error("outer array does not have exactly two elements")]
    BadShape,
    #[error("second element is not a JSON-encoded string")]
    NotEncoded,
    #[error("inner payload is not a valid event: {0}")]
    BadInner(serde_json::Error),
}

/// Terminal outcome carried by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushOutcome {
    Success,
    Failure,
}

/// A decoded bulk-job completion event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    pub status: PushOutcome,
    #[serde(default)]
    pub email: Option<String>,
}

/// Extracts a push event from a raw frame, or `None` when any decode step
/// fails. Never panics; failures are logged at debug level only.
pub fn extract_event(raw: &str) -> Option<PushEvent> {
    match decode(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("[PUSH] Dropped undecodable frame: {}", e);
            None
        }
    }
}

fn decode(raw: &str) -> Result<PushEvent, DecodeError> {
    let array = locate_array(raw)?;
    let inner = parse_outer(array)?;
    parse_inner(&inner)
}

/// Finds the embedded JSON array, skipping any protocol prefix before the
/// first `[`.
fn locate_array(raw: &str) -> Result<&str, DecodeError> {
    let start = raw.find('[').ok_or(DecodeError::NoArray)?;
    Ok(&raw[start..])
}

/// Parses the outer 2-element array and returns its second element, which
/// must itself be a string.
fn parse_outer(array: &str) -> Result<String, DecodeError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(array).map_err(DecodeError::BadEnvelope)?;

    if values.len() != 2 {
        return Err(DecodeError::BadShape);
    }

    match values.into_iter().nth(1) {
        Some(serde_json::Value::String(inner)) => Ok(inner),
        _ => Err(DecodeError::NotEncoded),
    }
}

/// Parses the inner JSON-encoded `{status, email}` object.
fn parse_inner(inner: &str) -> Result<PushEvent, DecodeError> {
    serde_json::from_str(inner).map_err(DecodeError::BadInner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
