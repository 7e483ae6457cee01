//! Push-event channel for out-of-band job notifications.
//!
//! The portal pushes completion/failure events for bulk jobs over a duplex
//! channel, routed through a per-user room. The listener owns exactly one
//! connection per authenticated identity: swapping the event handler never
//! reconnects, only an identity change or an explicit disconnect does.
//! Dropped connections are retried a bounded number of times with a linear
//! backoff; exhausting the retries surfaces a connection error and stops.

pub mod decode;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::api::redact_id;
use crate::config::PushConfig;
use crate::error::AppError;
use crate::notify::Notifier;
use crate::push::decode::{extract_event, PushEvent, PushOutcome};

/// Callback receiving every decoded push event.
pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

/// The live connection, if any. The generation ties the slot to the task
/// that owns it, so a task that gives up clears only its own entry.
struct ActiveConnection {
    user_id: String,
    generation: u64,
    cancel: CancellationToken,
}

/// Owns the push channel for one authenticated session.
pub struct PushListener {
    url: Url,
    config: PushConfig,
    notifier: Arc<dyn Notifier>,
    /// Stable slot for the latest handler; updated freely without touching
    /// the connection.
    handler: Arc<Mutex<Option<PushHandler>>>,
    state: Arc<Mutex<Option<ActiveConnection>>>,
    next_generation: AtomicU64,
}

impl PushListener {
    /// Creates a listener for the given channel endpoint.
    pub fn new(url: Url, notifier: Arc<dyn Notifier>, config: PushConfig) -> Self {
        Self {
            url,
            config,
            notifier,
            handler: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Replaces the event handler. Takes effect for the next delivered event;
    /// the connection is untouched.
    pub fn set_handler(&self, handler: PushHandler) {
        *self.handler.lock().expect("push lock poisoned") = Some(handler);
    }

    /// Opens the channel for the given identity and joins its room.
    ///
    /// Calling again with the same identity is a no-op; a different identity
    /// tears the old connection down and opens a fresh one.
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - no user identity available
    pub fn connect(&self, user_id: Option<&str>) -> Result<(), AppError> {
        let user_id = user_id.ok_or(AppError::NotAuthenticated)?;

        let mut state = self.state.lock().expect("push lock poisoned");
        if let Some(active) = state.as_ref() {
            if active.user_id == user_id {
                return Ok(());
            }
            active.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        *state = Some(ActiveConnection {
            user_id: user_id.to_string(),
            generation,
            cancel: cancel.clone(),
        });
        drop(state);

        info!("[PUSH] Connecting as {}", redact_id(user_id));
        tokio::spawn(run(
            self.url.clone(),
            user_id.to_string(),
            self.handler.clone(),
            self.notifier.clone(),
            self.config.clone(),
            self.state.clone(),
            generation,
            cancel,
        ));

        Ok(())
    }

    /// Closes the channel. No-op when not connected.
    pub fn disconnect(&self) {
        if let Some(active) = self.state.lock().expect("push lock poisoned").take() {
            active.cancel.cancel();
            info!("[PUSH] Disconnected");
        }
    }

    /// Returns whether a connection task is active.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .expect("push lock poisoned")
            .is_some()
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connection task: connect, join the room, pump events, reconnect on drop.
async fn run(
    url: Url,
    user_id: String,
    handler: Arc<Mutex<Option<PushHandler>>>,
    notifier: Arc<dyn Notifier>,
    config: PushConfig,
    state: Arc<Mutex<Option<ActiveConnection>>>,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                let join = serde_json::json!([
                    "join-room",
                    { "room": format!("user:{}", user_id) }
                ]);

                if ws.send(Message::Text(join.to_string())).await.is_ok() {
                    info!("[PUSH] Joined room for {}", redact_id(&user_id));
                    failures = 0;
                    pump(&mut ws, &handler, &notifier, &config, &cancel).await;
                    if cancel.is_cancelled() {
                        let _ = ws.close(None).await;
                        return;
                    }
                    warn!("[PUSH] Connection dropped, reconnecting");
                }
            }
            Err(e) => {
                warn!("[PUSH] Connect failed: {}", e);
            }
        }

        failures += 1;
        if failures >= config.max_attempts {
            warn!(
                "[PUSH] Giving up after {} consecutive failures",
                config.max_attempts
            );
            // Release the slot so the listener reports disconnected and a
            // later connect with the same identity starts fresh.
            let mut slot = state.lock().expect("push lock poisoned");
            if slot
                .as_ref()
                .is_some_and(|active| active.generation == generation)
            {
                *slot = None;
            }
            drop(slot);
            notifier.error("Lost connection to the notification channel");
            return;
        }

        // Linear backoff: attempt n waits n * retry_delay.
        let delay = config.retry_delay * failures;
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Reads frames until the connection drops or the task is cancelled.
async fn pump<S>(
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    handler: &Arc<Mutex<Option<PushHandler>>>,
    notifier: &Arc<dyn Notifier>,
    config: &PushConfig,
    cancel: &CancellationToken,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut last_delivered: Option<(PushEvent, Instant)> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("[PUSH] Read failed: {}", e);
                        return;
                    }
                };

                let Some(event) = extract_event(&text) else {
                    continue;
                };

                // The publisher occasionally double-fires; identical events
                // inside the window are dropped.
                let duplicate = last_delivered
                    .as_ref()
                    .is_some_and(|(prev, at)| *prev == event && at.elapsed() < config.dedup_window);
                if duplicate {
                    continue;
                }
                last_delivered = Some((event.clone(), Instant::now()));

                deliver(handler, notifier, event);
            }
        }
    }
}

/// Dispatches one event on a fresh task, off the read loop.
fn deliver(
    handler: &Arc<Mutex<Option<PushHandler>>>,
    notifier: &Arc<dyn Notifier>,
    event: PushEvent,
) {
    let handler = handler.lock().expect("push lock poisoned").clone();
    let notifier = notifier.clone();

    tokio::spawn(async move {
        let who = event.email.as_deref().unwrap_or("a user");
        match event.status {
            PushOutcome::Success => {
                notifier.success(&format!("Bulk user creation completed for {}", who));
            }
            PushOutcome::Failure => {
                notifier.error(&format!("Bulk user creation failed for {}", who));
            }
        }
        if let Some(handler) = handler {
            handler(event);
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
