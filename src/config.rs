//! Timing and sizing configuration for the bulk pipeline engine.
//!
//! The intervals below mirror the portal's production behavior. They were
//! chosen empirically and have no documented rationale, so they are kept as
//! configurable defaults rather than hard-coded constants.

use std::time::Duration;

/// Configuration for the stage progress poller and chunk uploader.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum interval between two store writes for the same job (default: 1 s).
    /// Transitions into a terminal stage status bypass this throttle.
    pub write_throttle: Duration,
    /// Reschedule delay after a tick that skipped its store write, either
    /// because the observation was unchanged or because the throttle applied
    /// (default: 2 s).
    pub skip_interval: Duration,
    /// Reschedule delay after a normal tick, and the retry delay after a
    /// failed progress fetch (default: 3 s).
    pub poll_interval: Duration,
    /// How long a terminal snapshot stays visible before it is removed from
    /// the store and the registry is refreshed (default: 2 s).
    pub terminal_linger: Duration,
    /// Upload chunk size in mebibytes (default: 1).
    pub chunk_size_mb: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            write_throttle: Duration::from_millis(1000),
            skip_interval: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(3000),
            terminal_linger: Duration::from_millis(2000),
            chunk_size_mb: 1,
        }
    }
}

impl TrackerConfig {
    /// Sets the store write throttle.
    pub fn write_throttle(mut self, throttle: Duration) -> Self {
        self.write_throttle = throttle;
        self
    }

    /// Sets the skip-path reschedule delay.
    pub fn skip_interval(mut self, interval: Duration) -> Self {
        self.skip_interval = interval;
        self
    }

    /// Sets the normal reschedule / fetch-retry delay.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the terminal linger delay.
    pub fn terminal_linger(mut self, linger: Duration) -> Self {
        self.terminal_linger = linger;
        self
    }

    /// Sets the upload chunk size in mebibytes.
    pub fn chunk_size_mb(mut self, mb: u64) -> Self {
        self.chunk_size_mb = mb;
        self
    }
}

/// Configuration for the push-event channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Maximum consecutive connection attempts before giving up (default: 3).
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_delay`
    /// (default: 2 s).
    pub retry_delay: Duration,
    /// Window within which an event identical to the previous one is
    /// suppressed (default: 2 s).
    pub dedup_window: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            dedup_window: Duration::from_secs(2),
        }
    }
}

impl PushConfig {
    /// Sets the maximum consecutive connection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the duplicate-suppression window.
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }
}
