//! Shared status surface.
//!
//! One instance is created at startup and handed to every component
//! that reports or reads state. Each field has a single writer: the
//! tunnel owns `running`, `armed` and the last-blocked record, the
//! guard owns the last-foreground record. Reads are safe from any
//! task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Observable filter and guard state.
#[derive(Debug, Default)]
pub struct FilterStatus {
    running: AtomicBool,
    armed: AtomicBool,
    last_blocked: Mutex<Option<(String, Instant)>>,
    last_foreground: Mutex<Option<(String, Instant)>>,
}

impl FilterStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the packet loop is active.
    #[must_use]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Whether the blocklist has finished loading. While false, the
    /// filter answers SERVFAIL instead of forwarding.
    #[must_use]
    pub fn armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Within a session this only moves false to true; `stop` clears
    /// it for the next session.
    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }

    /// Most recently blocked domain and when it was blocked.
    #[must_use]
    pub fn last_blocked(&self) -> Option<(String, Instant)> {
        self.last_blocked.lock().clone()
    }

    pub fn record_blocked(&self, domain: &str) {
        *self.last_blocked.lock() = Some((domain.to_string(), Instant::now()));
    }

    /// Most recently observed foreground target and when it was seen.
    #[must_use]
    pub fn last_foreground(&self) -> Option<(String, Instant)> {
        self.last_foreground.lock().clone()
    }

    pub fn record_foreground(&self, target: &str) {
        *self.last_foreground.lock() = Some((target.to_string(), Instant::now()));
    }
}
