//! Block notification fan-out.
//!
//! The packet loop reports every loud block here. One debounce slot
//! covers the whole filter: the same domain re-blocked inside the
//! window is dropped entirely, since DNS retries arrive in bursts.
//! Everything that survives the debounce is recorded (status, event
//! channel); the overlay is additionally gated so silent blocks and
//! the protection app's own traffic never pop UI.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::FilterConfig;
use crate::overlay::{InterceptKind, Overlay};
use crate::status::FilterStatus;

/// Broadcast payload for a debounced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedEvent {
    pub domain: String,
}

/// Debounces blocks and fans them out to status, listeners and the
/// overlay.
pub struct BlockNotifier {
    status: Arc<FilterStatus>,
    overlay: Arc<dyn Overlay>,
    events: broadcast::Sender<BlockedEvent>,
    slot: Mutex<Option<(String, Instant)>>,
    debounce_window: Duration,
    foreground_stale: Duration,
    self_id: String,
}

impl BlockNotifier {
    #[must_use]
    pub fn new(
        status: Arc<FilterStatus>,
        overlay: Arc<dyn Overlay>,
        filter: &FilterConfig,
        self_id: String,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            status,
            overlay,
            events,
            slot: Mutex::new(None),
            debounce_window: Duration::from_millis(filter.block_debounce_ms),
            foreground_stale: Duration::from_millis(filter.foreground_stale_ms),
            self_id,
        }
    }

    /// Listen for debounced block events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BlockedEvent> {
        self.events.subscribe()
    }

    /// Report a block. `silent` suppresses the overlay but not the
    /// bookkeeping.
    pub fn notify(&self, domain: &str, silent: bool) {
        let now = Instant::now();
        {
            let mut slot = self.slot.lock();
            if let Some((last, at)) = slot.as_ref() {
                if last == domain && now.duration_since(*at) < self.debounce_window {
                    return;
                }
            }
            *slot = Some((domain.to_string(), now));
        }

        self.status.record_blocked(domain);
        let _ = self.events.send(BlockedEvent {
            domain: domain.to_string(),
        });

        if silent {
            return;
        }
        if self.own_app_foreground() {
            debug!(domain, "own app in foreground, not surfacing block");
            return;
        }
        self.overlay.show(InterceptKind::BlockedDomain, domain);
    }

    /// The protection app's own SDK traffic produces blocks too;
    /// showing those over its own UI would be absurd. Only a fresh
    /// observation counts, so a stale record cannot mute real blocks.
    fn own_app_foreground(&self) -> bool {
        match self.status.last_foreground() {
            Some((target, at)) => target == self.self_id && at.elapsed() < self.foreground_stale,
            None => false,
        }
    }
}
