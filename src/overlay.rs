//! Interception overlay seam.
//!
//! The overlay itself is host UI and lives outside this crate.
//! Components talk to it through [`Overlay`]: the block notifier shows
//! blocked-domain intercepts, the guard shows and force-hides
//! guarded-app intercepts and consumes the user's dismissal signal.

use tracing::{debug, info};

/// What an intercept is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptKind {
    /// A blocked domain was queried; payload is the domain.
    BlockedDomain,
    /// A guarded application came to the foreground; payload is the
    /// application identity.
    GuardedApp,
}

/// Host-provided interception surface.
pub trait Overlay: Send + Sync {
    /// Present an intercept. Showing while one is already up replaces
    /// it.
    fn show(&self, kind: InterceptKind, payload: &str);

    /// Take the overlay down immediately, without a dismissal signal.
    fn hide(&self);

    /// Whether the user dismissed the overlay since the last call.
    /// Consuming: a dismissal is reported exactly once.
    fn take_dismissed(&self) -> bool;
}

/// Overlay that only logs. Used by the standalone binary, where no
/// host UI exists.
#[derive(Debug, Default)]
pub struct LogOverlay;

impl Overlay for LogOverlay {
    fn show(&self, kind: InterceptKind, payload: &str) {
        info!(kind = ?kind, payload, "intercept");
    }

    fn hide(&self) {
        debug!("intercept hidden");
    }

    fn take_dismissed(&self) -> bool {
        false
    }
}
