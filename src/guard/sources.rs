//! Foreground observation sources.
//!
//! Platforms report the foreground application through different
//! channels with different latencies, so the guard consults a primary
//! source first and falls back to a coarser one. Fallback samples only
//! count while fresh; a stale reading must not pin the machine to an
//! app that already left the screen.

use std::time::{Duration, Instant};

use crate::config::GuardConfig;

/// One foreground observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundSample {
    pub app: String,
    /// When the underlying transition was recorded.
    pub observed_at: Instant,
}

/// Supplies the most recent foreground transition within `window`.
pub trait ForegroundSource: Send + Sync {
    fn current(&self, window: Duration) -> Option<ForegroundSample>;
}

/// Source for platforms without any foreground signal. The guard then
/// never intercepts, it only idles.
pub struct NoSignalSource;

impl ForegroundSource for NoSignalSource {
    fn current(&self, _window: Duration) -> Option<ForegroundSample> {
        None
    }
}

/// Primary source with an optional gated fallback.
pub struct SourceLadder {
    primary: Box<dyn ForegroundSource>,
    fallback: Option<Box<dyn ForegroundSource>>,
    window: Duration,
    sample_max_age: Duration,
}

impl SourceLadder {
    #[must_use]
    pub fn new(
        config: &GuardConfig,
        primary: Box<dyn ForegroundSource>,
        fallback: Option<Box<dyn ForegroundSource>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            window: Duration::from_millis(config.source_window_ms),
            sample_max_age: Duration::from_millis(config.sample_max_age_ms),
        }
    }

    /// Best available observation for this tick, if any.
    #[must_use]
    pub fn observe(&self) -> Option<ForegroundSample> {
        if let Some(sample) = self.primary.current(self.window) {
            return Some(sample);
        }
        self.fallback
            .as_ref()?
            .current(self.window)
            .filter(|sample| sample.observed_at.elapsed() <= self.sample_max_age)
    }
}
