//! Guard polling service.
//!
//! Drives the state machine on a fixed cadence: collect a pending
//! dismissal, take one foreground observation, transition, apply the
//! effect. Effects pass a final gate before touching the overlay so
//! the guard can never cover its own UI or an app that is no longer
//! guarded, whatever the machine believed when it decided.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::overlay::{InterceptKind, Overlay};
use crate::status::FilterStatus;

use super::machine::{transition, Effect, GuardContext, GuardEvent, GuardState};
use super::sources::SourceLadder;
use super::targets::GuardTargets;

pub struct GuardService {
    state: Mutex<GuardState>,
    targets: Arc<GuardTargets>,
    sources: SourceLadder,
    overlay: Arc<dyn Overlay>,
    status: Arc<FilterStatus>,
    self_id: String,
    poll_interval: Duration,
    overlay_timeout: Duration,
    dismiss_cooldown: Duration,
}

impl GuardService {
    #[must_use]
    pub fn new(
        config: &GuardConfig,
        targets: Arc<GuardTargets>,
        sources: SourceLadder,
        overlay: Arc<dyn Overlay>,
        status: Arc<FilterStatus>,
    ) -> Self {
        Self {
            state: Mutex::new(GuardState::Idle),
            targets,
            sources,
            overlay,
            status,
            self_id: config.self_id.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            overlay_timeout: Duration::from_millis(config.overlay_timeout_ms),
            dismiss_cooldown: Duration::from_millis(config.dismiss_cooldown_ms),
        }
    }

    /// Poll until the task is dropped.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// One poll step: dismissal first, then the fresh observation, so
    /// a dismissed overlay can re-arm within the same tick once the
    /// cooldown allows it.
    pub fn tick(&self) {
        if self.overlay.take_dismissed() {
            self.apply(&GuardEvent::Dismissed);
        }

        let observed = self.sources.observe().map(|sample| {
            self.status.record_foreground(&sample.app);
            sample.app
        });
        self.apply(&GuardEvent::Observed(observed));
    }

    fn apply(&self, event: &GuardEvent) {
        let ctx = GuardContext {
            targets: self.targets.as_ref(),
            self_id: &self.self_id,
            overlay_timeout: self.overlay_timeout,
            dismiss_cooldown: self.dismiss_cooldown,
            now: Instant::now(),
        };

        let mut state = self.state.lock();
        let (next, effect) = transition(state.clone(), event, &ctx);
        *state = next;
        if let Some(effect) = effect {
            self.apply_effect(&mut state, effect);
        }
    }

    /// Carry out an effect. Show requests re-check the target at the
    /// last moment; a refusal drops the machine back to idle.
    fn apply_effect(&self, state: &mut GuardState, effect: Effect) {
        match effect {
            Effect::ShowOverlay(app) => {
                if app == self.self_id || !self.targets.contains(&app) {
                    warn!(app = %app, "refusing overlay for unguarded target");
                    self.overlay.hide();
                    *state = GuardState::Idle;
                } else {
                    debug!(app = %app, "guarded app in foreground, intercepting");
                    self.overlay.show(InterceptKind::GuardedApp, &app);
                }
            }
            Effect::HideOverlay => self.overlay.hide(),
        }
    }
}
