//! Guard state machine.
//!
//! A pure transition function over three states: idle, overlay up,
//! and the cooldown that follows a manual dismissal. The service
//! layer feeds it observations and dismissals and applies the
//! returned effect; nothing here touches the overlay or the clock
//! directly, which keeps every path unit-testable.

use std::time::{Duration, Instant};

use super::targets::GuardTargets;

/// Where the guard currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Nothing shown, watching the foreground.
    Idle,
    /// The overlay covers `target` since `since`.
    OverlayShowing { target: String, since: Instant },
    /// The user dismissed the overlay; re-interception waits out the
    /// cooldown so the dismissal actually means something.
    PostDismissCooldown { since: Instant },
}

/// Input to one transition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEvent {
    /// Foreground observation; `None` when no source produced a
    /// usable signal this tick.
    Observed(Option<String>),
    /// The user dismissed the overlay.
    Dismissed,
}

/// What the service must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowOverlay(String),
    HideOverlay,
}

/// Read-only surroundings of a transition.
pub struct GuardContext<'a> {
    pub targets: &'a GuardTargets,
    pub self_id: &'a str,
    /// Overlay auto-hides after this long without any foreground
    /// signal.
    pub overlay_timeout: Duration,
    /// Minimum pause between a dismissal and the next interception.
    pub dismiss_cooldown: Duration,
    pub now: Instant,
}

/// Advance the machine by one event.
#[must_use]
pub fn transition(
    state: GuardState,
    event: &GuardEvent,
    ctx: &GuardContext<'_>,
) -> (GuardState, Option<Effect>) {
    match state {
        GuardState::Idle => transition_idle(event, ctx),
        GuardState::OverlayShowing { target, since } => {
            transition_showing(target, since, event, ctx)
        }
        GuardState::PostDismissCooldown { since } => transition_cooldown(since, event, ctx),
    }
}

fn transition_idle(event: &GuardEvent, ctx: &GuardContext<'_>) -> (GuardState, Option<Effect>) {
    match event {
        // A dismissal only means something while the overlay is up.
        GuardEvent::Dismissed | GuardEvent::Observed(None) => (GuardState::Idle, None),
        GuardEvent::Observed(Some(app)) => {
            if app.as_str() == ctx.self_id || !ctx.targets.contains(app) {
                (GuardState::Idle, None)
            } else {
                (
                    GuardState::OverlayShowing {
                        target: app.clone(),
                        since: ctx.now,
                    },
                    Some(Effect::ShowOverlay(app.clone())),
                )
            }
        }
    }
}

fn transition_showing(
    target: String,
    since: Instant,
    event: &GuardEvent,
    ctx: &GuardContext<'_>,
) -> (GuardState, Option<Effect>) {
    match event {
        GuardEvent::Dismissed => (
            GuardState::PostDismissCooldown { since: ctx.now },
            Some(Effect::HideOverlay),
        ),
        // Our own UI coming to the front includes the overlay itself.
        GuardEvent::Observed(Some(app)) if app.as_str() == ctx.self_id => {
            (GuardState::Idle, Some(Effect::HideOverlay))
        }
        GuardEvent::Observed(Some(app)) if *app == target => {
            (GuardState::OverlayShowing { target, since }, None)
        }
        // Another app took over; drop the overlay and start fresh.
        // If that app is guarded too, the next observation from idle
        // intercepts it without any cooldown.
        GuardEvent::Observed(Some(_)) => (GuardState::Idle, Some(Effect::HideOverlay)),
        GuardEvent::Observed(None) => {
            if ctx.now.duration_since(since) > ctx.overlay_timeout {
                (GuardState::Idle, Some(Effect::HideOverlay))
            } else {
                (GuardState::OverlayShowing { target, since }, None)
            }
        }
    }
}

fn transition_cooldown(
    since: Instant,
    event: &GuardEvent,
    ctx: &GuardContext<'_>,
) -> (GuardState, Option<Effect>) {
    match event {
        GuardEvent::Dismissed | GuardEvent::Observed(None) => {
            (GuardState::PostDismissCooldown { since }, None)
        }
        GuardEvent::Observed(Some(app)) if app.as_str() == ctx.self_id => (GuardState::Idle, None),
        GuardEvent::Observed(Some(app)) => {
            if ctx.now.duration_since(since) < ctx.dismiss_cooldown {
                (GuardState::PostDismissCooldown { since }, None)
            } else if ctx.targets.contains(app) {
                (
                    GuardState::OverlayShowing {
                        target: app.clone(),
                        since: ctx.now,
                    },
                    Some(Effect::ShowOverlay(app.clone())),
                )
            } else {
                (GuardState::Idle, None)
            }
        }
    }
}
