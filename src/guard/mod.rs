//! Foreground application guard.
//!
//! Independent of the DNS filter: watches which application is in the
//! foreground and puts the overlay over the ones the user chose to
//! guard. The pieces are a pure state machine, a persisted target
//! set, pluggable observation sources and the polling service that
//! ties them to the overlay.

pub mod machine;
pub mod service;
pub mod sources;
pub mod targets;

pub use machine::{Effect, GuardEvent, GuardState};
pub use service::GuardService;
pub use sources::{ForegroundSample, ForegroundSource, NoSignalSource, SourceLadder};
pub use targets::{GuardTargets, TargetsError};
