//! Breakwater - a DNS-layer traffic filter with an application guard.
//!
//! Breakwater routes DNS traffic through a TUN device, answers queries
//! for blocklisted domains with a sentinel address, and forwards the
//! rest to a real resolver. A separate guard watches the foreground
//! application and covers guarded ones with an overlay.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`packet`]: IPv4/UDP/TCP/DNS parsing and response construction
//! - [`blocklist`]: Blocklist parsing, loading and the atomic snapshot store
//! - [`classify`]: The verdict for a queried domain
//! - [`tunnel`]: Device access, lifecycle and the packet loop
//! - [`forward`]: Upstream resolver client
//! - [`notify`]: Debounced block notifications
//! - [`guard`]: Foreground application guard
//! - [`overlay`], [`status`]: Surfaces shared by the filter and the guard
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The device, overlay and foreground sources sit behind traits, so the
//! whole pipeline runs in tests without a real interface. The hot path
//! itself is plain functions over byte slices:
//!
//! ```rust
//! use breakwater::blocklist::ListSnapshot;
//! use breakwater::classify::{classify, SuffixPolicy, Verdict};
//!
//! let snapshot = ListSnapshot::build(vec!["ads.example.com".into()], vec![]);
//! let policy = SuffixPolicy::new(vec![], vec![]);
//! assert_eq!(classify("ads.example.com", &snapshot, &policy), Verdict::Block);
//! ```

pub mod blocklist;
pub mod classify;
pub mod config;
pub mod error;
pub mod forward;
pub mod guard;
pub mod metrics;
pub mod notify;
pub mod overlay;
pub mod packet;
pub mod status;
pub mod tunnel;

pub use config::Config;
pub use error::{Error, Result};
