//! Blocklist sources and the snapshot store.
//!
//! Two sources feed the filter: a large main list (typically hosts-file
//! formatted) and a small custom list maintained by the user (one domain
//! per line). Parsed entries are normalized into immutable snapshots
//! that the packet path reads without locking; see [`store::ListStore`].

mod domains;
mod hosts;
pub mod loader;
pub mod store;

use std::io::BufRead;

pub use domains::DomainListParser;
pub use hosts::HostsFileParser;
pub use loader::{FileLoader, LoadError};
pub use store::{ListSnapshot, ListStore};

use crate::config::ListFormat;

/// Error type for blocklist parsing operations.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error during reading.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// A blocklist format parser.
///
/// Implementations extract bare domain names from one source format.
/// Entries come back as they appeared in the file; normalization is the
/// store's job.
pub trait BlocklistParser: Send + Sync {
    /// Parse blocklist content into domain entries.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if reading fails.
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError>;
}

/// Returns the parser for the given list format.
#[must_use]
pub fn parser_for_format(format: ListFormat) -> Box<dyn BlocklistParser> {
    match format {
        ListFormat::Domains => Box::new(DomainListParser),
        ListFormat::Hosts => Box::new(HostsFileParser),
    }
}
