//! Domain-per-line list parser.
//!
//! The format of the user-maintained custom list: one domain per line,
//! `#` starts a comment line, blank lines are skipped.

use std::io::BufRead;

use super::{BlocklistParser, ParseError};

/// Parser for newline-delimited domain lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainListParser;

impl BlocklistParser for DomainListParser {
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            entries.push(entry.to_string());
        }
        Ok(entries)
    }
}
