//! Hosts-file format parser.
//!
//! The main list ships in standard `/etc/hosts` sinkhole format, the
//! convention of the big published blocklists: `0.0.0.0 domain [domain
//! ...]`. Only sinkhole lines contribute entries; system hostnames and
//! bare addresses are dropped.

use std::io::BufRead;

use super::{BlocklistParser, ParseError};

/// Addresses marking a line as a sinkhole entry.
const SINKHOLE_ADDRS: &[&str] = &["0.0.0.0", "127.0.0.1"];

/// Parser for hosts-file formatted lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostsFileParser;

impl BlocklistParser for HostsFileParser {
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<String>, ParseError> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            // Inline comments end the data portion of the line.
            let data = line.split('#').next().unwrap_or("").trim();
            if data.is_empty() {
                continue;
            }

            let mut fields = data.split_whitespace();
            let Some(addr) = fields.next() else { continue };
            if !SINKHOLE_ADDRS.contains(&addr) {
                continue;
            }

            for host in fields {
                if is_system_host(host) || looks_like_address(host) {
                    continue;
                }
                entries.push(host.to_string());
            }
        }
        Ok(entries)
    }
}

/// Hostnames that appear in every hosts file but are not block targets.
fn is_system_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host.starts_with("ip6-")
        || matches!(
            host.as_str(),
            "localhost" | "localhost.localdomain" | "local" | "broadcasthost"
        )
}

/// Bare addresses sometimes appear in the hostname column of published
/// lists; they can never match a queried name.
fn looks_like_address(host: &str) -> bool {
    if host.contains(':') {
        return true;
    }
    let mut parts = 0;
    for part in host.split('.') {
        if part.parse::<u8>().is_err() {
            return false;
        }
        parts += 1;
    }
    parts >= 2
}
