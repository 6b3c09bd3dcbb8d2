//! Domain classification.
//!
//! Every DNS question goes through [`classify`], which decides between
//! answering with the sentinel address, failing the query while the
//! lists are still loading, or letting it through to the upstream
//! resolver. The decision order is fixed: whitelist first, readiness
//! second, block sets last.

use crate::blocklist::ListSnapshot;

/// Disposition of a queried domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to the upstream resolver.
    Allow,
    /// Answer with the sentinel address and surface the block.
    Block,
    /// Answer with the sentinel address without surfacing anything.
    /// Used for ad/analytics infrastructure that apps probe constantly.
    BlockSilent,
    /// Lists not loaded yet; fail the query so nothing slips through.
    Defer,
}

/// Suffix lists that modify classification: whitelisted suffixes always
/// win, infrastructure suffixes turn a block silent.
#[derive(Debug, Clone)]
pub struct SuffixPolicy {
    whitelist: Vec<String>,
    infrastructure: Vec<String>,
}

impl SuffixPolicy {
    #[must_use]
    pub fn new(whitelist: Vec<String>, infrastructure: Vec<String>) -> Self {
        Self {
            whitelist: normalize_all(whitelist),
            infrastructure: normalize_all(infrastructure),
        }
    }

    fn is_whitelisted(&self, domain: &str) -> bool {
        matches_suffix(&self.whitelist, domain)
    }

    fn is_infrastructure(&self, domain: &str) -> bool {
        matches_suffix(&self.infrastructure, domain)
    }
}

/// Classify `name` against the snapshot under `policy`.
///
/// The name is normalized (lowercase, one trailing dot removed), then:
/// whitelisted suffixes allow unconditionally, an unready snapshot
/// defers, and otherwise the name is walked most-specific to least
/// against the block sets. The walk stops before the bare top-level
/// label, so single-label entries never match.
#[must_use]
pub fn classify(name: &str, snapshot: &ListSnapshot, policy: &SuffixPolicy) -> Verdict {
    let domain = normalize(name);

    if policy.is_whitelisted(&domain) {
        return Verdict::Allow;
    }
    if !snapshot.ready() {
        return Verdict::Defer;
    }

    let mut candidate = domain.as_str();
    while candidate.contains('.') {
        if snapshot.contains(candidate) {
            return if policy.is_infrastructure(&domain) {
                Verdict::BlockSilent
            } else {
                Verdict::Block
            };
        }
        let Some((_, rest)) = candidate.split_once('.') else {
            break;
        };
        candidate = rest;
    }

    Verdict::Allow
}

/// Lowercase and remove a single trailing dot.
#[must_use]
pub fn normalize(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_ascii_lowercase()
}

fn normalize_all(suffixes: Vec<String>) -> Vec<String> {
    suffixes.into_iter().map(|s| normalize(&s)).collect()
}

/// Suffix match on label boundaries: `domain` equals the suffix or ends
/// with `.suffix`.
fn matches_suffix(suffixes: &[String], domain: &str) -> bool {
    suffixes.iter().any(|suffix| {
        let suffix = suffix.as_str();
        domain == suffix
            || (domain.len() > suffix.len()
                && domain.ends_with(suffix)
                && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.')
    })
}
