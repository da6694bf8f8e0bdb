//! Public Suffix List (PSL) utilities for eTLD+1 extraction
//!
//! A [`SuffixList`] is either backed by a parsed public suffix list or, when
//! none is supplied, by a small two-part TLD heuristic. The list is owned by
//! whoever needs it; there is no process-wide PSL state.
//!
//! # Examples
//!
//! ```
//! use tb_core::psl::SuffixList;
//!
//! let suffixes = SuffixList::heuristic();
//! assert_eq!(suffixes.registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(suffixes.registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

use std::fmt;

use publicsuffix::{List, Psl};

pub use crate::error::PslError;
use crate::url::is_valid_host;

// =============================================================================
// Domain Normalization
// =============================================================================

/// Normalize a domain name from a descriptor file or command line.
///
/// Lowercases, trims whitespace and surrounding dots. Returns `None` when the
/// result is not a usable host name.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let d = domain.trim().trim_matches('.').to_ascii_lowercase();
    if is_valid_host(&d) {
        Some(d)
    } else {
        None
    }
}

// =============================================================================
// Suffix List
// =============================================================================

/// Common two-part TLDs for fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Registrable-domain oracle used for suffix walks.
#[derive(Default)]
pub struct SuffixList {
    list: Option<List>,
}

impl SuffixList {
    /// A suffix list that only knows the built-in two-part TLDs.
    pub fn heuristic() -> Self {
        Self { list: None }
    }

    /// Parse a public suffix list in its published text format.
    pub fn from_psl_text(text: &str) -> Result<Self, PslError> {
        let list: List = text.parse().map_err(|e| PslError::Parse(format!("{e:?}")))?;
        Ok(Self { list: Some(list) })
    }

    pub fn is_heuristic(&self) -> bool {
        self.list.is_none()
    }

    /// Get the eTLD+1 (registrable domain) for a lowercased host.
    ///
    /// Hosts that are themselves public suffixes, single labels or IP
    /// addresses are returned unchanged.
    pub fn registrable_domain(&self, host: &str) -> String {
        let host = host.trim_end_matches('.');

        if let Some(ref list) = self.list {
            return list
                .domain(host.as_bytes())
                .and_then(|domain| std::str::from_utf8(domain.as_bytes()).ok().map(str::to_string))
                .unwrap_or_else(|| host.to_string());
        }

        let labels: Vec<&str> = host.split('.').collect();
        fallback_etld1(&labels)
    }

    /// Walk host suffixes from most specific down to the public suffix.
    ///
    /// The public suffix itself is included when it has at least two labels
    /// (`github.io`, `co.uk`), so tracker and entity domains registered at a
    /// private suffix are still found. Single-label suffixes are never
    /// yielded unless the host is a single label.
    pub fn walk_suffixes<'a>(&self, host: &'a str) -> HostSuffixIter<'a> {
        let etld1 = self.registrable_domain(host);
        let floor_len = if host.ends_with(etld1.as_str()) {
            match get_parent_domain(&etld1) {
                Some(suffix) if suffix.contains('.') => suffix.len(),
                _ => etld1.len(),
            }
        } else {
            host.len()
        };
        HostSuffixIter {
            current: host,
            floor_len,
        }
    }

    /// Check if two hosts share the same eTLD+1.
    pub fn is_same_site(&self, host1: &str, host2: &str) -> bool {
        self.registrable_domain(host1) == self.registrable_domain(host2)
    }
}

impl fmt::Debug for SuffixList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuffixList")
            .field("source", &if self.list.is_some() { "psl" } else { "heuristic" })
            .finish()
    }
}

/// Fallback eTLD+1 heuristic.
fn fallback_etld1(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    // Check for common two-part TLDs
    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    // Default: last 2 labels
    labels[n - 2..].join(".")
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full to its public suffix.
pub struct HostSuffixIter<'a> {
    current: &'a str,
    floor_len: usize,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() || self.current.len() < self.floor_len {
            return None;
        }

        let result = self.current;

        // Move to parent
        match get_parent_domain(self.current) {
            Some(parent) if parent.len() >= self.floor_len => self.current = parent,
            _ => self.current = "",
        }

        Some(result)
    }
}
