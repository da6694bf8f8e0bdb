//! URL filter construction
//!
//! A URL filter is the regular expression that decides whether a resource URL
//! belongs to a tracker rule. The same string is emitted into compiled rules
//! and compiled into a [`Regex`] by the detector, so both paths agree on what
//! a rule matches.

use regex::{Regex, RegexBuilder};

use crate::error::TrackerError;

/// Any web scheme, including a missing one.
pub const SCHEME_PREFIX: &str = "^(https?)?(wss?)?://";

/// Zero or more subdomain labels in front of the tracker domain.
pub const SUBDOMAIN_PREFIX: &str = "([a-z0-9_-]+\\.)*";

/// Optional port, then the path separator.
pub const HOST_TERMINATOR: &str = "(:[0-9]+)?/";

/// Escape a domain for use inside a URL filter.
pub fn escape_domain(domain: &str) -> String {
    domain.replace('.', "\\.")
}

/// Build the URL filter for a rule pattern on a tracker domain.
///
/// The pattern is matched against whatever follows `host/`; a leading `/`
/// on the pattern is dropped.
pub fn url_filter(domain: &str, pattern: &str, subdomain_match: bool) -> String {
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    let mut filter = String::with_capacity(
        SCHEME_PREFIX.len() + SUBDOMAIN_PREFIX.len() + domain.len() * 2 + HOST_TERMINATOR.len() + pattern.len(),
    );
    filter.push_str(SCHEME_PREFIX);
    if subdomain_match {
        filter.push_str(SUBDOMAIN_PREFIX);
    }
    filter.push_str(&escape_domain(domain));
    filter.push_str(HOST_TERMINATOR);
    filter.push_str(pattern);
    filter
}

/// The filter that matches every URL on a tracker domain or its subdomains.
pub fn scope_filter(domain: &str) -> String {
    url_filter(domain, "", true)
}

/// Compile a URL filter. Hosts compare URLs case-insensitively.
pub fn compile_filter(filter: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(filter).case_insensitive(true).build()
}

/// Reject pattern syntax the content blocking host cannot express.
pub fn check_pattern_syntax(pattern: &str) -> Result<(), TrackerError> {
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '|' | '{' => {
                return Err(TrackerError::UnsupportedSyntax {
                    pattern: pattern.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(())
}

/// Host-side spelling of "this domain and all its subdomains".
pub fn domain_entry(domain: &str) -> String {
    format!("*{domain}")
}
