//! Fast URL parsing utilities for the classification hot path
//!
//! These functions work directly on string slices and only allocate when a
//! URL has to be rewritten into its normalized form.

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Schemes a tracked resource can be loaded over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

/// Fast scheme extraction without URL parsing.
/// Returns `None` for anything that is not a web scheme.
#[inline]
pub fn extract_scheme(url: &str) -> Option<Scheme> {
    let bytes = url.as_bytes();
    if bytes.len() < 5 {
        return None;
    }

    // Lowercase first char
    let c0 = bytes[0] | 0x20;

    match c0 {
        b'h' => {
            if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
                Some(Scheme::Https)
            } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
                Some(Scheme::Http)
            } else {
                None
            }
        }
        b'w' => {
            if bytes.len() >= 6 && bytes[..6].eq_ignore_ascii_case(b"wss://") {
                Some(Scheme::Wss)
            } else if bytes[..5].eq_ignore_ascii_case(b"ws://") {
                Some(Scheme::Ws)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();
    let authority_end = get_authority_end(url, scheme_end);

    // Skip userinfo
    let mut host_start = scheme_end;
    if let Some(at) = bytes[scheme_end..authority_end].iter().rposition(|&b| b == b'@') {
        host_start = scheme_end + at + 1;
    }

    let mut host_end = authority_end;
    for (i, &b) in bytes[host_start..authority_end].iter().enumerate() {
        if b == b':' {
            host_end = host_start + i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// End of the authority component (first of '/', '?', '#', or end of string).
#[inline]
fn get_authority_end(url: &str, scheme_end: usize) -> usize {
    url.as_bytes()[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(url.len(), |i| scheme_end + i)
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL, not yet validated or lowercased.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Whether a string is a syntactically usable host name.
pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('.')
        && !host.contains("..")
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}

/// Extract, validate and lowercase the host of any `scheme://` URL.
///
/// A trailing dot is dropped so that `example.com.` and `example.com` name
/// the same site.
pub fn host_of(url: &str) -> Option<String> {
    let host = extract_host(url.trim())?.trim_end_matches('.');
    if !is_valid_host(host) {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

// =============================================================================
// Resource URL Normalization
// =============================================================================

/// A resource URL with its host located and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUrl {
    /// Full URL with an explicit scheme and at least a root path
    pub url: String,
    pub host: String,
}

/// Normalize a resource URL for matching.
///
/// Scheme-relative URLs (`//host/path`) are treated as `http:`. Only web
/// schemes are accepted. A URL without a path gets `/` so that URL filters
/// anchored on `host/` still match it.
pub fn normalize_resource_url(resource: &str) -> Option<ResourceUrl> {
    let trimmed = resource.trim();
    let mut url = if trimmed.starts_with("//") {
        format!("http:{trimmed}")
    } else {
        trimmed.to_string()
    };

    extract_scheme(&url)?;
    let host = host_of(&url)?;

    let scheme_end = get_scheme_end(&url)?;
    let authority_end = get_authority_end(&url, scheme_end);
    if url.as_bytes().get(authority_end) != Some(&b'/') {
        url.insert(authority_end, '/');
    }

    Some(ResourceUrl { url, host })
}
