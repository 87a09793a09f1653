//! Header sanitization for forwarded requests and replayed responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before a request leaves for the origin
//! - Strip them again when a cached response is replayed to a client
//! - Canonicalize header names stored in cache entries
//!
//! # Design Decisions
//! - Name comparison is case-insensitive; names are not trimmed
//! - Every value of a kept header survives, in order

use axum::http::HeaderMap;

/// Headers meaningful only for a single transport hop.
pub const HOP_BY_HOP: [&str; 9] = [
    "Connection",
    "Keep-Alive",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "TE",
    "Trailers",
    "Transfer-Encoding",
    "Upgrade",
    "Via",
];

/// True if `name` is one of [`HOP_BY_HOP`], ignoring case.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Copy `headers`, dropping hop-by-hop entries.
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// `content-type` → `Content-Type`. Names containing anything other than
/// token characters are returned unchanged.
pub fn canonical_name(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
