//! Conditional request support for static assets
//!
//! `ETag`s are content hashes; `If-None-Match` is honoured so browsers can
//! revalidate the front-end bundle cheaply.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use hyper::header::{HeaderMap, IF_NONE_MATCH};

/// Quoted strong `ETag` for `content`, e.g. `"9f86d081884c7d65"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// True when the client's `If-None-Match` covers `etag` (the response should be 304)
///
/// Accepts a list of tags, weak tags (`W/"..."`) and the `*` wildcard.
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|tags| {
        tags.split(',')
            .map(|tag| tag.trim().trim_start_matches("W/"))
            .any(|tag| tag == etag || tag == "*")
    })
}

/// [`check_etag_match`] against request headers
pub fn is_not_modified(headers: &HeaderMap, etag: &str) -> bool {
    check_etag_match(
        headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()),
        etag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_etag() {
        let etag = generate_etag(b"<!doctype html><div id=\"map\"></div>");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag, generate_etag(b"<!doctype html><div id=\"map\"></div>"));
        assert_ne!(etag, generate_etag(b"<!doctype html>"));
    }

    #[test]
    fn test_check_etag_match() {
        let etag = "\"abc123\"";
        assert!(check_etag_match(Some("\"abc123\""), etag));
        assert!(check_etag_match(Some("\"xyz\", \"abc123\""), etag));
        assert!(check_etag_match(Some("W/\"abc123\""), etag));
        assert!(check_etag_match(Some("*"), etag));
        assert!(!check_etag_match(Some("\"different\""), etag));
        assert!(!check_etag_match(None, etag));
    }

    #[test]
    fn test_is_not_modified_reads_header() {
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, "\"a\""));
        headers.insert(IF_NONE_MATCH, "\"a\"".parse().unwrap());
        assert!(is_not_modified(&headers, "\"a\""));
    }
}
