// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Origin gate for visitor sockets.
//!
//! The host is taken from `Origin`, or from `Referer` when `Origin` is absent
//! or unparseable, and matched against the desk's allow-list. Entries are
//! exact hosts or `*.suffix` wildcards. Matching ignores case, port and path.

use axum::http::HeaderMap;
use axum::http::header::{ORIGIN, REFERER};

/// Lower-cased host of a URL, or `None` if it has none.
pub fn extract_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = url::Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Host of the page that opened the socket.
pub fn request_host(headers: &HeaderMap) -> Option<String> {
    let header = |name| headers.get(name).and_then(|v| v.to_str().ok());
    header(ORIGIN)
        .and_then(extract_host)
        .or_else(|| header(REFERER).and_then(extract_host))
}

/// True if `host` matches any allow-list entry.
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        if entry.is_empty() {
            return false;
        }
        match entry.strip_prefix('*') {
            Some(suffix) => !suffix.is_empty() && host.ends_with(suffix),
            None => host == entry,
        }
    })
}

/// Applies the gate to a request. An empty allow-list admits nobody.
pub fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    match request_host(headers) {
        Some(host) => host_allowed(&host, allowed),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    fn headers(origin: Option<&str>, referer: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(o) = origin {
            h.insert(ORIGIN, HeaderValue::from_str(o).unwrap());
        }
        if let Some(r) = referer {
            h.insert(REFERER, HeaderValue::from_str(r).unwrap());
        }
        h
    }

    #[test]
    fn extracts_host_without_port_or_path() {
        assert_eq!(
            extract_host("https://Shop.Example.com:8443/cart?x=1").as_deref(),
            Some("shop.example.com")
        );
        assert_eq!(extract_host("null"), None);
        assert_eq!(extract_host(""), None);
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let allowed = list(&["Shop.Example.com"]);
        assert!(host_allowed("shop.example.com", &allowed));
        assert!(!host_allowed("evil.example.com", &allowed));
    }

    #[test]
    fn wildcard_matches_subdomains_only() {
        let allowed = list(&["*.pages.dev"]);
        assert!(host_allowed("demo.pages.dev", &allowed));
        assert!(host_allowed("a.b.pages.dev", &allowed));
        assert!(!host_allowed("pages.dev", &allowed));
        assert!(!host_allowed("evilpages.dev", &allowed));
    }

    #[test]
    fn origin_preferred_over_referer() {
        let allowed = list(&["shop.example.com"]);
        let h = headers(
            Some("https://evil.example.net"),
            Some("https://shop.example.com/page"),
        );
        assert!(!origin_allowed(&h, &allowed));
    }

    #[test]
    fn referer_used_when_origin_missing() {
        let allowed = list(&["shop.example.com"]);
        let h = headers(None, Some("https://shop.example.com:3000/checkout"));
        assert!(origin_allowed(&h, &allowed));

        let opaque = headers(Some("null"), Some("https://shop.example.com/"));
        assert!(origin_allowed(&opaque, &allowed));
    }

    #[test]
    fn no_headers_or_empty_list_rejects() {
        assert!(!origin_allowed(&headers(None, None), &list(&["shop.example.com"])));
        assert!(!origin_allowed(
            &headers(Some("https://shop.example.com"), None),
            &[]
        ));
    }
}
