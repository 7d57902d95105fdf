//! Mapping between real URLs and the proxy's `/view/...` path space.
//!
//! A remote resource `https://example.com/a/b?q=1` lives at
//! `/view/https/example.com/a/b?q=1` inside the proxy. Everything after the
//! host segment is passed through without decoding.

use std::fmt;

use axum::http::Uri;
use url::Url;

use crate::error::{ProxyError, Result};

/// Leading segment of every proxied path.
pub const VIEW_ROOT: &str = "/view/";

/// The remote resource a proxy path points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub scheme: String,
    /// Host, including an explicit port when present.
    pub host: String,
    /// Always starts with `/`.
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl ProxyTarget {
    /// Decodes an inbound `/view/<scheme>/<host>/<rest...>` path.
    ///
    /// Paths without both a scheme and a host segment are rejected rather
    /// than guessed at.
    pub fn decode(path: &str, raw_query: Option<&str>) -> Result<Self> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 4 || !parts[0].is_empty() || parts[1] != "view" {
            return Err(ProxyError::InvalidPath(path.to_string()));
        }

        let scheme = parts[2];
        let host = parts[3];
        if scheme.is_empty() || host.is_empty() {
            return Err(ProxyError::InvalidPath(path.to_string()));
        }
        if scheme != "http" && scheme != "https" {
            return Err(ProxyError::UnsupportedScheme(scheme.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: format!("/{}", parts[4..].join("/")),
            query: non_empty(raw_query),
            fragment: None,
        })
    }

    /// Decodes a complete proxy URL, including any `?query` and `#fragment`.
    pub fn from_proxy_url(proxy_url: &str) -> Result<Self> {
        let (rest, fragment) = match proxy_url.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (proxy_url, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let mut target = Self::decode(path, query)?;
        target.fragment = non_empty(fragment);
        Ok(target)
    }

    /// The path segment identifying this origin, e.g. `/view/https/example.com/`.
    pub fn url_prefix(&self) -> String {
        format!("{}{}/{}/", VIEW_ROOT, self.scheme, self.host)
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Absolute URI for the outbound request. The fragment is never sent.
    pub fn to_uri(&self) -> Result<Uri> {
        let mut uri = format!("{}{}", self.origin(), self.path);
        if let Some(query) = &self.query {
            uri.push('?');
            uri.push_str(query);
        }
        uri.parse()
            .map_err(|err: axum::http::uri::InvalidUri| ProxyError::InvalidPath(err.to_string()))
    }

    /// Proxy path for this target.
    pub fn encode(&self) -> String {
        let mut encoded = format!("{}{}/{}{}", VIEW_ROOT, self.scheme, self.host, self.path);
        append_suffix(&mut encoded, self.query.as_deref(), self.fragment.as_deref());
        encoded
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin(), self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// Encodes an absolute URL into the proxy path space.
pub fn encode(url: &Url) -> String {
    let mut encoded = format!("{}{}/{}{}", VIEW_ROOT, url.scheme(), authority(url), url.path());
    append_suffix(&mut encoded, url.query(), url.fragment());
    encoded
}

/// Parses an absolute or protocol-relative href and encodes it.
///
/// Protocol-relative hrefs default to https. Returns `None` when the href
/// does not parse or has no host.
pub fn encode_href(href: &str) -> Option<String> {
    let parsed = if href.starts_with("//") {
        Url::parse(&format!("https:{}", href))
    } else {
        Url::parse(href)
    };
    match parsed {
        Ok(url) if url.host_str().is_some_and(|host| !host.is_empty()) => Some(encode(&url)),
        _ => None,
    }
}

/// Resolves an attribute value found in a proxied page.
///
/// Absolute hrefs are re-encoded. Root-relative hrefs are placed under
/// `url_prefix`. Everything else comes back unchanged.
pub fn resolve_relative(href: &str, url_prefix: &str) -> String {
    if is_absolute(href) {
        return encode_href(href).unwrap_or_else(|| href.to_string());
    }
    if href.starts_with('/') {
        let split = href.find(['?', '#']).unwrap_or(href.len());
        let (path, suffix) = href.split_at(split);
        return format!(
            "{}{}{}",
            url_prefix.trim_end_matches('/'),
            clean_path(path),
            suffix
        );
    }
    href.to_string()
}

fn is_absolute(href: &str) -> bool {
    let lower = href.get(..8).unwrap_or(href).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || href.starts_with("//")
}

/// Collapses `.`, `..` and empty segments of a rooted path.
///
/// `..` at the root is dropped, so the result never climbs above `/`.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if trailing && cleaned.len() > 1 {
        cleaned.push('/');
    }
    cleaned
}

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn append_suffix(out: &mut String, query: Option<&str>, fragment: Option<&str>) {
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        out.push('#');
        out.push_str(fragment);
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/view/https/example.com/";

    #[test]
    fn test_encode_full_url() {
        let url = Url::parse("https://example.com:8443/a/b.html?x=1&y=2#top").unwrap();
        assert_eq!(encode(&url), "/view/https/example.com:8443/a/b.html?x=1&y=2#top");
    }

    #[test]
    fn test_encode_protocol_relative_defaults_to_https() {
        assert_eq!(
            encode_href("//cdn.example.org/lib.js").as_deref(),
            Some("/view/https/cdn.example.org/lib.js")
        );
    }

    #[test]
    fn test_roundtrip() {
        let urls = [
            "http://example.com/",
            "https://example.com/a/b/c.html",
            "https://example.com:8443/search?q=rust&lang=en",
            "https://sub.example.org/docs/#section-2",
            "http://127.0.0.1:3000/api/v1?x=1#frag",
            "https://example.com/%E6%97%A5%E6%9C%AC/",
        ];
        for raw in urls {
            let url = Url::parse(raw).unwrap();
            let target = ProxyTarget::from_proxy_url(&encode(&url)).unwrap();
            assert_eq!(Url::parse(&target.to_string()).unwrap(), url, "{}", raw);
            assert_eq!(target.encode(), encode(&url), "{}", raw);
        }
    }

    #[test]
    fn test_decode_splits_segments() {
        let target = ProxyTarget::decode("/view/https/example.com/a/b", Some("q=1")).unwrap();
        assert_eq!(target.scheme, "https");
        assert_eq!(target.host, "example.com");
        assert_eq!(target.path, "/a/b");
        assert_eq!(target.query.as_deref(), Some("q=1"));
        assert_eq!(target.url_prefix(), PREFIX);
        assert_eq!(
            target.to_uri().unwrap().to_string(),
            "https://example.com/a/b?q=1"
        );
    }

    #[test]
    fn test_decode_host_only() {
        let target = ProxyTarget::decode("/view/http/example.com", None).unwrap();
        assert_eq!(target.path, "/");
        let target = ProxyTarget::decode("/view/http/example.com/", Some("")).unwrap();
        assert_eq!(target.path, "/");
        assert_eq!(target.query, None);
    }

    #[test]
    fn test_decode_rejects_short_paths() {
        for path in ["/view/https", "/view/", "/view", "/view//example.com/x", "/view/https//x"] {
            assert!(
                matches!(ProxyTarget::decode(path, None), Err(ProxyError::InvalidPath(_))),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_decode_rejects_other_schemes() {
        assert!(matches!(
            ProxyTarget::decode("/view/ftp/example.com/file", None),
            Err(ProxyError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_resolve_absolute() {
        assert_eq!(
            resolve_relative("http://cdn.example.org/x.png", PREFIX),
            "/view/http/cdn.example.org/x.png"
        );
        assert_eq!(
            resolve_relative("HTTPS://Example.com/Page?id=3#c", PREFIX),
            "/view/https/example.com/Page?id=3#c"
        );
    }

    #[test]
    fn test_resolve_root_relative() {
        assert_eq!(resolve_relative("/about", PREFIX), "/view/https/example.com/about");
        assert_eq!(resolve_relative("/", PREFIX), PREFIX);
        assert_eq!(
            resolve_relative("/a/./b/../c/?x=../y#z", PREFIX),
            "/view/https/example.com/a/c/?x=../y#z"
        );
    }

    #[test]
    fn test_resolve_never_escapes_prefix() {
        for href in ["/..", "/../../etc/passwd", "/a/../../..", "/./../view/http/evil.com"] {
            let resolved = resolve_relative(href, PREFIX);
            assert!(resolved.starts_with(PREFIX), "{} -> {}", href, resolved);
        }
        assert_eq!(
            resolve_relative("/../../etc/passwd", PREFIX),
            "/view/https/example.com/etc/passwd"
        );
    }

    #[test]
    fn test_resolve_leaves_other_values() {
        for href in [
            "",
            "page.html",
            "../up.html",
            "#anchor",
            "?q=1",
            "mailto:someone@example.com",
            "javascript:void(0)",
            "data:image/png;base64,AAAA",
        ] {
            assert_eq!(resolve_relative(href, PREFIX), href);
        }
    }

    #[test]
    fn test_resolve_unparsable_absolute_left_alone() {
        assert_eq!(resolve_relative("http://", PREFIX), "http://");
    }
}
