//! Outbound requests to the proxied origin.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{ACCEPT_ENCODING, CONNECTION, COOKIE, HOST, ORIGIN, REFERER};
use axum::http::{response, HeaderMap, HeaderName, HeaderValue, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{describe, ProxyError, Result};
use crate::rules::{strip_cookie, RULES_COOKIE};
use crate::url_codec::{ProxyTarget, VIEW_ROOT};

/// Headers that only make sense for a single connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that would tell the origin who the real client is.
const IDENTITY: &[&str] = &[
    "forwarded",
    "via",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
];

type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// A fully buffered upstream response.
pub struct Fetched {
    pub parts: response::Parts,
    pub body: Bytes,
}

/// Pooled client for talking to proxied origins.
#[derive(Clone)]
pub struct Upstream {
    client: HttpsClient,
    timeout: Option<Duration>,
}

impl Upstream {
    pub fn new(timeout: Option<Duration>) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Self { client, timeout }
    }

    /// Replays `req` against `target` and reads the whole response.
    ///
    /// No retries. Dropping the returned future abandons the exchange.
    pub async fn fetch(&self, req: Request, target: &ProxyTarget) -> Result<Fetched> {
        let req = prepare_request(req, target)?;
        info!("Proxying {}", target);

        let exchange = async {
            let response: hyper::Response<Incoming> = self
                .client
                .request(req)
                .await
                .map_err(|err| ProxyError::Upstream(describe(&err)))?;
            debug!("Upstream status {}", response.status());

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|err| ProxyError::Body(describe(&err)))?
                .to_bytes();
            Ok::<_, ProxyError>(Fetched { parts, body })
        };

        match self.timeout {
            Some(limit) => timeout(limit, exchange)
                .await
                .map_err(|_| ProxyError::Timeout(limit))?,
            None => exchange.await,
        }
    }
}

/// Points the inbound request at `target` and cleans its headers.
pub fn prepare_request(mut req: Request, target: &ProxyTarget) -> Result<Request> {
    *req.uri_mut() = target.to_uri()?;
    *req.version_mut() = Version::HTTP_11;

    let headers = req.headers_mut();
    strip_hop_by_hop(headers);
    for name in IDENTITY {
        headers.remove(*name);
    }

    // Ask for an uncompressed body so it can be rewritten.
    headers.remove(ACCEPT_ENCODING);

    headers.insert(
        HOST,
        HeaderValue::from_str(&target.host)
            .map_err(|_| ProxyError::InvalidPath(target.host.clone()))?,
    );

    strip_rules_cookie(headers);

    if headers.contains_key(ORIGIN) {
        if let Ok(origin) = HeaderValue::from_str(&target.origin()) {
            headers.insert(ORIGIN, origin);
        }
    }

    let referer = headers.get(REFERER).and_then(upstream_referer);
    match referer {
        Some(referer) => {
            headers.insert(REFERER, referer);
        }
        None => {
            headers.remove(REFERER);
        }
    }

    Ok(req)
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// The `rules` cookie belongs to the proxy and is not sent on.
fn strip_rules_cookie(headers: &mut HeaderMap) {
    let kept: Vec<HeaderValue> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| strip_cookie(value, RULES_COOKIE))
        .filter_map(|value| HeaderValue::from_str(&value).ok())
        .collect();
    headers.remove(COOKIE);
    for value in kept {
        headers.append(COOKIE, value);
    }
}

/// Maps a Referer inside the proxy back to the real page it names.
fn upstream_referer(referer: &HeaderValue) -> Option<HeaderValue> {
    let uri: Uri = referer.to_str().ok()?.parse().ok()?;
    let path_and_query = uri.path_and_query()?.as_str();
    if !path_and_query.starts_with(VIEW_ROOT) {
        return None;
    }
    let target = ProxyTarget::from_proxy_url(path_and_query).ok()?;
    HeaderValue::from_str(&target.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::PROXY_AUTHORIZATION;
    use axum::http::Method;

    fn target() -> ProxyTarget {
        ProxyTarget::decode("/view/https/example.com/page", Some("a=1")).unwrap()
    }

    fn inbound() -> axum::http::request::Builder {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/view/https/example.com/page?a=1")
    }

    #[test]
    fn test_prepare_rewrites_uri_and_host() {
        let req = inbound()
            .header(HOST, "localhost:8080")
            .header(ACCEPT_ENCODING, "gzip, br")
            .body(Body::from("payload"))
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().to_string(), "https://example.com/page?a=1");
        assert_eq!(req.headers()[HOST], "example.com");
        assert!(!req.headers().contains_key(ACCEPT_ENCODING));
    }

    #[test]
    fn test_prepare_strips_hop_by_hop_and_identity() {
        let req = inbound()
            .header(CONNECTION, "keep-alive, x-custom-hop")
            .header("keep-alive", "timeout=5")
            .header("x-custom-hop", "1")
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "10.0.0.1")
            .header(PROXY_AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .header("x-kept", "yes")
            .body(Body::empty())
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();
        let headers = req.headers();

        for gone in [
            "connection",
            "keep-alive",
            "x-custom-hop",
            "x-forwarded-for",
            "x-real-ip",
            "proxy-authorization",
        ] {
            assert!(!headers.contains_key(gone), "{} was forwarded", gone);
        }
        assert_eq!(headers["x-kept"], "yes");
    }

    #[test]
    fn test_prepare_drops_rules_cookie_only() {
        let req = inbound()
            .header(COOKIE, "session=abc; rules=W10=")
            .body(Body::empty())
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();
        assert_eq!(req.headers()[COOKIE], "session=abc");

        let req = inbound()
            .header(COOKIE, "rules=W10=")
            .body(Body::empty())
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();
        assert!(!req.headers().contains_key(COOKIE));
    }

    #[test]
    fn test_prepare_rewrites_origin_and_referer() {
        let req = inbound()
            .header(ORIGIN, "http://localhost:8080")
            .header(REFERER, "http://localhost:8080/view/https/example.com/list?page=2")
            .body(Body::empty())
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();
        assert_eq!(req.headers()[ORIGIN], "https://example.com");
        assert_eq!(req.headers()[REFERER], "https://example.com/list?page=2");
    }

    #[test]
    fn test_prepare_drops_foreign_referer() {
        let req = inbound()
            .header(REFERER, "http://localhost:8080/")
            .body(Body::empty())
            .unwrap();
        let req = prepare_request(req, &target()).unwrap();
        assert!(!req.headers().contains_key(REFERER));
    }
}
