//! Turns a buffered upstream response into the client response.

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_SECURITY_POLICY, LOCATION};
use axum::http::{response, HeaderValue, StatusCode};
use axum::response::Response;
use tracing::debug;

use crate::fetch::strip_hop_by_hop;
use crate::url_codec::resolve_relative;

const CSP_REPORT_ONLY: &str = "content-security-policy-report-only";

/// Builds the client response from upstream `parts` and the final `body`.
///
/// Upstream headers are copied except for content policies, which would
/// block the rewritten same-origin loads, and hop-by-hop headers.
/// `Content-Length` always describes `body`, except on bodiless responses
/// (`HEAD`, 204, 304) where the upstream value is kept.
pub fn respond(mut parts: response::Parts, body: Bytes, url_prefix: &str, is_head: bool) -> Response {
    let headers = &mut parts.headers;
    strip_hop_by_hop(headers);
    headers.remove(CONTENT_SECURITY_POLICY);
    headers.remove(CSP_REPORT_ONLY);

    // The client does not follow redirects, keep them inside the proxy.
    let location = headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| (value.to_string(), resolve_relative(value, url_prefix)));
    if let Some((original, resolved)) = location {
        if original != resolved {
            if let Ok(value) = HeaderValue::from_str(&resolved) {
                debug!("Redirect {} -> {}", original, resolved);
                headers.insert(LOCATION, value);
            }
        }
    }

    let bodiless = is_head
        || parts.status.is_informational()
        || parts.status == StatusCode::NO_CONTENT
        || parts.status == StatusCode::NOT_MODIFIED;
    if !bodiless {
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    Response::from_parts(parts, Body::from(body))
}
