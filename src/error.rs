//! Error types for the proxy pipeline.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Errors that end a single request.
///
/// Every variant renders as a plain-text body holding the error message, so
/// the client sees the same description that was logged.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The `/view/...` path is missing its scheme or host segment.
    #[error("invalid proxy path: {0}")]
    InvalidPath(String),

    /// Only http and https targets can be proxied.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// A submitted rule did not compile.
    #[error("{0}")]
    InvalidRule(#[from] regex::Error),

    /// Transport failure talking to the upstream.
    #[error("{0}")]
    Upstream(String),

    /// The configured upstream timeout elapsed.
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// The upstream body could not be read in full.
    #[error("failed to read upstream body: {0}")]
    Body(String),

    /// HTML parsing or serialization failed.
    #[error("failed to rewrite html: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}

impl ProxyError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidPath(_)
            | ProxyError::UnsupportedScheme(_)
            | ProxyError::InvalidRule(_) => StatusCode::BAD_REQUEST,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_)
            | ProxyError::Body(_)
            | ProxyError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self);
        } else {
            warn!(status = status.as_u16(), "{}", self);
        }

        (status, self.to_string()).into_response()
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Flattens an error and its sources into one line.
///
/// hyper's client errors only say "client error (Connect)" at the top level;
/// the useful part is further down the chain.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::InvalidPath("/view/https".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::UnsupportedScheme("ftp".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Upstream("connection refused".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Timeout(Duration::from_secs(3)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_invalid_rule_message_is_compiler_message() {
        let compile_err = regex::Regex::new("(").unwrap_err();
        let expected = compile_err.to_string();
        let err = ProxyError::from(compile_err);
        assert_eq!(err.to_string(), expected);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_describe_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let wrapped = ConnectError { source: io };
        assert_eq!(describe(&wrapped), "connect failed: refused");
    }

    #[derive(Debug, Error)]
    #[error("connect failed")]
    struct ConnectError {
        #[source]
        source: std::io::Error,
    }
}
