//! Common test utilities

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Response;
use axum::Router;
use viewproxy::rules::{Rule, RuleList};
use viewproxy::{router, AppState, Config};
use wiremock::MockServer;

/// Router with default configuration.
pub fn app() -> Router {
    app_with(Config::default())
}

pub fn app_with(config: Config) -> Router {
    router(AppState::new(config))
}

/// Proxy path for `path` on the mock upstream.
pub fn view_path(server: &MockServer, path: &str) -> String {
    format!("/view/http/{}{}", server.address(), path)
}

/// `Cookie` header value carrying the given rules.
pub fn rules_cookie(pairs: &[(&str, &str)]) -> String {
    let rules: RuleList = pairs
        .iter()
        .map(|(m, r)| Rule::new(*m, *r).unwrap())
        .collect();
    format!("rules={}", rules.to_token())
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
