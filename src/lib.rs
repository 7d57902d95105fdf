//! viewproxy - an HTML-rewriting forward proxy.
//!
//! Remote pages are served under `/view/<scheme>/<host>/<path>`. HTML
//! responses have their links, resources and forms pointed back into the
//! proxy, and user-defined regex rules are applied to their text.
//!
//! ## Endpoints
//!
//! - `GET /` - Show the caller's rules
//! - `POST /` - Add a rule (`match`, `replace` form fields)
//! - `ANY /view/<scheme>/<host>/<path...>` - Proxy a request
//!
//! Rules live only in the caller's `rules` cookie; the server keeps no
//! per-client state.

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
mod handlers;
pub mod page;
pub mod relay;
pub mod rewrite;
pub mod rules;
pub mod url_codec;

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use fetch::Upstream;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Upstream,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let upstream = Upstream::new(config.upstream_timeout());
        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::show_rules).post(handlers::add_rule))
        .route("/view", any(handlers::proxy))
        .route("/view/", any(handlers::proxy))
        .route("/view/*rest", any(handlers::proxy))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
