//! HTTP handlers.

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, Method};
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::classify;
use crate::error::Result;
use crate::fetch::Fetched;
use crate::page;
use crate::relay;
use crate::rewrite::RewriteContext;
use crate::rules::{Rule, RuleList};
use crate::url_codec::ProxyTarget;
use crate::AppState;

/// Form fields posted by the control page.
#[derive(Debug, Deserialize)]
pub struct RuleForm {
    #[serde(default, rename = "match")]
    pattern: String,
    #[serde(default)]
    replace: String,
}

/// `GET /`
pub async fn show_rules(headers: HeaderMap) -> Html<String> {
    Html(page::render(&RuleList::from_headers(&headers)))
}

/// `POST /`: validates and appends a rule, then re-issues the token.
pub async fn add_rule(headers: HeaderMap, Form(form): Form<RuleForm>) -> Result<Response> {
    let rule = Rule::new(form.pattern, form.replace)?;
    let rules = RuleList::from_headers(&headers).appended(rule);
    info!(count = rules.len(), "Added rule");

    Ok((
        [(SET_COOKIE, rules.set_cookie())],
        Html(page::render(&rules)),
    )
        .into_response())
}

/// `ANY /view/<scheme>/<host>/<path...>`
pub async fn proxy(State(state): State<AppState>, req: Request) -> Result<Response> {
    let target = ProxyTarget::decode(req.uri().path(), req.uri().query())?;
    let url_prefix = target.url_prefix();
    let rules = RuleList::from_headers(req.headers());
    let is_head = req.method() == Method::HEAD;

    let Fetched { parts, body } = state.upstream.fetch(req, &target).await?;

    let media_type = classify::media_type(&parts.headers, &body);
    info!("Content-Type: {}", media_type);

    let body = if classify::is_html(&media_type) && !body.is_empty() {
        let ctx = RewriteContext::new(url_prefix.as_str(), &rules);
        Bytes::from(ctx.rewrite(&body)?)
    } else {
        body
    };

    Ok(relay::respond(parts, body, &url_prefix, is_head))
}
