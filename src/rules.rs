//! User substitution rules and the client-held token that carries them.
//!
//! The server never stores rules. The full list travels in the `rules`
//! cookie as base64-encoded JSON and is decoded again on every request.

use std::borrow::Cow;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::{engine::general_purpose, Engine as _};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the cookie holding the rule token.
pub const RULES_COOKIE: &str = "rules";

/// Compiled program size cap for a single user pattern.
const RULE_SIZE_LIMIT: usize = 1 << 20;

/// A single match/replace pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Regular expression matched against page text.
    #[serde(rename = "match", alias = "Match")]
    pub pattern: String,
    /// Replacement template, `$1` and `${name}` expand to captures.
    #[serde(alias = "Replace")]
    pub replace: String,
}

impl Rule {
    /// Creates a rule after checking that its pattern compiles.
    pub fn new(pattern: impl Into<String>, replace: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        compile_pattern(&pattern)?;
        Ok(Self {
            pattern,
            replace: replace.into(),
        })
    }
}

/// Ordered rule list. Later rules see the output of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList(Vec<Rule>);

/// Failure to decode a rule token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token is not a rule list: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.0.iter()
    }

    /// Returns a new list with `rule` appended.
    pub fn appended(&self, rule: Rule) -> Self {
        let mut rules = self.0.clone();
        rules.push(rule);
        Self(rules)
    }

    /// Serializes the list into a cookie-safe token.
    pub fn to_token(&self) -> String {
        // Serializing plain strings cannot fail.
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        general_purpose::STANDARD.encode(json)
    }

    pub fn from_token(token: &str) -> Result<Self, TokenError> {
        let json = general_purpose::STANDARD.decode(token.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Reads the caller's rules from the request cookies.
    ///
    /// An absent or corrupt token yields an empty list.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(token) = find_cookie(headers, RULES_COOKIE) else {
            return Self::new();
        };
        match Self::from_token(token) {
            Ok(rules) => rules,
            Err(err) => {
                debug!("Ignoring rules cookie: {}", err);
                Self::new()
            }
        }
    }

    /// `Set-Cookie` value carrying this list.
    pub fn set_cookie(&self) -> String {
        format!("{}={}; Path=/; HttpOnly", RULES_COOKIE, self.to_token())
    }
}

impl FromIterator<Rule> for RuleList {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compiles a user pattern with the same limits used at rewrite time.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .size_limit(RULE_SIZE_LIMIT)
        .build()
}

struct CompiledRule {
    pattern: Regex,
    replace: String,
}

/// Rules compiled for one request.
#[derive(Default)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Compiles every rule, skipping (and logging) the ones that fail.
    pub fn compile(list: &RuleList) -> Self {
        let rules = list
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| match compile_pattern(&rule.pattern) {
                Ok(pattern) => Some(CompiledRule {
                    pattern,
                    replace: rule.replace.clone(),
                }),
                Err(err) => {
                    warn!(rule = index, "Skipping rule {:?}: {}", rule.pattern, err);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Applies each rule in order to the running result.
    ///
    /// Returns `Cow::Borrowed` when no rule changed anything.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut current = Cow::Borrowed(text);
        for rule in &self.rules {
            let replaced = match rule.pattern.replace_all(&current, rule.replace.as_str()) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(replaced) => replaced,
            };
            current = Cow::Owned(replaced);
        }
        current
    }
}

/// Finds a cookie value by name across all `Cookie` headers.
pub fn find_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
}

/// Removes one cookie from a `Cookie` header value.
///
/// Returns `None` when nothing is left.
pub fn strip_cookie(header: &str, name: &str) -> Option<String> {
    let kept: Vec<&str> = header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            key.trim() != name
        })
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}
