//! HTML rewriting.
//!
//! Link, resource and form attributes are moved into the proxy path space,
//! and the caller's substitution rules run over every text node. Script and
//! style bodies are never interpreted. Their text is only matched as-is.

use std::borrow::Cow;

use lol_html::errors::AttributeNameError;
use lol_html::html_content::{ContentType, Element, TextType};
use lol_html::{doc_text, element, HtmlRewriter, Settings};

use crate::error::Result;
use crate::rules::{CompiledRules, RuleList};
use crate::url_codec::resolve_relative;

/// Request-scoped state for rewriting one document.
pub struct RewriteContext {
    url_prefix: String,
    rules: CompiledRules,
}

impl RewriteContext {
    /// Builds the context, compiling `rules` and skipping any that fail.
    pub fn new(url_prefix: impl Into<String>, rules: &RuleList) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            rules: CompiledRules::compile(rules),
        }
    }

    /// Rewrites a complete HTML document.
    pub fn rewrite(&self, html: &[u8]) -> Result<Vec<u8>> {
        let url_prefix = self.url_prefix.as_str();

        let element_content_handlers = vec![
            element!("a[href]", |el| {
                rewrite_attr(el, "href", url_prefix)?;
                Ok(())
            }),
            element!("link[href]", |el| {
                rewrite_attr(el, "href", url_prefix)?;
                Ok(())
            }),
            element!("img[src]", |el| {
                rewrite_attr(el, "src", url_prefix)?;
                Ok(())
            }),
            element!("script[src]", |el| {
                rewrite_attr(el, "src", url_prefix)?;
                Ok(())
            }),
            element!("form[action]", |el| {
                rewrite_attr(el, "action", url_prefix)?;
                Ok(())
            }),
        ];

        let mut document_content_handlers = Vec::new();
        if !self.rules.is_empty() {
            let rules = &self.rules;
            // Chunks of one text node are held back until the node ends so a
            // match never straddles a chunk boundary.
            let mut pending = String::new();
            document_content_handlers.push(doc_text!(move |chunk| {
                pending.push_str(chunk.as_str());
                if !chunk.last_in_text_node() {
                    chunk.remove();
                    return Ok(());
                }

                let text = std::mem::take(&mut pending);
                match apply_rules(rules, &text, chunk.text_type()) {
                    Some(rewritten) => chunk.replace(&rewritten, ContentType::Html),
                    // Earlier chunks were removed; the last one carries them all.
                    None if text.len() != chunk.as_str().len() => {
                        chunk.replace(&text, ContentType::Html)
                    }
                    None => {}
                }
                Ok(())
            }));
        }

        let mut output = Vec::with_capacity(html.len());
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers,
                document_content_handlers,
                strict: false,
                ..Settings::new()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(html)?;
        rewriter.end()?;

        Ok(output)
    }
}

/// Resolves one attribute in place. Empty results are never written back.
fn rewrite_attr(
    el: &mut Element<'_, '_>,
    attr: &str,
    url_prefix: &str,
) -> std::result::Result<(), AttributeNameError> {
    let Some(raw) = el.get_attribute(attr) else {
        return Ok(());
    };
    // The value comes back exactly as written in the source.
    let value = html_escape::decode_html_entities(&raw);
    let resolved = resolve_relative(&value, url_prefix);
    if !resolved.is_empty() && resolved != value {
        el.set_attribute(attr, &resolved)?;
    }
    Ok(())
}

/// Runs the rules over one text node given in its source form.
///
/// Ordinary text is entity-decoded before matching and escaped again
/// afterwards; raw text (script, style) is matched verbatim. Returns `None`
/// when nothing changed.
fn apply_rules(rules: &CompiledRules, raw: &str, text_type: TextType) -> Option<String> {
    match text_type {
        TextType::Data | TextType::RCData => {
            let decoded = html_escape::decode_html_entities(raw);
            match rules.apply(&decoded) {
                Cow::Borrowed(_) => None,
                Cow::Owned(rewritten) => Some(html_escape::encode_text(&rewritten).into_owned()),
            }
        }
        _ => match rules.apply(raw) {
            Cow::Borrowed(_) => None,
            Cow::Owned(rewritten) => Some(rewritten),
        },
    }
}
