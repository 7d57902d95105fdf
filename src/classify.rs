//! Response media type detection.

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;

/// The only media type that gets rewritten.
pub const TEXT_HTML: &str = "text/html";

/// Number of leading body bytes examined when sniffing.
const SNIFF_LEN: usize = 512;

/// Tags that mark a body as HTML when they open the document.
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Magic numbers for common binary formats.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
];

/// Media type of a response, without parameters.
///
/// Uses the declared `Content-Type` when it parses, otherwise sniffs `body`.
pub fn media_type(headers: &HeaderMap, body: &[u8]) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_media_type)
        .unwrap_or_else(|| sniff(body).to_string())
}

pub fn is_html(media_type: &str) -> bool {
    media_type == TEXT_HTML
}

/// Extracts the lower-cased `type/subtype` essence of a `Content-Type` value.
pub fn parse_media_type(value: &str) -> Option<String> {
    let essence = value.split(';').next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    if !is_token(kind) || !is_token(subtype) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// Guesses a media type from the first bytes of a body.
pub fn sniff(body: &[u8]) -> &'static str {
    let head = &body[..body.len().min(SNIFF_LEN)];
    let trimmed = trim_leading_whitespace(head);

    if HTML_SIGNATURES
        .iter()
        .any(|sig| matches_html_signature(trimmed, sig))
    {
        return TEXT_HTML;
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml";
    }

    for &(magic, kind) in MAGIC {
        if head.starts_with(magic) {
            return kind;
        }
    }
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return "image/webp";
    }

    if head.iter().any(|&b| is_binary_byte(b)) {
        "application/octet-stream"
    } else {
        "text/plain"
    }
}

/// Case-insensitive prefix match followed by a tag-terminating byte.
fn matches_html_signature(data: &[u8], sig: &[u8]) -> bool {
    if data.len() <= sig.len() {
        return false;
    }
    if !data[..sig.len()].eq_ignore_ascii_case(sig) {
        return false;
    }
    matches!(data[sig.len()], b' ' | b'>')
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
