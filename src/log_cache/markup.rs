//! Markup escaping and stripping.
//!
//! [`escape`] and [`strip_html`] are inverses for any text:
//! `strip_html(&escape(s)) == s`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TAG_OR_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^>]*>|&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,6});")
        .expect("tag/entity pattern is valid")
});

/// Escape markup-unsafe characters for element text or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Plain-text content of a markup string: tags removed, entities decoded.
///
/// Decoding is a single pass, so `&amp;lt;` yields `&lt;`, not `<`.
/// Unknown entities are left as written.
pub fn strip_html(markup: &str) -> String {
    TAG_OR_ENTITY
        .replace_all(markup, |caps: &Captures<'_>| match caps.get(1) {
            None => String::new(),
            Some(entity) => decode_entity(entity.as_str())
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string()),
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}
