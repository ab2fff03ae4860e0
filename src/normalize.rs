// src/normalize.rs
//! Markup -> visible text.
//!
//! Parsing goes through html5ever (via `scraper`), which recovers from any
//! malformed input, so normalization never fails. Worst case is an empty
//! string.

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Node};

/// Subtrees whose text is never rendered.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Extract the visible text of `markup`: drop non-content subtrees, join text
/// nodes with a single space and fold whitespace.
pub fn normalize(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_document(markup);
    let mut pieces: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let piece = text.trim();
        if piece.is_empty() {
            continue;
        }
        let hidden = node.ancestors().any(|a| {
            matches!(a.value(), Node::Element(el) if SKIPPED_TAGS.contains(&el.name()))
        });
        if !hidden {
            pieces.push(piece);
        }
    }

    collapse_whitespace(&pieces.join(" "))
}

/// Collapse every whitespace run (including NBSP) into one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}
