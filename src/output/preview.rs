use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Classification, Message};

const WRAP_WIDTH: usize = 120;

fn script_blocks() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
            .expect("compile script block regex")
    })
}

fn whitespace_runs() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("compile whitespace regex"))
}

fn looks_like_html(value: &str) -> bool {
    value.contains("</") || value.contains("/>") || value.contains("<br") || value.contains("<p")
}

/// Renders a message body as plain text, keeping line structure.
pub fn plain_text(body: &str) -> String {
    if !looks_like_html(body) {
        return body.trim().to_string();
    }

    let stripped = script_blocks().replace_all(body, "");
    html2text::from_read(stripped.as_bytes(), WRAP_WIDTH)
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// One-line preview: the body as text with whitespace collapsed, or the
/// snippet when the body is empty.
pub fn one_line(body: &str, snippet: &str) -> String {
    let source = if body.trim().is_empty() {
        snippet.to_string()
    } else {
        plain_text(body)
    };
    whitespace_runs().replace_all(&source, " ").trim().to_string()
}

pub fn message_preview(message: &Message) -> String {
    one_line(&message.body, &message.snippet)
}

pub fn classification_preview(classification: &Classification) -> String {
    one_line(&classification.body, &classification.snippet)
}
