use log::debug;

use crate::domain::email::{BodyFormat, MessageSummary};

/// Collapses a body into one line of at most `max_chars` characters for the
/// message list.
pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

/// Removes anything between `<` and `>`. Good enough for keyword matching,
/// not for display.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Renders HTML as wrapped terminal text. Falls back to the tag-stripped
/// source when the renderer gives up.
pub fn html_to_text(html: &str, width: usize) -> String {
    match html2text::from_read(html.as_bytes(), width.max(20)) {
        Ok(text) => text,
        Err(e) => {
            debug!("html2text failed, showing stripped source: {e}");
            strip_tags(html)
        }
    }
}

/// HTML as undecorated text with entities resolved, for matching and
/// previews rather than display.
pub fn html_to_plain(html: &str) -> String {
    match html2text::config::plain_no_decorate().string_from_read(html.as_bytes(), PLAIN_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            debug!("html2text failed, using stripped source: {e}");
            strip_tags(html)
        }
    }
}

const PLAIN_WIDTH: usize = 200;

/// One-line body preview that ignores markup.
pub fn body_snippet(message: &MessageSummary, max_chars: usize) -> String {
    match message.body_format {
        BodyFormat::Html => normalize_snippet(&html_to_plain(&message.body), max_chars),
        BodyFormat::Plain => normalize_snippet(&message.body, max_chars),
    }
}
