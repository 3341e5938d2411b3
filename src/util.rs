// src/util.rs
//! Stateless text helpers shared by the collectors and the classifier.

use sha2::{Digest, Sha256};

/// Truncate to at most `max_len` characters, appending `...` when cut.
/// Operates on chars, never on raw bytes, so multi-byte input is safe.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_len).collect();
    format!("{}...", cut.trim_end())
}

/// Deterministic content ID: `<prefix>-<first 12 hex chars of sha256(key)>`.
/// Re-collecting the same natural key always yields the same ID, which makes
/// the store upsert idempotent.
pub fn content_id(prefix: &str, key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("{prefix}-{hex}")
}

/// Strip HTML down to plain text: decode entities, drop tags, collapse
/// whitespace.
pub fn strip_html(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    collapse_whitespace(&out)
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

pub fn is_valid_url(s: &str) -> bool {
    reqwest::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text_verbatim() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("", 10), "");
    }

    #[test]
    fn truncate_cuts_on_char_boundaries() {
        let out = truncate_text("ábcdéf", 3);
        assert_eq!(out, "ábc...");
    }

    #[test]
    fn content_id_is_deterministic_and_prefixed() {
        let a = content_id("news", "https://example.com/story");
        let b = content_id("news", "https://example.com/story");
        let c = content_id("news", "https://example.com/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("news-"));
        assert_eq!(a.len(), "news-".len() + 12);
    }

    #[test]
    fn strip_html_removes_tags_and_entities() {
        let html = "<p>Hello&nbsp;<b>world</b></p>\n\n  <script>x()</script>";
        assert_eq!(strip_html(html), "Hello world x()");
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://arxiv.org/abs/2401.00001"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("not a url"));
    }
}
