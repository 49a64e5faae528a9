//! Text cleanup shared by the extraction plugins

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Anything outside word characters, whitespace, CJK ideographs and `- . , ! ?`
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\x{4E00}-\x{9FFF}.,!?-]").expect("valid regex"));

/// Collapses whitespace and strips characters outside the allowed set
///
/// ```
/// use news_engine::plugins::clean_text;
///
/// assert_eq!(clean_text("  Markets   rally ★ today! "), "Markets rally  today!");
/// ```
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ");
    DISALLOWED_RE.replace_all(&collapsed, "").into_owned()
}

/// Text content of an element, with whitespace runs collapsed
pub fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned()
}

/// Text of the first element under `scope` matching `selector`, if non-empty
pub fn select_text(scope: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
}

/// Strips markup from an HTML fragment, keeping only its text
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') {
        return WHITESPACE_RE.replace_all(fragment.trim(), " ").into_owned();
    }
    let parsed = Html::parse_fragment(fragment);
    element_text(&parsed.root_element())
}
