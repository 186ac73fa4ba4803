//! JavaScript snippets evaluated in the rendered page.

/// Scroll down by one viewport height to trigger lazy loading.
pub const SCROLL_ONE_VIEWPORT: &str = "window.scrollBy(0, window.innerHeight); true";

/// Expression counting elements that match `selector`.
///
/// The selector is embedded as a JSON string literal so quotes inside
/// attribute selectors survive.
pub fn count_matching(selector: &str) -> String {
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"*\"".to_string());
    format!("document.querySelectorAll({}).length", literal)
}

/// Expression returning the total scrollable page height.
pub const PAGE_HEIGHT: &str =
    "Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)";
