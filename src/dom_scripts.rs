//! JavaScript snippets evaluated inside the automated page.
//!
//! The consent-management overlay on the target site intercepts clicks over
//! the whole viewport, and its dismiss button is flaky under headless Chrome.
//! Removing the overlay nodes outright is the reliable path, so every
//! navigation and interaction strips them first.
//!
//! Dynamic snippets are built with [`js_string`], which produces a quoted
//! JavaScript string literal via JSON escaping. Raw interpolation of
//! selectors or user text into scripts is never safe.

/// Remove both known consent overlay containers. Idempotent; missing nodes
/// are ignored.
pub const REMOVE_CONSENT_OVERLAY: &str = r#"
(() => {
    for (const id of ['cmpbox', 'cmpbox2']) {
        const node = document.getElementById(id);
        if (node) { node.remove(); }
    }
})()
"#;

/// Escape arbitrary text as a double-quoted JavaScript string literal.
pub fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Quote text as an XPath 1.0 string literal. XPath has no escape
/// sequences, so text containing both quote kinds falls back to `concat()`.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|part| format!("'{part}'")).collect();
        format!("concat({})", parts.join(r#", "'", "#))
    }
}

fn contains_text_xpath(text: &str) -> String {
    format!("//*[contains(text(), {})]", xpath_literal(text))
}

/// Probe a CSS selector and classify it as `"visible"`, `"present"` or
/// `"missing"`. Visibility means a non-empty client rect and no
/// `display:none` / `visibility:hidden` in effect.
pub fn probe_css(selector: &str) -> String {
    format!(
        r#"
(() => {{
    const el = document.querySelector({selector});
    if (!el) {{ return 'missing'; }}
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const visible = style.display !== 'none'
        && style.visibility !== 'hidden'
        && rect.width > 0
        && rect.height > 0;
    return visible ? 'visible' : 'present';
}})()
"#,
        selector = js_string(selector)
    )
}

/// Probe for an element whose text content contains `text`, classified the
/// same way as [`probe_css`].
pub fn probe_text(text: &str) -> String {
    format!(
        r#"
(() => {{
    const result = document.evaluate(
        {xpath},
        document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
    const el = result.singleNodeValue;
    if (!el) {{ return 'missing'; }}
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const visible = style.display !== 'none'
        && style.visibility !== 'hidden'
        && rect.width > 0
        && rect.height > 0;
    return visible ? 'visible' : 'present';
}})()
"#,
        xpath = js_string(&contains_text_xpath(text))
    )
}

/// Click the first element whose text content contains `text`. Returns
/// `true` when a node was found and clicked.
pub fn click_text(text: &str) -> String {
    format!(
        r#"
(() => {{
    const result = document.evaluate(
        {xpath},
        document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
    const el = result.singleNodeValue;
    if (!el) {{ return false; }}
    el.click();
    return true;
}})()
"#,
        xpath = js_string(&contains_text_xpath(text))
    )
}
