//! Lenient HTML helpers shared by the adapters.
//!
//! Missing elements yield `None` or an empty list instead of an error; an
//! adapter keeps an item only when its mandatory fields are present.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static BACKGROUND_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::debug!(css, error = %e, "Invalid selector");
            None
        }
    }
}

/// Every element matching `css` under `scope`.
pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// First element matching `css` under `scope`.
pub fn first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

/// Whitespace-collapsed text of an element.
pub fn text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Text of the first match, `None` when missing or blank.
pub fn text_of(scope: ElementRef<'_>, css: &str) -> Option<String> {
    let value = text(first(scope, css)?);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Attribute of the first match, `None` when missing or blank.
pub fn attr_of(scope: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let value = first(scope, css)?.value().attr(attr)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// First non-blank attribute among `attrs`, for lazy-loaded images.
pub fn image_src(element: ElementRef<'_>) -> Option<String> {
    ["data-original", "data-src", "data-lazy-src", "src"]
        .iter()
        .filter_map(|a| element.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
        .map(str::to_string)
}

/// URL inside a CSS `background-image: url(…)` declaration.
pub fn background_image(style: &str) -> Option<String> {
    BACKGROUND_URL
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Resolve `link` against `base`; absolute links pass through.
pub fn absolute_url(base: &Url, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    base.join(link).ok().map(String::from)
}

/// Text of an element split into paragraphs separated by a blank line.
///
/// Both `<p>` children and `<br>`-separated text are recognised.
pub fn paragraphs(element: ElementRef<'_>) -> String {
    let p_children = select_all(element, "p");
    let lines: Vec<String> = if !p_children.is_empty() {
        p_children.into_iter().map(text).collect()
    } else {
        element
            .text()
            .flat_map(|t| t.split('\n'))
            .map(|line| {
                WHITESPACE
                    .replace_all(line.trim_matches(|c: char| c.is_whitespace() || c == '\u{3000}'), " ")
                    .into_owned()
            })
            .collect()
    };
    lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Value assigned to a script global, e.g. `var DM5_CID=119988;`.
///
/// Surrounding quotes are stripped.
pub fn script_global(source: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?:var\s+)?\b{}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^;,\s]+))"#,
        regex_lite::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(source)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
}

/// Concatenated text of every inline `<script>` of a document.
pub fn inline_scripts(document: &Html) -> String {
    select_all(document.root_element(), "script")
        .into_iter()
        .filter(|s| s.value().attr("src").is_none())
        .map(|s| s.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
