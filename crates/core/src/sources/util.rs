//! Small parsing helpers shared by the HTML adapters.

use scraper::ElementRef;
use url::Url;

use crate::content::html::select_all;
use crate::content::Category;

use super::error::SourceError;

const NEXT_LABELS: [&str; 6] = [">", "»", "下一页", "下页", "Next", "next"];

/// Last non-empty path segment of a link, query and fragment ignored.
pub(crate) fn last_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let path = match Url::parse(path) {
        Ok(url) => url.path().to_string(),
        Err(_) => path.to_string(),
    };
    path.split('/')
        .rev()
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accept ids made of ASCII alphanumerics, `-` and `_` only.
///
/// Such ids are interpolated into upstream paths.
pub(crate) fn checked_slug(id: &str) -> Result<&str, SourceError> {
    let id = id.trim();
    if !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(id)
    } else {
        Err(SourceError::bad_id(id))
    }
}

/// Parse `id:name,id:name` lists from source options.
pub(crate) fn parse_pairs(value: &str) -> Vec<Category> {
    value
        .split(',')
        .filter_map(|pair| {
            let (id, name) = pair.split_once(':')?;
            let (id, name) = (id.trim(), name.trim());
            if id.is_empty() || name.is_empty() {
                None
            } else {
                Some(Category::new(id, name))
            }
        })
        .collect()
}

/// Whether a pager contains a "next page" link.
pub(crate) fn has_next_link(scope: ElementRef<'_>, css: &str) -> bool {
    select_all(scope, css).into_iter().any(|a| {
        let label: String = a.text().collect();
        let label = label.trim();
        a.value().attr("href").is_some() && NEXT_LABELS.contains(&label)
    })
}

/// First non-blank text node of an element, ignoring nested markup after it.
pub(crate) fn own_text(element: ElementRef<'_>) -> Option<String> {
    element
        .text()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// Strip a `label：` or `label:` prefix.
pub(crate) fn after_label(value: &str) -> String {
    value
        .split_once(['：', ':'])
        .map(|(_, rest)| rest)
        .unwrap_or(value)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/manhua-abc/").as_deref(), Some("manhua-abc"));
        assert_eq!(last_segment("https://x.example/m12/?from=1").as_deref(), Some("m12"));
        assert_eq!(last_segment("/book/42.html").as_deref(), Some("42.html"));
        assert!(last_segment("/").is_none());
    }

    #[test]
    fn test_checked_slug() {
        assert_eq!(checked_slug(" m119988 ").unwrap(), "m119988");
        assert!(checked_slug("../etc").is_err());
        assert!(checked_slug("").is_err());
        assert!(checked_slug("a b").is_err());
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("2:Fantasy, 3:Romance,bad,:x,9:");
        assert_eq!(pairs, vec![Category::new("2", "Fantasy"), Category::new("3", "Romance")]);
    }

    #[test]
    fn test_pager_and_text_helpers() {
        let doc = Html::parse_document(
            r#"<div class="pager"><a href="/p1">1</a><a href="/p2"> 下一页 </a></div>
               <p id="t">  Title <span>9.5</span></p>"#,
        );
        let root = doc.root_element();
        assert!(has_next_link(root, ".pager a"));
        assert!(!has_next_link(root, ".missing a"));
        let title = crate::content::html::first(root, "#t").unwrap();
        assert_eq!(own_text(title).as_deref(), Some("Title"));
        assert_eq!(after_label("状态：连载中"), "连载中");
        assert_eq!(after_label("plain"), "plain");
    }
}
