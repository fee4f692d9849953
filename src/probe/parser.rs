//! HTML parser for category and listing pages
//!
//! This module handles parsing HTML content to extract:
//! - The reported item count of a category
//! - Links to child categories
//! - Product tiles and the next-page link of a listing

use crate::config::ProbeConfig;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Compiled CSS selectors used to read category and listing pages
#[derive(Debug, Clone)]
pub struct PageSelectors {
    pub count: Selector,
    pub child_link: Selector,
    pub item: Selector,
    pub next_page: Option<Selector>,
}

impl PageSelectors {
    pub fn from_config(config: &ProbeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            count: compile(&config.count_selector)?,
            child_link: compile(&config.child_link_selector)?,
            item: compile(&config.item_selector)?,
            next_page: config
                .next_page_selector
                .as_deref()
                .map(compile)
                .transpose()?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Extracted information from a category page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCategory {
    /// Count read from the count element, if present and numeric
    pub count: Option<u64>,

    /// Child category links (absolute, deduplicated, document order)
    pub child_links: Vec<String>,

    /// Product tiles found on this page
    pub items_on_page: usize,

    /// Whether the page links to a further listing page
    pub has_next_page: bool,
}

/// One product tile on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub url: String,
    pub title: Option<String>,
}

/// Extracted information from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedListing {
    pub items: Vec<ListingItem>,
    pub next_page: Option<String>,
}

/// Parses a category page
///
/// # Example
///
/// ```
/// use catalog_sweep::probe::{parse_category_page, PageSelectors};
/// use scraper::Selector;
/// use url::Url;
///
/// let selectors = PageSelectors {
///     count: Selector::parse(".count").unwrap(),
///     child_link: Selector::parse("nav a").unwrap(),
///     item: Selector::parse(".tile").unwrap(),
///     next_page: None,
/// };
/// let html = r#"<span class="count">1,200 results</span><nav><a href="/c/dairy/1100">Dairy</a></nav>"#;
/// let base = Url::parse("https://shop.example.com/c/1000").unwrap();
/// let parsed = parse_category_page(html, &base, &selectors);
/// assert_eq!(parsed.count, Some(1200));
/// assert_eq!(parsed.child_links, vec!["https://shop.example.com/c/dairy/1100"]);
/// ```
pub fn parse_category_page(html: &str, base_url: &Url, selectors: &PageSelectors) -> ParsedCategory {
    let document = Html::parse_document(html);

    let count = document
        .select(&selectors.count)
        .next()
        .and_then(|element| parse_count(&element_text(&element)));

    let mut child_links: Vec<String> = Vec::new();
    for element in document.select(&selectors.child_link) {
        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_link(href, base_url) {
                if !child_links.contains(&absolute_url) {
                    child_links.push(absolute_url);
                }
            }
        }
    }

    let items_on_page = document.select(&selectors.item).count();
    let has_next_page = selectors
        .next_page
        .as_ref()
        .is_some_and(|selector| document.select(selector).next().is_some());

    ParsedCategory {
        count,
        child_links,
        items_on_page,
        has_next_page,
    }
}

/// Parses one page of a category listing
pub fn parse_listing_page(html: &str, base_url: &Url, selectors: &PageSelectors) -> ParsedListing {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for element in document.select(&selectors.item) {
        let href = element
            .value()
            .attr("href")
            .map(str::to_string)
            .or_else(|| first_descendant_href(&element));

        let Some(url) = href.and_then(|h| resolve_link(&h, base_url)) else {
            continue;
        };

        let title = Some(element_text(&element)).filter(|t| !t.is_empty());
        items.push(ListingItem { url, title });
    }

    let next_page = selectors.next_page.as_ref().and_then(|selector| {
        document
            .select(selector)
            .filter_map(|element| element.value().attr("href"))
            .find_map(|href| resolve_link(href, base_url))
    });

    ParsedListing { items, next_page }
}

fn first_descendant_href(element: &ElementRef<'_>) -> Option<String> {
    static ANCHOR: OnceLock<Option<Selector>> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(|| Selector::parse("a[href]").ok()).as_ref()?;

    element
        .select(anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the first number in a count label such as "1,234 results"
fn parse_count(text: &str) -> Option<u64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\d[\d,]*").ok()).as_ref()?;

    number
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None for javascript:, mailto:, tel:, data: and fragment-only
/// links, and for anything that is not HTTP(S) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> PageSelectors {
        PageSelectors {
            count: Selector::parse(".result-count").unwrap(),
            child_link: Selector::parse("nav.categories a").unwrap(),
            item: Selector::parse(".product-tile").unwrap(),
            next_page: Some(Selector::parse("a.next").unwrap()),
        }
    }

    fn base_url() -> Url {
        Url::parse("https://shop.example.com/c/grocery/1000").unwrap()
    }

    #[test]
    fn test_parse_count_with_separators() {
        assert_eq!(parse_count("1,234 results"), Some(1234));
        assert_eq!(parse_count("Showing 48 of 5,000"), Some(48));
        assert_eq!(parse_count("no results"), None);
    }

    #[test]
    fn test_category_page_count_and_children() {
        let html = r#"
            <html><body>
            <div class="result-count">5,000 items</div>
            <nav class="categories">
                <a href="/c/grocery/dairy/1100">Dairy</a>
                <a href="/c/grocery/bakery/1200?sort=top">Bakery</a>
                <a href="/c/grocery/dairy/1100">Dairy again</a>
                <a href="javascript:void(0)">Nope</a>
            </nav>
            </body></html>
        "#;

        let parsed = parse_category_page(html, &base_url(), &selectors());
        assert_eq!(parsed.count, Some(5000));
        assert_eq!(
            parsed.child_links,
            vec![
                "https://shop.example.com/c/grocery/dairy/1100",
                "https://shop.example.com/c/grocery/bakery/1200?sort=top",
            ]
        );
        assert_eq!(parsed.items_on_page, 0);
    }

    #[test]
    fn test_category_page_without_count() {
        let html = r#"<html><body><nav class="categories"><a href="/c/x/1">X</a></nav></body></html>"#;
        let parsed = parse_category_page(html, &base_url(), &selectors());
        assert_eq!(parsed.count, None);
        assert_eq!(parsed.child_links.len(), 1);
        assert!(!parsed.has_next_page);
    }

    #[test]
    fn test_category_page_detects_next_page() {
        let html = r#"<html><body>
            <a class="product-tile" href="/p/1">One</a>
            <a class="next" href="?page=2">Next</a>
            </body></html>"#;
        let parsed = parse_category_page(html, &base_url(), &selectors());
        assert_eq!(parsed.items_on_page, 1);
        assert!(parsed.has_next_page);
    }

    #[test]
    fn test_listing_page_items_and_next() {
        let html = r#"
            <html><body>
            <a class="product-tile" href="/p/whole-milk/55">Whole   Milk</a>
            <div class="product-tile"><a href="/p/butter/56">Butter</a></div>
            <div class="product-tile">No link here</div>
            <a class="next" href="?page=2">Next</a>
            </body></html>
        "#;

        let parsed = parse_listing_page(html, &base_url(), &selectors());
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].url, "https://shop.example.com/p/whole-milk/55");
        assert_eq!(parsed.items[0].title.as_deref(), Some("Whole Milk"));
        assert_eq!(parsed.items[1].url, "https://shop.example.com/p/butter/56");
        assert_eq!(
            parsed.next_page.as_deref(),
            Some("https://shop.example.com/c/grocery/1000?page=2")
        );
    }

    #[test]
    fn test_listing_page_last_page() {
        let html = r#"<html><body><a class="product-tile" href="/p/1">One</a></body></html>"#;
        let parsed = parse_listing_page(html, &base_url(), &selectors());
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.next_page, None);
    }

    #[test]
    fn test_skip_special_links() {
        assert_eq!(resolve_link("mailto:a@b.com", &base_url()), None);
        assert_eq!(resolve_link("#top", &base_url()), None);
        assert_eq!(resolve_link("  ", &base_url()), None);
        assert_eq!(
            resolve_link("dairy/1100", &base_url()).as_deref(),
            Some("https://shop.example.com/c/grocery/dairy/1100")
        );
    }
}
