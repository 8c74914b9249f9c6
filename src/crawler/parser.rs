//! HTML document parsing for crawl strategies
//!
//! A `Document` is what a strategy receives for every fetched page. It wraps
//! the parsed HTML tree and offers the queries most strategies need:
//! - CSS selection of elements, texts and attributes
//! - Page title
//! - Links to follow (resolved to absolute URLs)

use crate::SkraperError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A fetched page parsed into a queryable HTML tree
pub struct Document {
    url: String,
    html: Html,
}

impl Document {
    /// Parses raw page content fetched from `url`
    ///
    /// HTML parsing is error-tolerant: malformed markup still yields a
    /// document, just one with fewer elements than the author intended.
    ///
    /// # Example
    ///
    /// ```
    /// use skraper::crawler::Document;
    ///
    /// let doc = Document::parse("https://example.com/", "<div class='item'>One</div>");
    /// assert_eq!(doc.select_text("div.item").unwrap(), vec!["One".to_string()]);
    /// ```
    pub fn parse(url: impl Into<String>, body: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(body),
        }
    }

    /// URL the document was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The underlying scraper tree, for queries not covered here
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Returns every element matching a CSS selector, in document order
    pub fn select(&self, css: &str) -> Result<Vec<ElementRef<'_>>, SkraperError> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).collect())
    }

    /// Returns the whitespace-normalized text of every matching element
    pub fn select_text(&self, css: &str) -> Result<Vec<String>, SkraperError> {
        Ok(self.select(css)?.into_iter().map(element_text).collect())
    }

    /// Returns the value of `attr` for every matching element that has it
    pub fn select_attr(&self, css: &str, attr: &str) -> Result<Vec<String>, SkraperError> {
        Ok(self
            .select(css)?
            .into_iter()
            .filter_map(|element| element.value().attr(attr).map(str::to_string))
            .collect())
    }

    /// Extracts the page title from the `<title>` tag
    pub fn title(&self) -> Option<String> {
        let title_selector = Selector::parse("title").ok()?;

        self.html
            .select(&title_selector)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
    }

    /// Extracts all followable links from the page as absolute URLs
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` anywhere in the document
    /// - `<link rel="canonical" href="...">`
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links and data URIs
    /// - Fragment-only links
    /// - Anything that does not resolve to HTTP(S)
    pub fn links(&self) -> Vec<String> {
        let base_url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(_) => return Vec::new(),
        };

        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in self.html.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }

                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute_url) = resolve_link(href, &base_url) {
                        links.push(absolute_url);
                    }
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in self.html.select(&canonical_selector) {
                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute_url) = resolve_link(href, &base_url) {
                        links.push(absolute_url);
                    }
                }
            }
        }

        links
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("url", &self.url).finish()
    }
}

/// Compiles a CSS selector, mapping failures to `SkraperError::Selector`
pub fn parse_selector(css: &str) -> Result<Selector, SkraperError> {
    Selector::parse(css).map_err(|e| SkraperError::Selector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

/// Text content of an element with runs of whitespace collapsed
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute URL and validates it
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
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}
