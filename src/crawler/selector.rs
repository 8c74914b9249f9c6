//! Built-in strategy driven by two CSS selectors

use crate::crawler::context::CrawlContext;
use crate::crawler::parser::{element_text, parse_selector, Document};
use crate::crawler::strategy::{Crawler, Outcomes, ParseOutcome};
use crate::SkraperError;
use scraper::Selector;

/// Yields the text of every element matching `item_selector` as a `String`
/// item, then follows the first `href` matching `next_selector`
///
/// Pages are followed with the same strategy, so a list spread over several
/// pages is walked until a page has no next link.
pub struct SelectorCrawler {
    item_css: String,
    item_selector: Selector,
    next_selector: Option<Selector>,
}

impl SelectorCrawler {
    pub fn new(item_selector: &str, next_selector: Option<&str>) -> Result<Self, SkraperError> {
        Ok(Self {
            item_css: item_selector.to_string(),
            item_selector: parse_selector(item_selector)?,
            next_selector: next_selector.map(parse_selector).transpose()?,
        })
    }

    fn next_link(&self, document: &Document) -> Option<String> {
        let selector = self.next_selector.as_ref()?;
        document
            .html()
            .select(selector)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map(str::to_string)
    }
}

impl Crawler for SelectorCrawler {
    fn name(&self) -> &str {
        &self.item_css
    }

    fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
        let items = document
            .html()
            .select(&self.item_selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .map(|text| Ok::<_, anyhow::Error>(ParseOutcome::item(text)));

        // The next link is looked up only after every item has been pulled
        let next = std::iter::once(())
            .filter_map(move |_| self.next_link(document))
            .map(move |href| Ok(ParseOutcome::follow(href, context)));

        Box::new(items.chain(next))
    }
}

impl std::fmt::Debug for SelectorCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorCrawler")
            .field("item_selector", &self.item_css)
            .field("follows_pages", &self.next_selector.is_some())
            .finish()
    }
}
