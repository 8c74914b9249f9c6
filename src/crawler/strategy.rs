//! The parsing strategy contract and the outcomes strategies produce
//!
//! A strategy (`Crawler`) turns one parsed page into a lazy sequence of
//! `ParseOutcome`s: items to hand to sinks, links to fetch next, or nothing.
//! Strategies are supplied by the caller and usually differ per target site.
//!
//! ## Example
//!
//! ```
//! use skraper::crawler::{CrawlContext, Crawler, Document, Outcomes, ParseOutcome};
//!
//! struct TitleCrawler;
//!
//! impl Crawler for TitleCrawler {
//!     fn name(&self) -> &str {
//!         "titles"
//!     }
//!
//!     fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a> {
//!         let title = document.title().map(|t| Ok(ParseOutcome::item(t)));
//!         let next = document
//!             .select_attr("a.next", "href")
//!             .map_err(anyhow::Error::from)
//!             .map(|links| links.into_iter().next().map(|href| ParseOutcome::follow(href, context)))
//!             .transpose();
//!         Box::new(title.into_iter().chain(next))
//!     }
//! }
//! ```

use crate::crawler::context::CrawlContext;
use crate::crawler::fetcher::HttpResponse;
use crate::crawler::parser::Document;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Lazy sequence of outcomes for one page
///
/// An `Err` element is recorded against the page and iteration continues.
pub type Outcomes<'a> = Box<dyn Iterator<Item = anyhow::Result<ParseOutcome>> + 'a>;

/// Site-specific parsing strategy
pub trait Crawler: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Produces the outcomes for one fetched page
    ///
    /// The worker pulls outcomes one at a time and acts on each before
    /// pulling the next, so expensive work can be deferred per outcome.
    /// Strategies may keep their own state (pagination counters and the
    /// like) behind interior mutability, but must not assume anything about
    /// the order in which different pages are parsed.
    fn parse<'a>(&'a self, document: &'a Document, context: &'a CrawlContext) -> Outcomes<'a>;

    /// Decides how to recover from a failed fetch of `url`
    ///
    /// The engine never retries by itself; to retry, return
    /// [`ParseOutcome::next_page`] pointing at the same URL.
    fn on_error(&self, url: &str, response: &HttpResponse) -> ParseOutcome {
        match response.cause() {
            Some(cause) => tracing::warn!(
                "Request failed for URL {} (status {:?}): {}",
                url,
                response.status(),
                cause
            ),
            None => tracing::warn!("Request failed for URL {}", url),
        }

        ParseOutcome::NoOp
    }
}

/// One extracted value, type-erased until it reaches its sink
pub struct CrawledItem {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl CrawledItem {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Runtime type of the wrapped value; sinks are keyed by it
    pub fn item_type(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Unwraps the value, giving the item back if it is not a `T`
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { value, type_name })
    }
}

impl fmt::Debug for CrawledItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawledItem")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// One unit of strategy output
pub enum ParseOutcome {
    /// An extracted domain object
    Item(CrawledItem),

    /// A page to fetch next, relative to the crawl host or absolute, and the
    /// strategy to parse it with
    NextPage {
        url: String,
        crawler: Arc<dyn Crawler>,
    },

    /// Explicitly nothing
    NoOp,
}

impl ParseOutcome {
    pub fn item<T: Any + Send>(value: T) -> Self {
        Self::Item(CrawledItem::new(value))
    }

    /// Follow `url` with the given strategy
    pub fn next_page(url: impl Into<String>, crawler: Arc<dyn Crawler>) -> Self {
        Self::NextPage {
            url: url.into(),
            crawler,
        }
    }

    /// Follow `url` with the strategy that is parsing the current page
    pub fn follow(url: impl Into<String>, context: &CrawlContext) -> Self {
        Self::next_page(url, Arc::clone(context.crawler()))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

impl fmt::Debug for ParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(item) => f.debug_tuple("Item").field(item).finish(),
            Self::NextPage { url, crawler } => f
                .debug_struct("NextPage")
                .field("url", url)
                .field("crawler", &crawler.name())
                .finish(),
            Self::NoOp => f.write_str("NoOp"),
        }
    }
}
