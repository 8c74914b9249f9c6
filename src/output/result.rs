//! Crawl result and per-page error types

use crate::crawler::TransportError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a page could not be fully processed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrawlFailure {
    /// The fetch itself failed (non-2xx status, network error, ...)
    #[error("transport failure: {0}")]
    Transport(TransportError),

    /// The strategy reported an error while producing outcomes
    #[error("strategy error: {0}")]
    Strategy(String),

    /// A follow-up link could not be turned into a URL to fetch
    #[error("invalid follow-up link '{url}': {reason}")]
    FollowUp { url: String, reason: String },

    /// An item could not be delivered to its sink
    #[error("sink for {item_type} rejected item: {reason}")]
    Sink { item_type: String, reason: String },

    /// Strategy code panicked while the page was being processed
    #[error("page processing panicked: {0}")]
    Panicked(String),
}

impl CrawlFailure {
    /// Short label used when grouping failures in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Strategy(_) => "strategy",
            Self::FollowUp { .. } => "follow-up",
            Self::Sink { .. } => "sink",
            Self::Panicked(_) => "panic",
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A failure recorded against one page; never modified once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageError {
    /// URL of the page being processed when the failure happened
    pub page_url: String,

    /// What went wrong
    pub cause: CrawlFailure,
}

impl PageError {
    pub fn new(page_url: impl Into<String>, cause: CrawlFailure) -> Self {
        Self {
            page_url: page_url.into(),
            cause,
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.page_url, self.cause)
    }
}

/// Final report of one crawl run
///
/// A non-empty `errors` list alongside plausible counts is a partial
/// success, which is an expected outcome rather than an exceptional one.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Number of follow-up pages enqueued during the run
    pub pages_visited: u64,

    /// Number of items yielded by strategies across the run
    pub items_crawled: u64,

    /// Every page failure recorded during the run
    pub errors: Vec<PageError>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl CrawlResult {
    /// Returns true if no page failed
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if some pages failed but the crawl still produced work
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() && (self.items_crawled > 0 || self.pages_visited > 0)
    }

    /// Errors recorded against the given page
    pub fn errors_for<'a>(&'a self, page_url: &'a str) -> impl Iterator<Item = &'a PageError> + 'a {
        self.errors.iter().filter(move |e| e.page_url == page_url)
    }
}
