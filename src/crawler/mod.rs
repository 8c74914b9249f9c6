//! Crawl engine: strategies, work scheduling and item dispatch
//!
//! This module contains the core crawling logic, including:
//! - The executor that owns the worker pool and detects completion
//! - Crawl contexts and the shared pending-task counter
//! - The `Crawler` strategy contract and its outcomes
//! - Type-keyed item sinks
//! - HTTP fetching and HTML parsing

mod context;
mod executor;
mod fetcher;
mod parser;
mod selector;
mod sinks;
mod strategy;
mod worker;

pub use context::{CrawlContext, CrawlState};
pub use executor::CrawlerExecutor;
pub use fetcher::{build_http_client, HttpClient, HttpResponse, ReqwestHttpClient, TransportError};
pub use parser::{element_text, parse_selector, Document};
pub use selector::SelectorCrawler;
pub use sinks::SinkRegistry;
pub use strategy::{CrawledItem, Crawler, Outcomes, ParseOutcome};
