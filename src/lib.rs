//! Skraper: a concurrent, strategy-driven web crawling engine
//!
//! This crate fetches pages from a seed URL, hands each parsed document to a
//! caller-supplied [`Crawler`] strategy, dispatches the items it extracts to
//! typed sinks and follows the links it yields, until no work remains.
//! Per-page failures are isolated and reported in the final [`CrawlResult`].

pub mod config;
pub mod crawler;
pub mod output;
pub mod url;

use thiserror::Error;

/// Main error type for Skraper operations
///
/// Only failures of the executor's own bookkeeping surface through this type.
/// Everything that goes wrong while crawling an individual page is recorded
/// in [`CrawlResult::errors`] instead.
#[derive(Debug, Error)]
pub enum SkraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid CSS selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Work queue closed before the crawl started")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for Skraper operations
pub type Result<T> = std::result::Result<T, SkraperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    CrawlContext, Crawler, CrawlerExecutor, Document, HttpClient, HttpResponse, Outcomes,
    ParseOutcome, SelectorCrawler,
};
pub use output::{CrawlFailure, CrawlResult, PageError};
