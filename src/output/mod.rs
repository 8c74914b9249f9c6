//! Output module for crawl results and reports
//!
//! This module handles:
//! - The final `CrawlResult` and the per-page errors it carries
//! - Printing a crawl result to the terminal
//! - Writing a markdown report of a crawl

mod markdown;
mod result;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use result::{CrawlFailure, CrawlResult, PageError};
pub use stats::{print_result, FailureBreakdown};
