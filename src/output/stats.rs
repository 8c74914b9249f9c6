//! Crawl result statistics for terminal output

use crate::output::result::CrawlResult;
use std::collections::BTreeMap;

/// Count of recorded failures per failure kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureBreakdown {
    pub by_kind: BTreeMap<&'static str, u64>,
}

impl FailureBreakdown {
    pub fn from_result(result: &CrawlResult) -> Self {
        let mut by_kind = BTreeMap::new();
        for error in &result.errors {
            *by_kind.entry(error.cause.kind()).or_insert(0) += 1;
        }
        Self { by_kind }
    }

    pub fn total(&self) -> u64 {
        self.by_kind.values().sum()
    }
}

/// Prints a crawl result to stdout in a formatted manner
pub fn print_result(result: &CrawlResult) {
    println!("=== Crawl Result ===\n");

    println!("Overview:");
    println!("  Pages visited: {}", result.pages_visited);
    println!("  Items crawled: {}", result.items_crawled);
    println!("  Errors: {}", result.errors.len());
    println!("  Elapsed: {:.2}s", result.elapsed.as_secs_f64());
    println!();

    let breakdown = FailureBreakdown::from_result(result);
    if breakdown.total() == 0 {
        println!("No page errors recorded.");
        return;
    }

    println!("Errors by Kind:");
    let mut kinds: Vec<_> = breakdown.by_kind.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in kinds {
        println!("  {}: {}", kind, count);
    }
    println!();

    println!("Errors:");
    for error in &result.errors {
        println!("  - {}", error);
    }
}
