//! Markdown crawl report generation
//!
//! This module generates a human-readable markdown report of a crawl result,
//! including run timing, counters and the list of page errors.

use crate::output::result::CrawlResult;
use crate::output::stats::FailureBreakdown;
use crate::SkraperError;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report of the crawl result to `output_path`
///
/// # Arguments
///
/// * `result` - The finished crawl
/// * `seed_url` - The URL the crawl started from
/// * `output_path` - File to create or overwrite
///
/// # Returns
///
/// * `Ok(())` - The report was written
/// * `Err(SkraperError::Io)` - The file could not be created or written
pub fn write_markdown_report(
    result: &CrawlResult,
    seed_url: &str,
    output_path: &Path,
) -> Result<(), SkraperError> {
    let markdown = format_markdown_report(result, seed_url);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl result as markdown
pub fn format_markdown_report(result: &CrawlResult, seed_url: &str) -> String {
    let mut md = String::new();

    md.push_str("# Skraper Crawl Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", seed_url));
    md.push_str(&format!("- **Started**: {}\n", result.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", result.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        result.elapsed.as_secs_f64()
    ));
    let status = if result.is_complete() {
        "complete"
    } else if result.is_partial() {
        "partial"
    } else {
        "failed"
    };
    md.push_str(&format!("- **Status**: {}\n\n", status));

    // Counters
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Visited**: {}\n", result.pages_visited));
    md.push_str(&format!("- **Items Crawled**: {}\n", result.items_crawled));
    md.push_str(&format!("- **Errors**: {}\n\n", result.errors.len()));

    if result.errors.is_empty() {
        return md;
    }

    let breakdown = FailureBreakdown::from_result(result);
    md.push_str("## Errors by Kind\n\n");
    md.push_str("| Kind | Count |\n");
    md.push_str("|------|-------|\n");
    for (kind, count) in &breakdown.by_kind {
        md.push_str(&format!("| {} | {} |\n", kind, count));
    }
    md.push('\n');

    md.push_str("## Page Errors\n\n");
    md.push_str("| Page | Cause |\n");
    md.push_str("|------|-------|\n");
    for error in &result.errors {
        md.push_str(&format!(
            "| {} | {} |\n",
            error.page_url,
            error.cause.to_string().replace('|', "\\|")
        ));
    }
    md.push('\n');

    md
}
