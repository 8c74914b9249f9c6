//! URL handling module for Skraper
//!
//! The executor resolves the crawl host once from the seed URL and then
//! resolves every follow-up link a strategy yields against that host.

mod host;
mod resolve;

// Re-export main functions
pub use host::crawl_host;
pub use resolve::{is_absolute, resolve_follow_up};
