//! Configuration module for Skraper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use skraper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("skraper.toml")).unwrap();
//! println!("Executor will run {} workers", config.executor.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, ExecutorConfig, HttpConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
