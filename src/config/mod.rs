//! Configuration module for Jobcrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use jobcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("jobcrawl.toml")).unwrap();
//! println!("Page workers: {}", config.crawler.page_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FetcherConfig, OutputConfig, PolitenessConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
