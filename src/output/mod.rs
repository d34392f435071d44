//! Output module for crawl progress reporting
//!
//! This module handles:
//! - Structured per-entity progress events
//! - Progress summaries and request listings for the CLI
//! - Archiving raw fetched payloads to disk

mod archive;
pub mod progress;
pub mod stats;

pub use archive::PayloadArchive;
pub use stats::{load_progress, print_progress, print_request_list, CrawlProgress};
