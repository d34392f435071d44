//! Crawler module for paginated listing crawls
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - Randomized pacing between requests
//! - Site-specific payload extraction
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod politeness;
mod site;

pub use coordinator::{BackfillSummary, Coordinator, IngestSummary};
pub use fetcher::{
    build_http_client, fetch_all, fetch_url, FetchOptions, FetchResult, FetchedPage, Fetcher,
    Payload,
};
pub use politeness::{FetchOutcome, PolitenessController};
pub use site::{is_registered_site, profile_for, JobsChProfile, SiteProfile, REGISTERED_SITES};

use crate::config::Config;
use crate::query::FilterSpec;
use crate::CrawlError;

/// Runs a complete crawl for one search
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the configured database
/// 2. Persist a new crawl request
/// 3. Fetch the first page and expand it into page requests
/// 4. Fetch every page and ingest new jobs
/// 5. Backfill job details if enabled
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `filter` - The search to crawl
///
/// # Returns
///
/// * `Ok(i64)` - ID of the crawl request
/// * `Err(CrawlError)` - Crawl aborted on a storage or setup error
pub async fn crawl(config: Config, filter: &FilterSpec) -> Result<i64, CrawlError> {
    Coordinator::open(config)?.start(filter).await
}
