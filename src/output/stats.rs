//! Progress figures of a crawl request
//!
//! This module provides functionality for extracting and displaying
//! crawl progress from the storage layer.

use crate::state::CrawlState;
use crate::storage::{CrawlRequestRecord, DedupStore};
use crate::CrawlError;

/// Progress summary of one crawl request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlProgress {
    pub request_id: i64,
    pub state: CrawlState,

    /// Result pages reported by the first fetch; null until it succeeded
    pub num_pages: Option<u32>,

    /// Pages with a recorded status, the first page included
    pub pages_done: u64,

    /// Jobs owned by the request
    pub jobs_found: u64,

    /// Owned jobs whose detail page was fetched
    pub jobs_backfilled: u64,

    /// Candidates dropped because their key was already stored
    pub duplicates: u32,
}

/// Loads the progress of a crawl request from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
/// * `request_id` - The crawl request to summarize
///
/// # Returns
///
/// * `Ok(CrawlProgress)` - Successfully loaded progress
/// * `Err(CrawlError)` - Unknown request or failed query
pub fn load_progress(store: &dyn DedupStore, request_id: i64) -> Result<CrawlProgress, CrawlError> {
    let request = store.get_request(request_id)?;
    progress_of(store, &request)
}

/// Loads progress for an already fetched request record
pub fn progress_of(
    store: &dyn DedupStore,
    request: &CrawlRequestRecord,
) -> Result<CrawlProgress, CrawlError> {
    // Page 1 lives on the request itself
    let first_page = u64::from(request.num_pages.is_some_and(|n| n >= 1));

    Ok(CrawlProgress {
        request_id: request.id,
        state: request.state,
        num_pages: request.num_pages,
        pages_done: store.count_pages_done(request.id)? + first_page,
        jobs_found: store.count_jobs(request.id)?,
        jobs_backfilled: store.count_backfilled_jobs(request.id)?,
        duplicates: request.duplicates,
    })
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints progress to stdout in a formatted manner
pub fn print_progress(progress: &CrawlProgress) {
    println!("=== Crawl Request {} ===\n", progress.request_id);

    println!("  State: {}", progress.state);
    match progress.num_pages {
        Some(num_pages) => println!(
            "  Pages: {} / {} ({:.1}%)",
            progress.pages_done,
            num_pages,
            percentage(progress.pages_done, u64::from(num_pages))
        ),
        None => println!("  Pages: unknown (first page not fetched)"),
    }
    println!(
        "  Jobs: {} found, {} backfilled ({:.1}%)",
        progress.jobs_found,
        progress.jobs_backfilled,
        percentage(progress.jobs_backfilled, progress.jobs_found)
    );
    println!("  Duplicates: {}", progress.duplicates);
}

/// Prints one line per crawl request
pub fn print_request_list(requests: &[CrawlRequestRecord]) {
    if requests.is_empty() {
        println!("No crawl requests found");
        return;
    }

    println!(
        "{:>6}  {:<12}  {:>6}  {:>6}  {:<20}  {:<20}  {}",
        "ID", "STATE", "PAGES", "HITS", "TERM", "LOCATION", "CREATED"
    );
    for request in requests {
        println!(
            "{:>6}  {:<12}  {:>6}  {:>6}  {:<20}  {:<20}  {}",
            request.id,
            request.state.to_string(),
            request
                .num_pages
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            request
                .total_hits
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            request.term.as_deref().unwrap_or("-"),
            request.location.as_deref().unwrap_or("-"),
            request.created_at
        );
    }
}
