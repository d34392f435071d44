//! Per-entity progress events
//!
//! One structured `tracing` event per processed crawl request, page request
//! and job. Operators follow a crawl through these; nothing here touches
//! storage.

use crate::storage::{CrawlRequestRecord, JobRecord, PageRequestRecord, PaginationInfo};

/// Logs the first page of a crawl request
pub fn request_fetched(request: &CrawlRequestRecord, status: u16, info: &PaginationInfo) {
    tracing::info!(
        request_id = request.id,
        status,
        term = request.term.as_deref().unwrap_or(""),
        location = request.location.as_deref().unwrap_or(""),
        days = request.days,
        current_page = info.current_page,
        num_pages = info.num_pages,
        total_hits = info.total_hits,
        url = %request.url_api,
        "Request {} fetched: {} pages, {} hits",
        request.id,
        info.num_pages,
        info.total_hits.unwrap_or(0)
    );
}

/// Logs a crawl request whose first page could not be used
pub fn request_failed(request: &CrawlRequestRecord, status: Option<u16>, reason: &str) {
    tracing::warn!(
        request_id = request.id,
        status,
        url = %request.url_api,
        "Request {} failed: {}",
        request.id,
        reason
    );
}

/// Logs the result of one page request
///
/// `position` is the page's 1-based index within this pass and the pass size.
pub fn page_processed(
    page: &PageRequestRecord,
    status: Option<u16>,
    actual_hits: u32,
    duplicates: u32,
    position: (usize, usize),
) {
    let (index, total) = position;
    match status {
        Some(status) => tracing::info!(
            page_request_id = page.id,
            request_id = page.request_id,
            page = page.page,
            status,
            actual_hits,
            duplicates,
            "Page {} of request {} done ({}/{})",
            page.page,
            page.request_id,
            index,
            total
        ),
        None => tracing::warn!(
            page_request_id = page.id,
            request_id = page.request_id,
            page = page.page,
            "Page {} of request {} left pending ({}/{})",
            page.page,
            page.request_id,
            index,
            total
        ),
    }
}

/// Logs the result of one job detail fetch
pub fn job_backfilled(job: &JobRecord, status: Option<u16>, position: (usize, usize)) {
    let (index, total) = position;
    let title = job.stub.title.as_deref().unwrap_or("");
    let company = job.stub.company_name.as_deref().unwrap_or("");
    let place = job.stub.place.as_deref().unwrap_or("");

    match status {
        Some(status) => tracing::info!(
            job_id = job.id,
            job_key = %job.stub.job_key,
            status,
            title,
            company,
            place,
            "Job {} backfilled ({}/{})",
            job.stub.job_key,
            index,
            total
        ),
        None => tracing::warn!(
            job_id = job.id,
            job_key = %job.stub.job_key,
            title,
            "Job {} left pending ({}/{})",
            job.stub.job_key,
            index,
            total
        ),
    }
}

/// Logs a batch of ingested stubs
pub fn stubs_ingested(
    request_id: i64,
    page_request_id: Option<i64>,
    inserted: usize,
    duplicates: u32,
) {
    tracing::debug!(
        request_id,
        page_request_id,
        inserted,
        duplicates,
        "Ingested {} new jobs, {} duplicates",
        inserted,
        duplicates
    );
}
