//! Storage traits and error types
//!
//! This module defines the persistence interface the orchestrator consumes.
//! The orchestrator never issues SQL itself; everything goes through
//! [`DedupStore`].

use crate::state::CrawlState;
use crate::storage::{
    BackfillScope, CrawlRequestRecord, InsertOutcome, JobDetail, JobRecord, JobStub,
    NewCrawlRequest, NewPageRequest, PageRequestRecord, PaginationInfo,
};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any of these aborts the current run; committed rows stay intact.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crawl request not found: {0}")]
    RequestNotFound(i64),

    #[error("Page request not found: {0}")]
    PageRequestNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence interface for crawl requests, page requests and jobs
///
/// Every write runs in its own transaction. Implementations must be safe to
/// share between concurrent page and backfill workers; the job key's
/// uniqueness constraint is the final guard against two workers inserting
/// the same job.
pub trait DedupStore: Send + Sync {
    // ===== Crawl Requests =====

    /// Persists a new crawl request in the `Created` state
    fn create_request(&self, request: &NewCrawlRequest) -> StorageResult<i64>;

    /// Gets a crawl request by ID
    fn get_request(&self, request_id: i64) -> StorageResult<CrawlRequestRecord>;

    /// Lists all crawl requests, newest first
    fn list_requests(&self) -> StorageResult<Vec<CrawlRequestRecord>>;

    /// Stores first-page pagination metadata and the status it came with
    fn record_pagination(
        &self,
        request_id: i64,
        status: u16,
        info: &PaginationInfo,
    ) -> StorageResult<()>;

    /// Moves a crawl request to `state`, optionally recording a new status
    fn update_request_state(
        &self,
        request_id: i64,
        state: CrawlState,
        status: Option<u16>,
    ) -> StorageResult<()>;

    // ===== Page Requests =====

    /// Inserts page requests for a crawl request in one transaction
    ///
    /// Pages that already exist are left alone, so calling this twice for the
    /// same request yields the same rows.
    ///
    /// # Returns
    ///
    /// The IDs of all page requests for the given pages, in input order
    fn insert_page_requests(
        &self,
        request_id: i64,
        pages: &[NewPageRequest],
    ) -> StorageResult<Vec<i64>>;

    /// Gets all page requests of a crawl request in page order
    fn page_requests(&self, request_id: i64) -> StorageResult<Vec<PageRequestRecord>>;

    /// Gets page requests whose status is still null, in page order
    fn pending_page_requests(&self, request_id: i64) -> StorageResult<Vec<PageRequestRecord>>;

    /// Stores a fetched page's pagination metadata and status
    fn record_page_pagination(
        &self,
        page_request_id: i64,
        status: u16,
        info: &PaginationInfo,
    ) -> StorageResult<()>;

    /// Records a terminal status for a page request without metadata
    fn set_page_status(&self, page_request_id: i64, status: u16) -> StorageResult<()>;

    // ===== Jobs =====

    /// Checks whether a job with this natural key exists
    fn exists(&self, job_key: &str) -> StorageResult<bool>;

    /// Returns the subset of `job_keys` already stored
    fn existing_keys(&self, job_keys: &[String]) -> StorageResult<HashSet<String>>;

    /// Inserts jobs, skipping any whose key is already stored
    fn insert_unique(
        &self,
        request_id: i64,
        page_request_id: Option<i64>,
        stubs: &[JobStub],
    ) -> StorageResult<InsertOutcome>;

    /// Adds to the duplicate tally of a crawl request and, if given, its page request
    fn add_duplicates(
        &self,
        request_id: i64,
        page_request_id: Option<i64>,
        count: u32,
    ) -> StorageResult<()>;

    /// Gets a job by its natural key
    fn get_job(&self, job_key: &str) -> StorageResult<Option<JobRecord>>;

    /// Selects jobs with a detail URL for a backfill pass, oldest first
    ///
    /// `request_id = None` selects across all crawl requests.
    fn jobs_for_backfill(
        &self,
        request_id: Option<i64>,
        scope: BackfillScope,
        limit: Option<u32>,
    ) -> StorageResult<Vec<JobRecord>>;

    /// Records the detail status of a job and merges the non-empty detail fields
    ///
    /// # Returns
    ///
    /// `false` if no job has this key
    fn update_by_key(&self, job_key: &str, status: u16, detail: &JobDetail)
        -> StorageResult<bool>;

    // ===== Statistics =====

    /// Counts page requests of a crawl request with a non-null status
    fn count_pages_done(&self, request_id: i64) -> StorageResult<u64>;

    /// Counts jobs owned by a crawl request
    fn count_jobs(&self, request_id: i64) -> StorageResult<u64>;

    /// Counts jobs owned by a crawl request whose detail page was fetched
    fn count_backfilled_jobs(&self, request_id: i64) -> StorageResult<u64>;
}
