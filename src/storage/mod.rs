//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler:
//! - SQLite database initialization and schema management
//! - Crawl requests, page requests and their pagination metadata
//! - Job records keyed by the site's natural key
//! - Selection of unfinished work for resumption and backfill

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{DedupStore, StorageError, StorageResult};

use crate::state::CrawlState;
use crate::CrawlError;

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_store(path: &Path) -> Result<SqliteStore, CrawlError> {
    SqliteStore::new(path)
}

/// A crawl request about to be persisted
#[derive(Debug, Clone, Default)]
pub struct NewCrawlRequest {
    pub term: Option<String>,
    pub location: Option<String>,
    pub days: Option<u32>,
    pub url_api: String,
    pub url_browser: Option<String>,
}

/// Represents a crawl request in the database
#[derive(Debug, Clone)]
pub struct CrawlRequestRecord {
    pub id: i64,
    pub term: Option<String>,
    pub location: Option<String>,
    pub days: Option<u32>,
    pub url_api: String,
    pub url_browser: Option<String>,
    pub num_pages: Option<u32>,
    pub total_hits: Option<u32>,
    pub actual_hits: Option<u32>,
    pub duplicates: u32,
    pub current_page: Option<u32>,
    pub normalized_query: Option<String>,
    /// Last observed HTTP status; null until the first page was fetched
    pub status: Option<u16>,
    pub state: CrawlState,
    pub created_at: String,
    pub updated_at: String,
}

/// A page request about to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPageRequest {
    pub page: u32,
    pub url_api: String,
}

/// Represents one secondary result page of a crawl request
#[derive(Debug, Clone)]
pub struct PageRequestRecord {
    pub id: i64,
    pub request_id: i64,
    pub page: u32,
    pub url_api: String,
    pub num_pages: Option<u32>,
    pub total_hits: Option<u32>,
    pub actual_hits: Option<u32>,
    pub duplicates: u32,
    pub current_page: Option<u32>,
    /// HTTP status of the page fetch; null until a definitive answer arrived
    pub status: Option<u16>,
    pub created_at: String,
    pub updated_at: String,
}

/// Pagination metadata extracted from a result page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    pub num_pages: u32,
    pub current_page: Option<u32>,
    pub total_hits: Option<u32>,
    pub actual_hits: u32,
    pub normalized_query: Option<String>,
}

/// Listing fields copied from a search result entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStub {
    /// The site's own identifier, unique across all jobs
    pub job_key: String,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub company_id: Option<i64>,
    pub company_slug: Option<String>,
    pub company_segmentation: Option<String>,
    pub place: Option<String>,
    pub publication_date: Option<String>,
    pub preview: Option<String>,
    pub slug: Option<String>,
    pub is_active: Option<bool>,
    pub is_paid: Option<bool>,
    /// JSON-encoded list fields
    pub employment_position_ids: Option<String>,
    pub employment_grades: Option<String>,
    pub work_experience: Option<String>,
    pub language_skills: Option<String>,
    pub url_en: Option<String>,
    pub url_de: Option<String>,
    pub url_fr: Option<String>,
    /// Endpoint of the detail payload fetched during backfill
    pub detail_url: Option<String>,
}

/// Fields merged into a job once its detail page was fetched
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDetail {
    pub description: Option<String>,
    pub lead_text: Option<String>,
    pub profession: Option<String>,
    pub application_url: Option<String>,
    pub external_url: Option<String>,
    pub contact_person: Option<String>,
    pub publication_end_date: Option<String>,
    pub is_active: Option<bool>,
    pub is_paid: Option<bool>,
    pub headhunter_application_allowed: Option<bool>,
}

/// Represents a job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub request_id: i64,
    /// Null for jobs found on the first page, which the crawl request itself covers
    pub page_request_id: Option<i64>,
    pub stub: JobStub,
    pub detail: JobDetail,
    /// HTTP status of the detail fetch; null until backfilled
    pub status: Option<u16>,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of a batched unique insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// `(job_key, row id)` of every newly stored job
    pub inserted: Vec<(String, i64)>,
    /// Candidates rejected by the uniqueness constraint
    pub duplicates: u32,
}

/// Which jobs a backfill pass selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackfillScope {
    /// Jobs whose detail page was never fetched
    #[default]
    Pending,
    /// Pending jobs plus those whose detail fetch was not a 2xx
    NonSuccess,
    /// Every job with a detail URL
    All,
}

impl BackfillScope {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "non-success" => Some(Self::NonSuccess),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// SQL predicate over the `status` column
    fn status_predicate(&self) -> &'static str {
        match self {
            Self::Pending => "status IS NULL",
            Self::NonSuccess => "(status IS NULL OR status < 200 OR status >= 300)",
            Self::All => "1 = 1",
        }
    }
}
