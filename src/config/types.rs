use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Jobcrawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    pub output: OutputConfig,
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Per-attempt timeout (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Total attempts per fetch, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts, multiplied by the attempt number (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,

    /// Cookies sent with every request
    pub cookies: HashMap<String, String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
            retry_backoff_ms: 500,
            user_agent: format!("jobcrawl/{}", env!("CARGO_PKG_VERSION")),
            headers: HashMap::new(),
            cookies: HashMap::new(),
        }
    }
}

/// Randomized pause between outbound requests
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub enabled: bool,

    #[serde(rename = "success-min-ms")]
    pub success_min_ms: u64,

    #[serde(rename = "success-max-ms")]
    pub success_max_ms: u64,

    #[serde(rename = "failure-min-ms")]
    pub failure_min_ms: u64,

    #[serde(rename = "failure-max-ms")]
    pub failure_max_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            success_min_ms: 1_000,
            success_max_ms: 1_500,
            failure_min_ms: 3_000,
            failure_max_ms: 4_500,
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Registry key of the site profile to use
    pub site: String,

    /// Concurrent page-request workers
    #[serde(rename = "page-workers")]
    pub page_workers: usize,

    /// Concurrent job-detail workers
    #[serde(rename = "backfill-workers")]
    pub backfill_workers: usize,

    /// Run the backfill pass right after paging finishes
    #[serde(rename = "backfill-on-start")]
    pub backfill_on_start: bool,

    /// Maximum jobs handled by a single backfill pass
    #[serde(rename = "backfill-limit")]
    pub backfill_limit: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            site: "jobs.ch".to_string(),
            page_workers: 4,
            backfill_workers: 2,
            backfill_on_start: true,
            backfill_limit: None,
        }
    }
}

/// Remote endpoints of the targeted site
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Search API endpoint (without query string)
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Browser-facing search page (without query string)
    #[serde(rename = "browser-url")]
    pub browser_url: String,

    /// Base of the per-job detail endpoint; the job id is appended as a path segment
    #[serde(rename = "detail-url")]
    pub detail_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.jobs.ch/api/v1/public/search".to_string(),
            browser_url: "https://www.jobs.ch/en/vacancies/".to_string(),
            detail_url: "https://www.jobs.ch/api/v1/public/search/job".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory for raw fetched payloads; archiving is off when unset
    #[serde(rename = "archive-dir", default)]
    pub archive_dir: Option<String>,
}
