//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a crawl request through its lifecycle:
//! - Persisting the request before any network call
//! - Fetching the first page and recording pagination metadata
//! - Expanding the request into page requests for pages 2..N
//! - Fetching pages through a bounded worker pool and deduplicating stubs
//! - Backfilling job detail pages
//! - Resuming any of the above from the persisted state
//!
//! Fetch failures stay local to their unit and leave its status null for a
//! later resume. Only storage errors abort a run.

use crate::config::Config;
use crate::crawler::politeness::{FetchOutcome, PolitenessController};
use crate::crawler::site::{profile_for, SiteProfile};
use crate::crawler::{FetchResult, Fetcher};
use crate::output::{progress, CrawlProgress, PayloadArchive};
use crate::query::{FilterSpec, QueryBuilder};
use crate::state::CrawlState;
use crate::storage::{
    open_store, BackfillScope, CrawlRequestRecord, DedupStore, JobDetail, JobRecord, JobStub,
    NewCrawlRequest, PageRequestRecord,
};
use crate::{CrawlError, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counts from one batch of ingested stubs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub duplicates: u32,
}

/// Counts from one backfill pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Jobs selected for the pass
    pub selected: usize,
    /// Jobs whose detail page was fetched
    pub backfilled: usize,
    /// Jobs whose detail page answered with a definite negative
    pub rejected: usize,
    /// Jobs left untouched by a soft failure or a stop request
    pub pending: usize,
}

/// How a single job of a backfill pass ended
enum JobOutcome {
    Backfilled,
    Rejected,
    Pending,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    store: Arc<dyn DedupStore>,
    fetcher: Fetcher,
    politeness: PolitenessController,
    site: Arc<dyn SiteProfile>,
    query: QueryBuilder,
    archive: Option<PayloadArchive>,
    stop: Arc<AtomicBool>,
}

impl Coordinator {
    /// Creates a new coordinator over an existing store
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `store` - The persistence backend shared by all workers
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Unknown site or unusable fetcher settings
    pub fn new(config: Config, store: Arc<dyn DedupStore>) -> Result<Self> {
        let site = profile_for(&config.crawler.site, &config.site)
            .ok_or_else(|| CrawlError::UnknownSite(config.crawler.site.clone()))?;
        let fetcher = Fetcher::new(&config.fetcher)?;
        let politeness = PolitenessController::new(&config.politeness);
        let query = QueryBuilder::new(config.site.api_url.clone(), config.site.browser_url.clone());
        let archive = config.output.archive_dir.as_ref().map(PayloadArchive::new);

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher,
            politeness,
            site,
            query,
            archive,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Opens the configured SQLite database and creates a coordinator over it
    pub fn open(config: Config) -> Result<Self> {
        let store = open_store(Path::new(&config.output.database_path))?;
        Self::new(config, Arc::new(store))
    }

    /// Flag that asks running workers to stop at the next unit boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn store(&self) -> &dyn DedupStore {
        self.store.as_ref()
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Submits a new search and crawls it as far as possible
    ///
    /// The request row is persisted before the first fetch, so the returned
    /// id can always be resumed. A crawl always begins at page 1 regardless
    /// of `filter.page`.
    pub async fn start(&self, filter: &FilterSpec) -> Result<i64> {
        let first_page = FilterSpec {
            page: 1,
            ..filter.clone()
        };
        let urls = self.query.build(&first_page);
        let request_id = self.store.create_request(&NewCrawlRequest {
            term: filter.term.clone(),
            location: filter.location.clone(),
            days: filter.days,
            url_api: urls.url_api,
            url_browser: Some(urls.url_browser),
        })?;

        tracing::info!("Created crawl request {}", request_id);

        self.drive(request_id, self.config.crawler.backfill_on_start)
            .await?;
        Ok(request_id)
    }

    /// Continues a crawl request from its persisted state
    ///
    /// # Returns
    ///
    /// The state the request was left in
    pub async fn resume(&self, request_id: i64) -> Result<CrawlState> {
        let request = self.store.get_request(request_id)?;

        match request.state {
            CrawlState::Done => {
                tracing::info!("Request {} is already done", request_id);
            }
            CrawlState::Failed => {
                tracing::info!(
                    "Request {} failed on its first page; submit a new search instead",
                    request_id
                );
            }
            state => tracing::info!("Resuming request {} from state {}", request_id, state),
        }

        self.drive(request_id, true).await
    }

    /// Runs a backfill pass over the jobs of one crawl request
    ///
    /// A request whose pages are done moves through `Backfilling` and on to
    /// `Done` once nothing is left pending. Requests still paging keep their
    /// state; only their already ingested jobs are backfilled.
    pub async fn backfill(
        &self,
        request_id: i64,
        scope: BackfillScope,
        limit: Option<u32>,
    ) -> Result<BackfillSummary> {
        let request = self.store.get_request(request_id)?;

        let tracks_state = matches!(
            request.state,
            CrawlState::PagesDone | CrawlState::Backfilling | CrawlState::Done
        );
        if tracks_state {
            self.transition(&request, CrawlState::Backfilling, None)?;
        } else {
            tracing::info!(
                "Request {} is {}; backfilling without a state change",
                request_id,
                request.state
            );
        }

        let summary = self.backfill_pass(Some(request_id), scope, limit).await?;

        if tracks_state {
            let request = self.store.get_request(request_id)?;
            self.finish_if_complete(&request)?;
        }

        Ok(summary)
    }

    /// Runs a backfill pass across all crawl requests
    ///
    /// Request states are left alone; resuming a request completes it.
    pub async fn backfill_all(
        &self,
        scope: BackfillScope,
        limit: Option<u32>,
    ) -> Result<BackfillSummary> {
        self.backfill_pass(None, scope, limit).await
    }

    /// Progress of a crawl request
    pub fn status(&self, request_id: i64) -> Result<CrawlProgress> {
        crate::output::load_progress(self.store.as_ref(), request_id)
    }

    // ===== State Machine =====

    /// Advances a request until it is terminal, blocked, or asked to stop
    async fn drive(&self, request_id: i64, backfill: bool) -> Result<CrawlState> {
        loop {
            let request = self.store.get_request(request_id)?;

            if self.should_stop() {
                tracing::info!(
                    "Stop requested; request {} left in state {}",
                    request_id,
                    request.state
                );
                return Ok(request.state);
            }

            let next = match request.state {
                CrawlState::Created => self.fetch_first_page(&request).await?,
                CrawlState::Fetched => self.expand(&request)?,
                CrawlState::Expanded => {
                    self.transition(&request, CrawlState::Paging, None)?;
                    CrawlState::Paging
                }
                CrawlState::Paging => self.run_pages(&request).await?,
                CrawlState::PagesDone if backfill => {
                    self.transition(&request, CrawlState::Backfilling, None)?;
                    CrawlState::Backfilling
                }
                CrawlState::Backfilling => {
                    self.backfill_pass(
                        Some(request.id),
                        BackfillScope::Pending,
                        self.config.crawler.backfill_limit,
                    )
                    .await?;
                    let request = self.store.get_request(request_id)?;
                    self.finish_if_complete(&request)?
                }
                state => return Ok(state),
            };

            // No transition means the rest is blocked on pending units
            if next == request.state {
                return Ok(next);
            }
        }
    }

    fn transition(
        &self,
        request: &CrawlRequestRecord,
        to: CrawlState,
        status: Option<u16>,
    ) -> Result<()> {
        if !request.state.can_transition_to(to) {
            return Err(CrawlError::InvalidTransition {
                from: request.state,
                to,
            });
        }

        self.store.update_request_state(request.id, to, status)?;
        tracing::debug!("Request {}: {} -> {}", request.id, request.state, to);
        Ok(())
    }

    /// Fetches page 1 and records its pagination and stubs
    async fn fetch_first_page(&self, request: &CrawlRequestRecord) -> Result<CrawlState> {
        let result = self.fetcher.fetch(&request.url_api).await;
        let outcome = FetchOutcome::of(&result);

        let next = match result {
            FetchResult::Fetched(page) => {
                if let Some(archive) = &self.archive {
                    archive.store_request(request.id, &page.payload);
                }

                match self.site.parse_pagination(&page.payload) {
                    Some(info) => {
                        self.store
                            .record_pagination(request.id, page.status_code, &info)?;
                        progress::request_fetched(request, page.status_code, &info);

                        let stubs = self.site.parse_stubs(&page.payload);
                        self.ingest(request.id, None, stubs)?;

                        self.transition(request, CrawlState::Fetched, None)?;
                        CrawlState::Fetched
                    }
                    None => {
                        progress::request_failed(
                            request,
                            Some(page.status_code),
                            "payload carries no pagination",
                        );
                        self.transition(request, CrawlState::Failed, Some(page.status_code))?;
                        CrawlState::Failed
                    }
                }
            }
            FetchResult::Rejected { status_code } => {
                progress::request_failed(request, Some(status_code), "first page rejected");
                self.transition(request, CrawlState::Failed, Some(status_code))?;
                CrawlState::Failed
            }
            FetchResult::SoftFailure {
                error, status_code, ..
            } => {
                progress::request_failed(request, status_code, &error);
                self.transition(request, CrawlState::Failed, status_code)?;
                CrawlState::Failed
            }
        };

        self.politeness.pause(outcome).await;
        Ok(next)
    }

    /// Persists page requests for pages 2..N in one batch
    fn expand(&self, request: &CrawlRequestRecord) -> Result<CrawlState> {
        let num_pages = request.num_pages.unwrap_or(0);

        if num_pages <= 1 {
            self.transition(request, CrawlState::PagesDone, None)?;
            return Ok(CrawlState::PagesDone);
        }

        let pages = self.site.sub_request_urls(&request.url_api, num_pages);
        let ids = self.store.insert_page_requests(request.id, &pages)?;
        tracing::info!(
            "Request {} expanded into {} page requests",
            request.id,
            ids.len()
        );

        self.transition(request, CrawlState::Expanded, None)?;
        Ok(CrawlState::Expanded)
    }

    /// Fetches every pending page request through the page worker pool
    async fn run_pages(&self, request: &CrawlRequestRecord) -> Result<CrawlState> {
        let pending = self.store.pending_page_requests(request.id)?;
        let total = pending.len();
        tracing::info!(
            "Request {}: fetching {} pending pages",
            request.id,
            total
        );

        let mut results = stream::iter(pending.iter().enumerate())
            .map(|(i, page)| self.process_page(page, (i + 1, total)))
            .buffer_unordered(self.config.crawler.page_workers.max(1));

        while let Some(result) = results.next().await {
            result?;
        }
        drop(results);

        if self.should_stop() {
            return Ok(CrawlState::Paging);
        }

        let remaining = self.store.pending_page_requests(request.id)?.len();
        if remaining > 0 {
            tracing::warn!(
                "Request {}: {} pages still pending; resume to retry them",
                request.id,
                remaining
            );
            return Ok(CrawlState::Paging);
        }

        self.transition(request, CrawlState::PagesDone, None)?;
        Ok(CrawlState::PagesDone)
    }

    /// Processes one page request: fetch, ingest, record, pause
    async fn process_page(&self, page: &PageRequestRecord, position: (usize, usize)) -> Result<()> {
        if self.should_stop() {
            return Ok(());
        }

        let result = self.fetcher.fetch(&page.url_api).await;
        let outcome = FetchOutcome::of(&result);

        match result {
            FetchResult::Fetched(fetched) => {
                if let Some(archive) = &self.archive {
                    archive.store_page(page.request_id, page.id, &fetched.payload);
                }

                let stubs = self.site.parse_stubs(&fetched.payload);
                let summary = self.ingest(page.request_id, Some(page.id), stubs)?;

                // Status goes last so a crash mid-ingest leaves the page pending
                let actual_hits = match self.site.parse_pagination(&fetched.payload) {
                    Some(info) => {
                        self.store
                            .record_page_pagination(page.id, fetched.status_code, &info)?;
                        info.actual_hits
                    }
                    None => {
                        tracing::debug!("Page request {} has no pagination metadata", page.id);
                        self.store.set_page_status(page.id, fetched.status_code)?;
                        0
                    }
                };

                progress::page_processed(
                    page,
                    Some(fetched.status_code),
                    actual_hits,
                    summary.duplicates,
                    position,
                );
            }
            FetchResult::Rejected { status_code } => {
                self.store.set_page_status(page.id, status_code)?;
                progress::page_processed(page, Some(status_code), 0, 0, position);
            }
            FetchResult::SoftFailure { error, .. } => {
                tracing::warn!("Page request {} soft-failed: {}", page.id, error);
                progress::page_processed(page, None, 0, 0, position);
            }
        }

        self.politeness.pause(outcome).await;
        Ok(())
    }

    /// Moves a backfilling request to `Done` once nothing is left pending
    fn finish_if_complete(&self, request: &CrawlRequestRecord) -> Result<CrawlState> {
        if self.should_stop() {
            return Ok(request.state);
        }

        let pages_pending = !self.store.pending_page_requests(request.id)?.is_empty();
        let jobs_pending = !self
            .store
            .jobs_for_backfill(Some(request.id), BackfillScope::Pending, Some(1))?
            .is_empty();

        if pages_pending || jobs_pending {
            tracing::info!(
                "Request {} still has pending work; resume to continue",
                request.id
            );
            return Ok(request.state);
        }

        self.transition(request, CrawlState::Done, None)?;
        tracing::info!("Request {} done", request.id);
        Ok(CrawlState::Done)
    }

    // ===== Ingestion =====

    /// Stores stubs whose key is not yet known and tallies the rest
    ///
    /// Keys repeated within the batch, keys already stored, and keys lost to
    /// a concurrent insert all count as duplicates.
    fn ingest(
        &self,
        request_id: i64,
        page_request_id: Option<i64>,
        stubs: Vec<JobStub>,
    ) -> Result<IngestSummary> {
        let mut seen = HashSet::new();
        let mut repeated = 0u32;
        let unique: Vec<JobStub> = stubs
            .into_iter()
            .filter(|stub| {
                let first = seen.insert(stub.job_key.clone());
                if !first {
                    repeated += 1;
                }
                first
            })
            .collect();

        let keys: Vec<String> = unique.iter().map(|stub| stub.job_key.clone()).collect();
        let existing = self.store.existing_keys(&keys)?;
        let (known, fresh): (Vec<JobStub>, Vec<JobStub>) = unique
            .into_iter()
            .partition(|stub| existing.contains(&stub.job_key));

        let outcome = self.store.insert_unique(request_id, page_request_id, &fresh)?;
        let duplicates = repeated + known.len() as u32 + outcome.duplicates;
        self.store
            .add_duplicates(request_id, page_request_id, duplicates)?;

        progress::stubs_ingested(
            request_id,
            page_request_id,
            outcome.inserted.len(),
            duplicates,
        );

        Ok(IngestSummary {
            inserted: outcome.inserted.len(),
            duplicates,
        })
    }

    // ===== Backfill =====

    async fn backfill_pass(
        &self,
        request_id: Option<i64>,
        scope: BackfillScope,
        limit: Option<u32>,
    ) -> Result<BackfillSummary> {
        let jobs = self.store.jobs_for_backfill(request_id, scope, limit)?;
        let total = jobs.len();
        let mut summary = BackfillSummary {
            selected: total,
            ..Default::default()
        };

        match request_id {
            Some(id) => tracing::info!("Request {}: backfilling {} jobs", id, total),
            None => tracing::info!("Backfilling {} jobs across all requests", total),
        }

        let targets = jobs
            .iter()
            .filter_map(|job| job.stub.detail_url.as_deref().map(|url| (job, url)));
        let mut results = stream::iter(targets.enumerate())
            .map(|(i, (job, url))| self.process_job(job, url, (i + 1, total)))
            .buffer_unordered(self.config.crawler.backfill_workers.max(1));

        while let Some(result) = results.next().await {
            match result? {
                JobOutcome::Backfilled => summary.backfilled += 1,
                JobOutcome::Rejected => summary.rejected += 1,
                JobOutcome::Pending => summary.pending += 1,
            }
        }

        Ok(summary)
    }

    /// Fetches one job's detail page and merges it into the stored row
    async fn process_job(
        &self,
        job: &JobRecord,
        url: &str,
        position: (usize, usize),
    ) -> Result<JobOutcome> {
        if self.should_stop() {
            return Ok(JobOutcome::Pending);
        }

        let key = &job.stub.job_key;
        let result = self.fetcher.fetch(url).await;
        let outcome = FetchOutcome::of(&result);

        let job_outcome = match result {
            FetchResult::Fetched(page) => {
                if let Some(archive) = &self.archive {
                    archive.store_job(key, &page.payload);
                }

                let detail = self.site.parse_detail(&page.payload).unwrap_or_else(|| {
                    tracing::debug!("Detail payload of job {} has no readable fields", key);
                    JobDetail::default()
                });
                self.store.update_by_key(key, page.status_code, &detail)?;
                progress::job_backfilled(job, Some(page.status_code), position);
                JobOutcome::Backfilled
            }
            FetchResult::Rejected { status_code } => {
                self.store
                    .update_by_key(key, status_code, &JobDetail::default())?;
                progress::job_backfilled(job, Some(status_code), position);
                JobOutcome::Rejected
            }
            FetchResult::SoftFailure { error, .. } => {
                tracing::debug!("Detail fetch of job {} soft-failed: {}", key, error);
                progress::job_backfilled(job, None, position);
                JobOutcome::Pending
            }
        };

        self.politeness.pause(outcome).await;
        Ok(job_outcome)
    }
}
