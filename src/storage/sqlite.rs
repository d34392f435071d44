//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DedupStore trait.

use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DedupStore, StorageError, StorageResult};
use crate::storage::{
    BackfillScope, CrawlRequestRecord, InsertOutcome, JobDetail, JobRecord, JobStub,
    NewCrawlRequest, NewPageRequest, PageRequestRecord, PaginationInfo,
};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Keys per `IN (...)` lookup, well below SQLite's bound-parameter limit
const KEY_LOOKUP_CHUNK: usize = 500;

const REQUEST_COLUMNS: &str = "id, term, location, days, url_api, url_browser, num_pages, \
     total_hits, actual_hits, duplicates, current_page, normalized_query, status, state, \
     created_at, updated_at";

const PAGE_COLUMNS: &str = "id, request_id, page, url_api, num_pages, total_hits, actual_hits, \
     duplicates, current_page, status, created_at, updated_at";

const JOB_COLUMNS: &str = "id, request_id, page_request_id, job_key, title, company_name, \
     company_id, company_slug, company_segmentation, place, publication_date, preview, slug, \
     is_active, is_paid, employment_position_ids, employment_grades, work_experience, \
     language_skills, url_en, url_de, url_fr, detail_url, description, lead_text, profession, \
     application_url, external_url, contact_person, publication_end_date, \
     headhunter_application_allowed, status, created_at, updated_at";

/// SQLite storage backend
///
/// The connection sits behind a mutex so page and backfill workers can share
/// one store; the lock is never held across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path` and applies the schema
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    fn count(&self, sql: &str, request_id: i64) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(sql, params![request_id], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRequestRecord> {
    Ok(CrawlRequestRecord {
        id: row.get(0)?,
        term: row.get(1)?,
        location: row.get(2)?,
        days: row.get(3)?,
        url_api: row.get(4)?,
        url_browser: row.get(5)?,
        num_pages: row.get(6)?,
        total_hits: row.get(7)?,
        actual_hits: row.get(8)?,
        duplicates: row.get(9)?,
        current_page: row.get(10)?,
        normalized_query: row.get(11)?,
        status: row.get(12)?,
        state: CrawlState::from_db_string(&row.get::<_, String>(13)?)
            .unwrap_or(CrawlState::Created),
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRequestRecord> {
    Ok(PageRequestRecord {
        id: row.get(0)?,
        request_id: row.get(1)?,
        page: row.get(2)?,
        url_api: row.get(3)?,
        num_pages: row.get(4)?,
        total_hits: row.get(5)?,
        actual_hits: row.get(6)?,
        duplicates: row.get(7)?,
        current_page: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        request_id: row.get(1)?,
        page_request_id: row.get(2)?,
        stub: JobStub {
            job_key: row.get(3)?,
            title: row.get(4)?,
            company_name: row.get(5)?,
            company_id: row.get(6)?,
            company_slug: row.get(7)?,
            company_segmentation: row.get(8)?,
            place: row.get(9)?,
            publication_date: row.get(10)?,
            preview: row.get(11)?,
            slug: row.get(12)?,
            is_active: row.get(13)?,
            is_paid: row.get(14)?,
            employment_position_ids: row.get(15)?,
            employment_grades: row.get(16)?,
            work_experience: row.get(17)?,
            language_skills: row.get(18)?,
            url_en: row.get(19)?,
            url_de: row.get(20)?,
            url_fr: row.get(21)?,
            detail_url: row.get(22)?,
        },
        // Detail flags merge into the stub's is_active/is_paid columns
        detail: JobDetail {
            description: row.get(23)?,
            lead_text: row.get(24)?,
            profession: row.get(25)?,
            application_url: row.get(26)?,
            external_url: row.get(27)?,
            contact_person: row.get(28)?,
            publication_end_date: row.get(29)?,
            is_active: None,
            is_paid: None,
            headhunter_application_allowed: row.get(30)?,
        },
        status: row.get(31)?,
        created_at: row.get(32)?,
        updated_at: row.get(33)?,
    })
}

impl DedupStore for SqliteStore {
    // ===== Crawl Requests =====

    fn create_request(&self, request: &NewCrawlRequest) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = now();
        conn.execute(
            "INSERT INTO crawl_requests (term, location, days, url_api, url_browser, state,
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                request.term,
                request.location,
                request.days,
                request.url_api,
                request.url_browser,
                CrawlState::Created.to_db_string(),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_request(&self, request_id: i64) -> StorageResult<CrawlRequestRecord> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM crawl_requests WHERE id = ?1", REQUEST_COLUMNS);
        conn.query_row(&sql, params![request_id], request_from_row)
            .optional()?
            .ok_or(StorageError::RequestNotFound(request_id))
    }

    fn list_requests(&self) -> StorageResult<Vec<CrawlRequestRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM crawl_requests ORDER BY id DESC", REQUEST_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let requests = stmt
            .query_map([], request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    fn record_pagination(
        &self,
        request_id: i64,
        status: u16,
        info: &PaginationInfo,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE crawl_requests SET status = ?1, num_pages = ?2, current_page = ?3,
             total_hits = ?4, actual_hits = ?5, normalized_query = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                status,
                info.num_pages,
                info.current_page,
                info.total_hits,
                info.actual_hits,
                info.normalized_query,
                now(),
                request_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::RequestNotFound(request_id));
        }
        Ok(())
    }

    fn update_request_state(
        &self,
        request_id: i64,
        state: CrawlState,
        status: Option<u16>,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE crawl_requests SET state = ?1, status = COALESCE(?2, status), updated_at = ?3
             WHERE id = ?4",
            params![state.to_db_string(), status, now(), request_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RequestNotFound(request_id));
        }
        Ok(())
    }

    // ===== Page Requests =====

    fn insert_page_requests(
        &self,
        request_id: i64,
        pages: &[NewPageRequest],
    ) -> StorageResult<Vec<i64>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now();
        let mut ids = Vec::with_capacity(pages.len());

        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO page_requests (request_id, page, url_api, created_at,
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            )?;
            let mut lookup =
                tx.prepare("SELECT id FROM page_requests WHERE request_id = ?1 AND page = ?2")?;

            for page in pages {
                insert.execute(params![request_id, page.page, page.url_api, now])?;
                let id: i64 = lookup.query_row(params![request_id, page.page], |row| row.get(0))?;
                ids.push(id);
            }
        }

        tx.commit()?;
        Ok(ids)
    }

    fn page_requests(&self, request_id: i64) -> StorageResult<Vec<PageRequestRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM page_requests WHERE request_id = ?1 ORDER BY page",
            PAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let pages = stmt
            .query_map(params![request_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn pending_page_requests(&self, request_id: i64) -> StorageResult<Vec<PageRequestRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM page_requests WHERE request_id = ?1 AND status IS NULL ORDER BY page",
            PAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let pages = stmt
            .query_map(params![request_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn record_page_pagination(
        &self,
        page_request_id: i64,
        status: u16,
        info: &PaginationInfo,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE page_requests SET status = ?1, num_pages = ?2, current_page = ?3,
             total_hits = ?4, actual_hits = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                status,
                info.num_pages,
                info.current_page,
                info.total_hits,
                info.actual_hits,
                now(),
                page_request_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::PageRequestNotFound(page_request_id));
        }
        Ok(())
    }

    fn set_page_status(&self, page_request_id: i64, status: u16) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE page_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now(), page_request_id],
        )?;
        if changed == 0 {
            return Err(StorageError::PageRequestNotFound(page_request_id));
        }
        Ok(())
    }

    // ===== Jobs =====

    fn exists(&self, job_key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM jobs WHERE job_key = ?1",
                params![job_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn existing_keys(&self, job_keys: &[String]) -> StorageResult<HashSet<String>> {
        let mut found = HashSet::new();
        if job_keys.is_empty() {
            return Ok(found);
        }

        let conn = self.conn()?;
        for chunk in job_keys.chunks(KEY_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT job_key FROM jobs WHERE job_key IN ({})", placeholders);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                found.insert(row?);
            }
        }

        Ok(found)
    }

    fn insert_unique(
        &self,
        request_id: i64,
        page_request_id: Option<i64>,
        stubs: &[JobStub],
    ) -> StorageResult<InsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now();
        let mut outcome = InsertOutcome::default();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO jobs (job_key, request_id, page_request_id, title,
                 company_name, company_id, company_slug, company_segmentation, place,
                 publication_date, preview, slug, is_active, is_paid, employment_position_ids,
                 employment_grades, work_experience, language_skills, url_en, url_de, url_fr,
                 detail_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23)",
            )?;

            for stub in stubs {
                let changed = stmt.execute(params![
                    stub.job_key,
                    request_id,
                    page_request_id,
                    stub.title,
                    stub.company_name,
                    stub.company_id,
                    stub.company_slug,
                    stub.company_segmentation,
                    stub.place,
                    stub.publication_date,
                    stub.preview,
                    stub.slug,
                    stub.is_active,
                    stub.is_paid,
                    stub.employment_position_ids,
                    stub.employment_grades,
                    stub.work_experience,
                    stub.language_skills,
                    stub.url_en,
                    stub.url_de,
                    stub.url_fr,
                    stub.detail_url,
                    now
                ])?;

                if changed == 0 {
                    outcome.duplicates += 1;
                } else {
                    outcome
                        .inserted
                        .push((stub.job_key.clone(), tx.last_insert_rowid()));
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn add_duplicates(
        &self,
        request_id: i64,
        page_request_id: Option<i64>,
        count: u32,
    ) -> StorageResult<()> {
        if count == 0 {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now();

        tx.execute(
            "UPDATE crawl_requests SET duplicates = duplicates + ?1, updated_at = ?2 WHERE id = ?3",
            params![count, now, request_id],
        )?;
        if let Some(page_id) = page_request_id {
            tx.execute(
                "UPDATE page_requests SET duplicates = duplicates + ?1, updated_at = ?2
                 WHERE id = ?3",
                params![count, now, page_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_job(&self, job_key: &str) -> StorageResult<Option<JobRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM jobs WHERE job_key = ?1", JOB_COLUMNS);
        let job = conn
            .query_row(&sql, params![job_key], job_from_row)
            .optional()?;
        Ok(job)
    }

    fn jobs_for_backfill(
        &self,
        request_id: Option<i64>,
        scope: BackfillScope,
        limit: Option<u32>,
    ) -> StorageResult<Vec<JobRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM jobs WHERE detail_url IS NOT NULL AND {}
             AND (?1 IS NULL OR request_id = ?1) ORDER BY id LIMIT ?2",
            JOB_COLUMNS,
            scope.status_predicate()
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(i64::from).unwrap_or(-1);

        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![request_id, limit], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn update_by_key(
        &self,
        job_key: &str,
        status: u16,
        detail: &JobDetail,
    ) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1,
                description = COALESCE(?2, description),
                lead_text = COALESCE(?3, lead_text),
                profession = COALESCE(?4, profession),
                application_url = COALESCE(?5, application_url),
                external_url = COALESCE(?6, external_url),
                contact_person = COALESCE(?7, contact_person),
                publication_end_date = COALESCE(?8, publication_end_date),
                is_active = COALESCE(?9, is_active),
                is_paid = COALESCE(?10, is_paid),
                headhunter_application_allowed = COALESCE(?11, headhunter_application_allowed),
                updated_at = ?12
             WHERE job_key = ?13",
            params![
                status,
                detail.description,
                detail.lead_text,
                detail.profession,
                detail.application_url,
                detail.external_url,
                detail.contact_person,
                detail.publication_end_date,
                detail.is_active,
                detail.is_paid,
                detail.headhunter_application_allowed,
                now(),
                job_key
            ],
        )?;
        Ok(changed > 0)
    }

    // ===== Statistics =====

    fn count_pages_done(&self, request_id: i64) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM page_requests WHERE request_id = ?1 AND status IS NOT NULL",
            request_id,
        )
    }

    fn count_jobs(&self, request_id: i64) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM jobs WHERE request_id = ?1", request_id)
    }

    fn count_backfilled_jobs(&self, request_id: i64) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM jobs WHERE request_id = ?1 AND status IS NOT NULL",
            request_id,
        )
    }
}
