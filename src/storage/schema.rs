//! Database schema definitions
//!
//! Three tables linked by integer ids. Rows are never deleted; failure lives
//! in the `status` columns.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per submitted search
CREATE TABLE IF NOT EXISTS crawl_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term TEXT,
    location TEXT,
    days INTEGER,
    url_api TEXT NOT NULL,
    url_browser TEXT,
    num_pages INTEGER,
    total_hits INTEGER,
    actual_hits INTEGER,
    duplicates INTEGER NOT NULL DEFAULT 0,
    current_page INTEGER,
    normalized_query TEXT,
    status INTEGER,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per result page beyond the first
CREATE TABLE IF NOT EXISTS page_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL REFERENCES crawl_requests(id),
    page INTEGER NOT NULL,
    url_api TEXT NOT NULL,
    num_pages INTEGER,
    total_hits INTEGER,
    actual_hits INTEGER,
    duplicates INTEGER NOT NULL DEFAULT 0,
    current_page INTEGER,
    status INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(request_id, page)
);

CREATE INDEX IF NOT EXISTS idx_page_requests_status ON page_requests(request_id, status);

-- One row per distinct listing, keyed by the site's identifier
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_key TEXT NOT NULL UNIQUE,
    request_id INTEGER NOT NULL REFERENCES crawl_requests(id),
    page_request_id INTEGER REFERENCES page_requests(id),
    title TEXT,
    company_name TEXT,
    company_id INTEGER,
    company_slug TEXT,
    company_segmentation TEXT,
    place TEXT,
    publication_date TEXT,
    preview TEXT,
    slug TEXT,
    is_active INTEGER,
    is_paid INTEGER,
    employment_position_ids TEXT,
    employment_grades TEXT,
    work_experience TEXT,
    language_skills TEXT,
    url_en TEXT,
    url_de TEXT,
    url_fr TEXT,
    detail_url TEXT,
    description TEXT,
    lead_text TEXT,
    profession TEXT,
    application_url TEXT,
    external_url TEXT,
    contact_person TEXT,
    publication_end_date TEXT,
    headhunter_application_allowed INTEGER,
    status INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_request ON jobs(request_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
