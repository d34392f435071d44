//! Search URL construction
//!
//! Maps a structured [`FilterSpec`] to the two encodings the site understands:
//! the JSON search API and the browser-facing vacancies page. The mapping is
//! deterministic for a fixed "now", so a URL can always be recomputed from the
//! filter that produced it.

use chrono::{Days, Local, NaiveDateTime};

/// Fixed lookup from a domain value (e.g. `"employee"`) to the site's code
struct CodeTable {
    api_field: &'static str,
    browser_field: &'static str,
    options: &'static [(&'static str, &'static str)],
}

const POSITION_TYPES: CodeTable = CodeTable {
    api_field: "employment-position-ids%5B%5D",
    browser_field: "position",
    options: &[
        ("employee", "3"),
        ("specialist", "2"),
        ("executive position", "1"),
    ],
};

const LANGUAGES: CodeTable = CodeTable {
    api_field: "language-skills%5B%5D",
    browser_field: "language-skill",
    options: &[
        ("english", "en"),
        ("french", "fr"),
        ("italian", "it"),
        ("german", "de"),
        ("not indicated", "missing"),
    ],
};

const EMPLOYMENT_TYPES: CodeTable = CodeTable {
    api_field: "employment-type-ids%5B%5D",
    browser_field: "employment-type",
    options: &[
        ("apprenticeship", "6"),
        ("freelance", "2"),
        ("internship", "3"),
        ("supplementary income", "4"),
        ("temporary", "1"),
        ("unlimited employment", "5"),
    ],
};

const COMPANY_SEGMENTS: CodeTable = CodeTable {
    api_field: "company-segments%5B%5D",
    browser_field: "segment",
    options: &[
        ("small and medium", "kmu"),
        ("large", "gu"),
        ("consultants", "pdl"),
    ],
};

/// Browser code for "no language given"; the API sends an empty value instead
const MISSING_LANGUAGE_CODE: &str = "missing";

impl CodeTable {
    fn lookup(&self, name: &str) -> Option<&'static str> {
        let name = name.trim().to_lowercase();
        self.options
            .iter()
            .find(|(option, _)| *option == name)
            .map(|(_, code)| *code)
    }
}

/// Structured search filter submitted by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub term: Option<String>,
    pub location: Option<String>,
    /// Recency window in days; `None` or `0` disables the date filter
    pub days: Option<u32>,
    /// Workload percentage range `(min, max)`
    pub workload: Option<(u8, u8)>,
    pub position_types: Vec<String>,
    pub languages: Vec<String>,
    pub employment_types: Vec<String>,
    pub company_types: Vec<String>,
    /// Result page; only pages above 1 are encoded
    pub page: u32,
}

/// The pair of URLs produced for one filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryUrls {
    pub url_api: String,
    pub url_browser: String,
}

/// Builds search URLs against a configured pair of endpoints
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    api_base: String,
    browser_base: String,
}

#[derive(Default)]
struct Params {
    api: Vec<(&'static str, String)>,
    browser: Vec<(&'static str, String)>,
}

impl Params {
    fn both(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        self.api.push((key, value.clone()));
        self.browser.push((key, value));
    }

    fn table(&mut self, table: &CodeTable, names: &[String]) {
        for name in names {
            match table.lookup(name) {
                Some(code) => {
                    let api_code = if table.api_field == LANGUAGES.api_field
                        && code == MISSING_LANGUAGE_CODE
                    {
                        ""
                    } else {
                        code
                    };
                    self.api.push((table.api_field, api_code.to_string()));
                    self.browser.push((table.browser_field, code.to_string()));
                }
                None => tracing::debug!("Ignoring unknown {} value '{}'", table.browser_field, name),
            }
        }
    }
}

impl QueryBuilder {
    pub fn new(api_base: impl Into<String>, browser_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            browser_base: browser_base.into(),
        }
    }

    /// Builds both URLs with the recency window anchored to the local clock
    pub fn build(&self, filter: &FilterSpec) -> QueryUrls {
        self.build_at(filter, Local::now().naive_local())
    }

    /// Builds both URLs with the recency window anchored to `now`
    pub fn build_at(&self, filter: &FilterSpec, now: NaiveDateTime) -> QueryUrls {
        let mut params = Params::default();

        if let Some(location) = non_empty(&filter.location) {
            params.both("location", location);
        }

        if let Some(term) = non_empty(&filter.term) {
            params.api.push(("query", term.to_string()));
            params.browser.push(("term", term.to_string()));
        }

        if let Some((min, max)) = filter.workload {
            params.both("employment-grade-max", max.to_string());
            params.both("employment-grade-min", min.to_string());
        }

        if let Some(days) = filter.days.filter(|d| *d > 0) {
            let (from, to) = date_window(days, now);
            params.api.push(("publication-date-from", from));
            params.api.push(("publication-date-to", to));
            params.browser.push(("publication-date", days.to_string()));
        }

        params.table(&POSITION_TYPES, &filter.position_types);
        params.table(&LANGUAGES, &filter.languages);
        params.table(&EMPLOYMENT_TYPES, &filter.employment_types);
        params.table(&COMPANY_SEGMENTS, &filter.company_types);

        if filter.page > 1 {
            params.both("page", filter.page.to_string());
        }

        QueryUrls {
            url_api: format!("{}?{}", self.api_base, encode_params(&params.api)),
            url_browser: format!("{}?{}", self.browser_base, encode_params(&params.browser)),
        }
    }
}

/// Sets the `page` parameter of an already built search URL
///
/// Any `page` value already present is dropped, so the result carries exactly one.
pub fn with_page(url: &str, page: u32) -> String {
    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let page_param = format!("page={}", page);

    let mut params: Vec<&str> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .filter(|param| param.split('=').next() != Some("page"))
        .collect();
    params.push(&page_param);

    format!("{}?{}", base, params.join("&"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Returns the encoded `[from, to]` publication window for the last `days` days
///
/// `from` is midnight `days` days before today, `to` is the last second of today.
pub fn date_window(days: u32, now: NaiveDateTime) -> (String, String) {
    let today = now.date();
    let from_date = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(chrono::NaiveDate::MIN);

    let from = format!("{} 00:00:00", from_date.format("%Y-%m-%d"));
    let to = format!("{} 23:59:59", today.format("%Y-%m-%d"));

    (encode_value(&from), encode_value(&to))
}

/// Percent-encodes a value unless it already carries encoded spaces
///
/// Values that were encoded upstream (the date window) must go out verbatim.
fn encode_value(value: &str) -> String {
    if value.contains("%20") {
        value.to_string()
    } else {
        urlencoding::encode(value).replace("%2F", "/")
    }
}

fn encode_params(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, encode_value(value)))
        .collect::<Vec<_>>()
        .join("&")
}
