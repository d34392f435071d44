//! Site profiles and their registry
//!
//! A [`SiteProfile`] knows how to read one remote site's payloads. The
//! coordinator holds a single profile behind a trait object and stays
//! unaware of any site-specific field names.

use crate::config::SiteConfig;
use crate::crawler::Payload;
use crate::query::with_page;
use crate::storage::{JobDetail, JobStub, NewPageRequest, PaginationInfo};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Per-site extraction and URL logic
pub trait SiteProfile: Send + Sync {
    /// Registry key of this profile
    fn name(&self) -> &'static str;

    /// Reads pagination metadata from a search result payload
    ///
    /// Returns `None` if the payload does not look like a result page.
    fn parse_pagination(&self, payload: &Payload) -> Option<PaginationInfo>;

    /// Extracts job stubs from a search result payload
    ///
    /// A payload without the expected list yields no stubs.
    fn parse_stubs(&self, payload: &Payload) -> Vec<JobStub>;

    /// Reads the detail fields of a job detail payload
    fn parse_detail(&self, payload: &Payload) -> Option<JobDetail>;

    /// Builds the page requests for pages `2..=num_pages`
    fn sub_request_urls(&self, base_url: &str, num_pages: u32) -> Vec<NewPageRequest>;

    /// Detail endpoint of a job
    fn detail_url(&self, job_key: &str) -> String;
}

/// Names of all registered sites
pub const REGISTERED_SITES: &[&str] = &[JobsChProfile::NAME];

/// Checks whether a site name is known to the registry
pub fn is_registered_site(name: &str) -> bool {
    REGISTERED_SITES.contains(&name)
}

/// Looks up the profile registered under `name`
pub fn profile_for(name: &str, config: &SiteConfig) -> Option<Arc<dyn SiteProfile>> {
    match name {
        JobsChProfile::NAME => Some(Arc::new(JobsChProfile::new(config))),
        _ => None,
    }
}

/// Profile of the jobs.ch public search API
#[derive(Debug, Clone)]
pub struct JobsChProfile {
    detail_base: String,
}

impl JobsChProfile {
    pub const NAME: &'static str = "jobs.ch";

    pub fn new(config: &SiteConfig) -> Self {
        Self {
            detail_base: config.detail_url.trim_end_matches('/').to_string(),
        }
    }
}

/// The object carrying the fields, unwrapping a `data` envelope if present
fn body(payload: &Payload) -> Option<&Map<String, Value>> {
    let root = payload.as_json()?.as_object()?;
    match root.get("data").and_then(Value::as_object) {
        Some(data) if !root.contains_key("documents") => Some(data),
        _ => Some(root),
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(object: &Map<String, Value>, key: &str) -> Option<u32> {
    object
        .get(key)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Option<bool> {
    object.get(key)?.as_bool()
}

/// Lists and objects are stored as JSON text
fn json_text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn link_field(object: &Map<String, Value>, link: &str) -> Option<String> {
    object
        .get("_links")?
        .get(link)?
        .get("href")?
        .as_str()
        .map(str::to_string)
}

impl JobsChProfile {
    fn stub_from(&self, document: &Map<String, Value>) -> Option<JobStub> {
        let job_key = string_field(document, "job_id")?;

        Some(JobStub {
            title: string_field(document, "title"),
            company_name: string_field(document, "company_name"),
            company_id: document.get("company_id").and_then(Value::as_i64),
            company_slug: string_field(document, "company_slug"),
            company_segmentation: string_field(document, "company_segmentation"),
            place: string_field(document, "place"),
            publication_date: string_field(document, "publication_date"),
            preview: string_field(document, "preview"),
            slug: string_field(document, "slug"),
            is_active: bool_field(document, "is_active"),
            is_paid: bool_field(document, "is_paid"),
            employment_position_ids: json_text_field(document, "employment_position_ids"),
            employment_grades: json_text_field(document, "employment_grades"),
            work_experience: json_text_field(document, "work_experience"),
            language_skills: json_text_field(document, "language_skills"),
            url_en: link_field(document, "detail_en"),
            url_de: link_field(document, "detail_de"),
            url_fr: link_field(document, "detail_fr"),
            detail_url: Some(self.detail_url(&job_key)),
            job_key,
        })
    }
}

impl SiteProfile for JobsChProfile {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse_pagination(&self, payload: &Payload) -> Option<PaginationInfo> {
        let body = body(payload)?;
        let num_pages = u32_field(body, "num_pages")?;
        let actual_hits = body
            .get("documents")
            .and_then(Value::as_array)
            .map(|documents| documents.len() as u32)
            .unwrap_or(0);

        Some(PaginationInfo {
            num_pages,
            current_page: u32_field(body, "current_page"),
            total_hits: u32_field(body, "total_hits"),
            actual_hits,
            normalized_query: string_field(body, "normalized_search_query"),
        })
    }

    fn parse_stubs(&self, payload: &Payload) -> Vec<JobStub> {
        let Some(documents) = body(payload)
            .and_then(|body| body.get("documents"))
            .and_then(Value::as_array)
        else {
            tracing::debug!("Payload has no document list");
            return Vec::new();
        };

        documents
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|document| {
                let stub = self.stub_from(document);
                if stub.is_none() {
                    tracing::debug!("Skipping document without job_id");
                }
                stub
            })
            .collect()
    }

    fn parse_detail(&self, payload: &Payload) -> Option<JobDetail> {
        let body = body(payload)?;

        Some(JobDetail {
            description: string_field(body, "template_text"),
            lead_text: string_field(body, "template_lead_text"),
            profession: string_field(body, "template_profession"),
            application_url: string_field(body, "application_url"),
            external_url: string_field(body, "external_url"),
            contact_person: json_text_field(body, "contact_person"),
            publication_end_date: string_field(body, "publication_end_date"),
            is_active: bool_field(body, "is_active"),
            is_paid: bool_field(body, "is_paid"),
            headhunter_application_allowed: bool_field(body, "headhunter_application_allowed"),
        })
    }

    fn sub_request_urls(&self, base_url: &str, num_pages: u32) -> Vec<NewPageRequest> {
        (2..=num_pages)
            .map(|page| NewPageRequest {
                page,
                url_api: with_page(base_url, page),
            })
            .collect()
    }

    fn detail_url(&self, job_key: &str) -> String {
        format!("{}/{}", self.detail_base, job_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> JobsChProfile {
        JobsChProfile::new(&SiteConfig::default())
    }

    fn search_payload() -> Payload {
        Payload::Json(json!({
            "num_pages": 3,
            "current_page": 1,
            "total_hits": 42,
            "normalized_search_query": "python",
            "documents": [
                {
                    "job_id": "a1",
                    "title": "Python Developer",
                    "company_name": "Acme AG",
                    "company_id": 17,
                    "place": "Zürich",
                    "is_active": true,
                    "is_paid": false,
                    "employment_grades": [80, 100],
                    "_links": {
                        "detail_en": {"href": "https://www.jobs.ch/en/vacancies/detail/a1/"},
                        "detail_de": {"href": "https://www.jobs.ch/de/stellenangebote/detail/a1/"}
                    }
                },
                {"title": "No identifier"},
                {"job_id": "b2", "title": "Data Engineer"}
            ]
        }))
    }

    #[test]
    fn test_registry() {
        assert!(is_registered_site("jobs.ch"));
        assert!(!is_registered_site("example.com"));

        let profile = profile_for("jobs.ch", &SiteConfig::default()).unwrap();
        assert_eq!(profile.name(), "jobs.ch");
        assert!(profile_for("unknown", &SiteConfig::default()).is_none());
    }

    #[test]
    fn test_parse_pagination() {
        let info = profile().parse_pagination(&search_payload()).unwrap();

        assert_eq!(info.num_pages, 3);
        assert_eq!(info.current_page, Some(1));
        assert_eq!(info.total_hits, Some(42));
        assert_eq!(info.actual_hits, 3);
        assert_eq!(info.normalized_query.as_deref(), Some("python"));
    }

    #[test]
    fn test_parse_pagination_in_data_envelope() {
        let payload = Payload::Json(json!({"data": {"num_pages": 2, "documents": []}}));
        let info = profile().parse_pagination(&payload).unwrap();
        assert_eq!(info.num_pages, 2);
        assert_eq!(info.actual_hits, 0);
    }

    #[test]
    fn test_parse_pagination_rejects_other_shapes() {
        let profile = profile();
        assert!(profile
            .parse_pagination(&Payload::Text("<html></html>".to_string()))
            .is_none());
        assert!(profile
            .parse_pagination(&Payload::Json(json!({"documents": []})))
            .is_none());
        assert!(profile.parse_pagination(&Payload::Json(json!([1, 2]))).is_none());
    }

    #[test]
    fn test_parse_stubs() {
        let stubs = profile().parse_stubs(&search_payload());

        assert_eq!(stubs.len(), 2);
        let first = &stubs[0];
        assert_eq!(first.job_key, "a1");
        assert_eq!(first.title.as_deref(), Some("Python Developer"));
        assert_eq!(first.company_id, Some(17));
        assert_eq!(first.is_active, Some(true));
        assert_eq!(first.employment_grades.as_deref(), Some("[80,100]"));
        assert_eq!(
            first.url_en.as_deref(),
            Some("https://www.jobs.ch/en/vacancies/detail/a1/")
        );
        assert_eq!(first.url_fr, None);
        assert_eq!(
            first.detail_url.as_deref(),
            Some("https://www.jobs.ch/api/v1/public/search/job/a1")
        );
        assert_eq!(stubs[1].job_key, "b2");
    }

    #[test]
    fn test_parse_stubs_without_documents() {
        let profile = profile();
        assert!(profile
            .parse_stubs(&Payload::Json(json!({"num_pages": 1})))
            .is_empty());
        assert!(profile
            .parse_stubs(&Payload::Text("oops".to_string()))
            .is_empty());
    }

    #[test]
    fn test_parse_detail() {
        let payload = Payload::Json(json!({
            "template_text": "<p>Full description</p>",
            "template_lead_text": "Lead",
            "application_url": "https://apply.example.com",
            "contact_person": {"first_name": "Anna", "last_name": "Muster"},
            "is_active": false,
            "headhunter_application_allowed": true
        }));

        let detail = profile().parse_detail(&payload).unwrap();
        assert_eq!(detail.description.as_deref(), Some("<p>Full description</p>"));
        assert_eq!(detail.lead_text.as_deref(), Some("Lead"));
        assert_eq!(detail.external_url, None);
        assert_eq!(detail.is_active, Some(false));
        assert_eq!(detail.headhunter_application_allowed, Some(true));

        let contact: Value = serde_json::from_str(detail.contact_person.as_deref().unwrap()).unwrap();
        assert_eq!(contact["first_name"], "Anna");
    }

    #[test]
    fn test_sub_request_urls() {
        let pages = profile().sub_request_urls("https://example.com/search?query=python", 5);

        assert_eq!(pages.len(), 4);
        for (i, page) in pages.iter().enumerate() {
            let expected = i as u32 + 2;
            assert_eq!(page.page, expected);
            assert!(page.url_api.ends_with(&format!("&page={}", expected)));
        }
    }

    #[test]
    fn test_single_page_has_no_sub_requests() {
        let profile = profile();
        assert!(profile.sub_request_urls("https://example.com/search", 1).is_empty());
        assert!(profile.sub_request_urls("https://example.com/search", 0).is_empty());
    }
}
