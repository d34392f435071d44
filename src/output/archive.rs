//! On-disk archive of raw fetched payloads
//!
//! Layout under the archive root:
//!
//! ```text
//! requests/<request_id>.json
//! sub_requests/<request_id>/<page_request_id>.json
//! jobs/<job_key>.json
//! ```
//!
//! Non-JSON payloads get a `.txt` extension. Write failures are logged and
//! never interrupt a crawl.

use crate::crawler::Payload;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PayloadArchive {
    root: PathBuf,
}

impl PayloadArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn store_request(&self, request_id: i64, payload: &Payload) {
        let path = self.root.join("requests");
        self.write(path, &request_id.to_string(), payload);
    }

    pub fn store_page(&self, request_id: i64, page_request_id: i64, payload: &Payload) {
        let path = self
            .root
            .join("sub_requests")
            .join(request_id.to_string());
        self.write(path, &page_request_id.to_string(), payload);
    }

    pub fn store_job(&self, job_key: &str, payload: &Payload) {
        let path = self.root.join("jobs");
        self.write(path, &sanitize(job_key), payload);
    }

    fn write(&self, dir: PathBuf, stem: &str, payload: &Payload) {
        let (extension, contents) = match payload {
            Payload::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(text) => ("json", text),
                Err(e) => {
                    tracing::warn!("Failed to serialize payload {}: {}", stem, e);
                    return;
                }
            },
            Payload::Text(text) => ("txt", text.clone()),
        };

        let file = dir.join(format!("{}.{}", stem, extension));
        if let Err(e) = fs::create_dir_all(&dir).and_then(|_| fs::write(&file, contents)) {
            tracing::warn!("Failed to archive payload to {}: {}", file.display(), e);
        }
    }
}

/// Keeps job keys from escaping their directory
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
