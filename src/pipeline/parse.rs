//! Text extraction: hand the PDF to LlamaParse and get Markdown back.
//!
//! LlamaParse is job based. The client uploads the file, polls the job until
//! it leaves the pending state, then fetches the result in the configured
//! format:
//!
//! ```text
//! POST /api/parsing/upload            (multipart: file, result_type) → {id}
//! GET  /api/parsing/job/{id}          → {status: PENDING|SUCCESS|ERROR|CANCELED}
//! GET  /api/parsing/job/{id}/result/{result_type} → {markdown: "..."}
//! ```
//!
//! A blank result is an error: the structuring step has nothing to work on.

use crate::config::ServiceConfig;
use crate::error::InvoiceError;
use crate::pipeline::input::Upload;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extracts the text of a PDF.
pub trait TextExtractor: Send + Sync {
    fn extract<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<String, InvoiceError>>;
}

/// State of a parsing job as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Success,
    Failed(String),
}

#[derive(Deserialize)]
struct JobResponse {
    id: String,
}

#[derive(Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

impl JobStatusResponse {
    fn into_status(self) -> JobStatus {
        match self.status.to_ascii_uppercase().as_str() {
            "SUCCESS" => JobStatus::Success,
            "ERROR" | "CANCELED" | "CANCELLED" => JobStatus::Failed(
                self.error_message
                    .unwrap_or_else(|| format!("job ended with status {}", self.status)),
            ),
            _ => JobStatus::Pending,
        }
    }
}

/// [`TextExtractor`] backed by the LlamaParse cloud API.
pub struct LlamaParseClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    result_type: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl LlamaParseClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, InvoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| InvoiceError::Internal(format!("HTTP client: {e}")))?;

        if config.llama_parse_api_key.is_none() {
            warn!("LLAMA_CLOUD_API_KEY is not set; PDF extraction will fail");
        }

        Ok(Self {
            http,
            api_key: config.llama_parse_api_key.clone(),
            base_url: config.llama_parse_url.trim_end_matches('/').to_string(),
            result_type: config.parse_result_type.clone(),
            poll_interval: Duration::from_millis(config.parse_poll_interval_ms),
            max_polls: config.parse_max_polls,
        })
    }

    fn api_key(&self) -> Result<&str, InvoiceError> {
        self.api_key.as_deref().ok_or(InvoiceError::MissingCredential {
            service: "LlamaParse",
            var: "LLAMA_CLOUD_API_KEY",
        })
    }

    async fn parse(&self, upload: &Upload) -> Result<String, InvoiceError> {
        let key = self.api_key()?;
        let failed = |detail: String| InvoiceError::ParseFailed {
            filename: upload.filename.clone(),
            detail,
        };

        let job_id = self.upload(key, upload).await.map_err(failed)?;
        info!("Parsing '{}' as job {}", upload.filename, job_id);

        let mut polls = 0;
        loop {
            match self.job_status(key, &job_id).await.map_err(failed)? {
                JobStatus::Success => break,
                JobStatus::Failed(reason) => return Err(failed(reason)),
                JobStatus::Pending => {
                    polls += 1;
                    if polls >= self.max_polls {
                        return Err(InvoiceError::ParseTimeout { job_id, polls });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        let body = self.result(key, &job_id).await.map_err(failed)?;
        let text = result_text(&body, &self.result_type).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(InvoiceError::EmptyExtraction {
                filename: upload.filename.clone(),
            });
        }

        debug!("Job {}: {} chars extracted after {} polls", job_id, text.len(), polls);
        Ok(text)
    }

    async fn upload(&self, key: &str, upload: &Upload) -> Result<String, String> {
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str("application/pdf")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("result_type", self.result_type.clone());

        let response = self
            .http
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let job: JobResponse = read_json(response).await?;
        Ok(job.id)
    }

    async fn job_status(&self, key: &str, job_id: &str) -> Result<JobStatus, String> {
        let response = self
            .http
            .get(format!("{}/api/parsing/job/{}", self.base_url, job_id))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status: JobStatusResponse = read_json(response).await?;
        Ok(status.into_status())
    }

    async fn result(&self, key: &str, job_id: &str) -> Result<Value, String> {
        let response = self
            .http
            .get(format!(
                "{}/api/parsing/job/{}/result/{}",
                self.base_url, job_id, self.result_type
            ))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        read_json(response).await
    }
}

impl TextExtractor for LlamaParseClient {
    fn extract<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<String, InvoiceError>> {
        Box::pin(self.parse(upload))
    }
}

/// Map a non-2xx status to an error string, otherwise decode the JSON body.
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {}", body.trim()));
    }
    response.json::<T>().await.map_err(|e| e.to_string())
}

/// Pull the text out of a result body.
///
/// The body is keyed by result type (`{"markdown": ...}` or `{"text": ...}`).
/// Older responses nest one entry per page under `pages`; those are joined
/// with blank lines.
fn result_text(body: &Value, result_type: &str) -> Option<String> {
    if let Some(text) = body.get(result_type).and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let pages = body.get("pages")?.as_array()?;
    let parts: Vec<&str> = pages
        .iter()
        .filter_map(|p| p.get(result_type).and_then(Value::as_str))
        .collect();
    Some(parts.join("\n\n"))
}
