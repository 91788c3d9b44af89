//! CloudConvert v2 jobs client: Word (base64) → PDF bytes.
//!
//! ```text
//! POST /v2/jobs            import/base64 → convert (pdf) → export/url
//! GET  /v2/jobs/{id}       poll until finished | error | ceiling
//! GET  <export file url>   download the PDF
//! ```

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_CLOUDCONVERT_BASE_URL: &str = "https://api.cloudconvert.com";

const EXPORT_TASK: &str = "export-pdf";

/// Provider-side failures, each mapped to one HTTP status by the router.
#[derive(Debug, Error)]
pub enum ConvertServiceError {
    #[error("Failed to create conversion job")]
    JobCreation { details: String },

    #[error("Failed to check job status")]
    StatusCheck { details: String },

    #[error("Conversion job failed")]
    JobFailed,

    #[error("Conversion timeout")]
    Timeout,

    #[error("No PDF output URL found")]
    MissingOutput,

    #[error("Failed to download converted PDF")]
    Download { details: String },
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    data: Job,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    tasks: Vec<JobTask>,
}

#[derive(Debug, Deserialize)]
struct JobTask {
    #[serde(default)]
    name: String,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    files: Vec<TaskFile>,
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    url: Option<String>,
}

impl Job {
    fn export_url(&self) -> Option<&str> {
        self.tasks
            .iter()
            .find(|t| t.name == EXPORT_TASK)
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.files.first())
            .and_then(|f| f.url.as_deref())
    }
}

/// Client for one CloudConvert account.
#[derive(Debug, Clone)]
pub struct CloudConvertClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl CloudConvertClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            poll_interval,
            max_poll_attempts,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Convert a base64 Word file and return the PDF bytes.
    pub async fn convert(&self, file_data: &str, file_name: &str) -> Result<Vec<u8>, ConvertServiceError> {
        let job_id = self.create_job(file_data, file_name).await?;
        info!("CloudConvert job {} created for '{}'", job_id, file_name);

        let job = self.wait_for_job(&job_id).await?;
        let pdf_url = job.export_url().ok_or(ConvertServiceError::MissingOutput)?;
        self.download(pdf_url).await
    }

    async fn create_job(&self, file_data: &str, file_name: &str) -> Result<String, ConvertServiceError> {
        let body = json!({
            "tasks": {
                "import-file": {
                    "operation": "import/base64",
                    "file": file_data,
                    "filename": file_name,
                },
                "convert-to-pdf": {
                    "operation": "convert",
                    "input": "import-file",
                    "output_format": "pdf",
                },
                "export-pdf": {
                    "operation": "export/url",
                    "input": "convert-to-pdf",
                },
            }
        });

        let response = self
            .http
            .post(self.url("/v2/jobs"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConvertServiceError::JobCreation { details: e.to_string() })?;

        if !response.status().is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!("CloudConvert job creation failed: {}", details);
            return Err(ConvertServiceError::JobCreation { details });
        }

        let envelope: JobEnvelope = response
            .json()
            .await
            .map_err(|e| ConvertServiceError::JobCreation { details: e.to_string() })?;
        Ok(envelope.data.id)
    }

    /// Poll the job until it finishes, fails, or the attempt ceiling is hit.
    async fn wait_for_job(&self, job_id: &str) -> Result<Job, ConvertServiceError> {
        let status_url = self.url(&format!("/v2/jobs/{job_id}"));

        for attempt in 1..=self.max_poll_attempts {
            let response = self
                .http
                .get(&status_url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| ConvertServiceError::StatusCheck { details: e.to_string() })?;

            if !response.status().is_success() {
                return Err(ConvertServiceError::StatusCheck {
                    details: format!("HTTP {}", response.status().as_u16()),
                });
            }

            let job = response
                .json::<JobEnvelope>()
                .await
                .map_err(|e| ConvertServiceError::StatusCheck { details: e.to_string() })?
                .data;

            match job.status.as_str() {
                "finished" => return Ok(job),
                "error" => return Err(ConvertServiceError::JobFailed),
                other => debug!(
                    "Job {} is '{}' (poll {}/{})",
                    job_id, other, attempt, self.max_poll_attempts
                ),
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        warn!("Job {} still running after {} polls", job_id, self.max_poll_attempts);
        Err(ConvertServiceError::Timeout)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ConvertServiceError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ConvertServiceError::Download { details: e.to_string() })?;

        if !response.status().is_success() {
            return Err(ConvertServiceError::Download {
                details: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ConvertServiceError::Download { details: e.to_string() })?;
        debug!("Downloaded {} bytes of PDF", bytes.len());
        Ok(bytes.to_vec())
    }
}
