//! Resumable upload to a hosted file store (reference-by-URI ingestion).
//!
//! Two requests make up the handshake:
//!
//! ```text
//! POST /upload/v1beta/files?key=…   (start: length, type, display name)
//!   ◀── X-Goog-Upload-URL: <session url>
//! POST <session url>                (upload, finalize: the bytes)
//!   ◀── { "file": { "uri", "mimeType", "displayName", "name" } }
//! ```
//!
//! The returned URI is used in prompts in place of inline content.

use crate::error::ExtractError;
use crate::pipeline::encode::FileInput;
use serde::Deserialize;
use tracing::{debug, info};

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// A file registered with the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub uri: String,
    pub mime_type: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: StoredFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFile {
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Client for the resumable upload handshake.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl UploadClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Upload `file` and return its stable reference.
    pub async fn upload(&self, file: &FileInput) -> Result<UploadedFile, ExtractError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ExtractError::missing_key("GEMINI_API_KEY", "Set the file-store API key to upload files by reference.")
        })?;

        let num_bytes = file.bytes.len();
        let mime_type = file.mime_or_default().to_string();
        info!("Uploading '{}' ({} bytes, {})", file.name, num_bytes, mime_type);

        // ── Step 1: start the session ────────────────────────────────────
        let start_url = format!(
            "{}/upload/v1beta/files?key={}",
            self.base_url.trim_end_matches('/'),
            api_key
        );
        let start = self
            .http
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", num_bytes.to_string())
            .header("X-Goog-Upload-Header-Content-Type", &mime_type)
            .json(&serde_json::json!({ "file": { "display_name": file.name } }))
            .send()
            .await
            .map_err(|e| transport_error("start", e))?;

        let status = start.status();
        if !status.is_success() {
            let body = start.text().await.unwrap_or_default();
            return Err(ExtractError::Upload {
                stage: "start".into(),
                status: status.as_u16(),
                body,
            });
        }

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Upload {
                stage: "start".into(),
                status: status.as_u16(),
                body: "No upload URL received from initial request".into(),
            })?;
        debug!("Upload session opened for '{}'", file.name);

        // ── Step 2: send bytes and finalize ──────────────────────────────
        // Content-Length is set by reqwest from the body.
        let upload = self
            .http
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| transport_error("upload", e))?;

        let status = upload.status();
        if !status.is_success() {
            let body = upload.text().await.unwrap_or_default();
            return Err(ExtractError::Upload {
                stage: "upload".into(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = upload.json().await.map_err(|e| ExtractError::Upload {
            stage: "upload".into(),
            status: status.as_u16(),
            body: format!("invalid response body: {e}"),
        })?;

        let stored = parsed.file;
        let display_name = stored
            .display_name
            .or(stored.name)
            .unwrap_or_else(|| file.name.clone());
        info!("Uploaded '{}' → {}", display_name, stored.uri);

        Ok(UploadedFile {
            uri: stored.uri,
            mime_type: stored.mime_type.unwrap_or(mime_type),
            display_name,
        })
    }
}

fn transport_error(stage: &str, e: reqwest::Error) -> ExtractError {
    ExtractError::Upload {
        stage: stage.into(),
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        body: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn pdf_input() -> FileInput {
        FileInput::new(b"%PDF-1.7 test".to_vec(), Some("application/pdf"), "contract.pdf")
    }

    #[tokio::test]
    async fn handshake_returns_reference() {
        let mut server = mockito::Server::new_async().await;
        let session = format!("{}/upload-session/abc", server.url());

        let start = server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::UrlEncoded("key".into(), "gk".into()))
            .match_header("x-goog-upload-protocol", "resumable")
            .match_header("x-goog-upload-command", "start")
            .match_header("x-goog-upload-header-content-length", "13")
            .match_header("x-goog-upload-header-content-type", "application/pdf")
            .with_status(200)
            .with_header("x-goog-upload-url", &session)
            .create_async()
            .await;

        let finalize = server
            .mock("POST", "/upload-session/abc")
            .match_header("x-goog-upload-command", "upload, finalize")
            .match_header("x-goog-upload-offset", "0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"file":{"uri":"https://files.example/abc","mimeType":"application/pdf","name":"files/abc"}}"#)
            .create_async()
            .await;

        let client = UploadClient::new(server.url(), Some("gk".into()));
        let uploaded = client.upload(&pdf_input()).await.unwrap();

        start.assert_async().await;
        finalize.assert_async().await;
        assert_eq!(uploaded.uri, "https://files.example/abc");
        assert_eq!(uploaded.mime_type, "application/pdf");
        // displayName absent → falls back to the stored name
        assert_eq!(uploaded.display_name, "files/abc");
    }

    #[tokio::test]
    async fn start_failure_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let client = UploadClient::new(server.url(), Some("bad".into()));
        match client.upload(&pdf_input()).await.unwrap_err() {
            ExtractError::Upload { stage, status, body } => {
                assert_eq!(stage, "start");
                assert_eq!(status, 403);
                assert_eq!(body, "API key not valid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn finalize_failure_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let session = format!("{}/upload-session/xyz", server.url());
        server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("x-goog-upload-url", &session)
            .create_async()
            .await;
        server
            .mock("POST", "/upload-session/xyz")
            .with_status(500)
            .with_body("backend unavailable")
            .create_async()
            .await;

        let client = UploadClient::new(server.url(), Some("gk".into()));
        match client.upload(&pdf_input()).await.unwrap_err() {
            ExtractError::Upload { stage, status, body } => {
                assert_eq!(stage, "upload");
                assert_eq!(status, 500);
                assert_eq!(body, "backend unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_session_header_is_upload_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let client = UploadClient::new(server.url(), Some("gk".into()));
        let err = client.upload(&pdf_input()).await.unwrap_err();
        assert!(err.to_string().contains("No upload URL"));
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let client = UploadClient::new("http://127.0.0.1:1", None);
        let err = client.upload(&pdf_input()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Configuration { .. }));
    }
}
