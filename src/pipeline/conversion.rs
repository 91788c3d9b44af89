//! Word → PDF conversion through the remote conversion service.
//!
//! The model reads PDFs natively but not Word files, so the
//! `ConvertThenInline` ingestion strategy posts Word payloads to the
//! `/convert-document` endpoint (see [`crate::server`]) and inlines the PDF it
//! returns. Anything that is not a Word document short-circuits locally with
//! `converted = false` and never touches the network.

use crate::error::ExtractError;
use crate::pipeline::docx::is_word_document;
use crate::pipeline::encode::EncodedFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Request body of `POST /convert-document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    #[serde(default)]
    pub file_data: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Successful response body of `POST /convert-document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub pdf_data: String,
    pub converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_file_name: Option<String>,
}

/// Result of a conversion attempt. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// Base64 PDF when `converted`, otherwise the untouched input payload.
    pub pdf_data: String,
    pub converted: bool,
    pub file_name: String,
}

/// Client for the conversion service.
#[derive(Debug, Clone)]
pub struct ConversionClient {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl ConversionClient {
    /// `base_url` is the root that serves `/convert-document`.
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Convert `file` to PDF if it is a Word document.
    pub async fn convert(&self, file: &EncodedFile) -> Result<ConversionOutcome, ExtractError> {
        if !is_word_document(&file.mime_type, &file.display_name) {
            debug!("'{}' is not a Word document; no conversion needed", file.display_name);
            return Ok(ConversionOutcome {
                pdf_data: file.data.clone(),
                converted: false,
                file_name: file.display_name.clone(),
            });
        }

        let base_url = self.base_url.as_deref().ok_or_else(|| {
            ExtractError::missing_key(
                "DOCSHEET_CONVERT_URL",
                "Set the conversion service URL to convert Word documents.",
            )
        })?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ExtractError::missing_key(
                "DOCSHEET_CONVERT_KEY",
                "Set the conversion service key to convert Word documents.",
            )
        })?;

        let url = format!("{}/convert-document", base_url.trim_end_matches('/'));
        info!("Converting '{}' to PDF via {}", file.display_name, url);

        let body = ConversionRequest {
            file_data: file.data.clone(),
            file_name: file.display_name.clone(),
            mime_type: file.mime_type.clone(),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("apikey", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Conversion {
                status: None,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::Conversion {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let parsed: ConversionResponse =
            response.json().await.map_err(|e| ExtractError::Conversion {
                status: Some(status.as_u16()),
                detail: format!("invalid response body: {e}"),
            })?;

        let file_name = parsed
            .new_file_name
            .unwrap_or_else(|| file.display_name.clone());
        Ok(ConversionOutcome {
            pdf_data: parsed.pdf_data,
            converted: parsed.converted,
            file_name,
        })
    }
}
