//! Error types for the docsheet library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **fatal** for the call that produced it: a single
//!   `extract` could not produce a cell (missing API key, rate limit that
//!   outlived the retry budget, model reply without JSON). Returned as
//!   `Err(ExtractError)` from the top-level functions. No placeholder cell is
//!   ever fabricated.
//!
//! * [`CellError`]: **non-fatal** inside a table run: one (document, column)
//!   pair failed but every other cell is fine. Stored in
//!   [`crate::output::TableOutput::failures`]; the rest of the table survives.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docsheet library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required key or service URL is missing. Reported at first use, not
    /// at startup.
    #[error("Missing configuration: {key}\n{hint}")]
    Configuration { key: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Remote services ───────────────────────────────────────────────────
    /// One step of the resumable upload handshake failed.
    #[error("Upload failed during {stage} (HTTP {status}): {body}")]
    Upload {
        stage: String,
        status: u16,
        body: String,
    },

    /// The Word → PDF conversion service rejected or failed the request.
    #[error("Document conversion failed{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Conversion { status: Option<u16>, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Transport failure or non-success reply from the model API.
    ///
    /// `status` and `error_type` are filled whenever the server answered, so
    /// the retry layer can classify without parsing `message`.
    #[error("Model API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ModelCall {
        status: Option<u16>,
        error_type: Option<String>,
        message: String,
    },

    /// The model reply contained no `{...}` span at all.
    #[error("No JSON found in model response: {snippet:?}")]
    NoJsonFound { snippet: String },

    /// A `{...}` span was found but is not valid JSON.
    #[error("Malformed JSON in model response: {source}")]
    MalformedJson {
        #[source]
        source: serde_json::Error,
    },

    /// Strict response policy: the JSON lacks mandated fields.
    #[error("Model response is missing required fields: {}", .missing.join(", "))]
    SchemaViolation { missing: Vec<String> },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Anything else that stopped an extraction (bad base64 payload, …).
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),
}

impl ExtractError {
    /// Whether this error is a provider rate-limit signal.
    ///
    /// Checks the HTTP status and the provider's error type first. Substring
    /// matching on the message applies only when both are absent.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ExtractError::ModelCall {
                status,
                error_type,
                message,
            } => match (status, error_type.as_deref()) {
                (None, None) => message.contains("429") || message.contains("rate_limit"),
                (status, kind) => *status == Some(429) || kind == Some("rate_limit_error"),
            },
            _ => false,
        }
    }

    /// Whether the model answered but broke the JSON response contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ExtractError::NoJsonFound { .. }
                | ExtractError::MalformedJson { .. }
                | ExtractError::SchemaViolation { .. }
        )
    }

    pub(crate) fn missing_key(key: &str, hint: impl Into<String>) -> Self {
        ExtractError::Configuration {
            key: key.to_string(),
            hint: hint.into(),
        }
    }
}

/// A non-fatal error for a single (document, column) cell.
///
/// Stored in [`crate::output::TableOutput`] when a cell fails.
/// The table run continues with the remaining cells.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CellError {
    /// The extraction call failed after retries.
    #[error("{document} / {column}: extraction failed: {detail}")]
    ExtractionFailed {
        document_id: String,
        column_id: String,
        document: String,
        column: String,
        detail: String,
    },
}

impl CellError {
    pub fn document_id(&self) -> &str {
        match self {
            CellError::ExtractionFailed { document_id, .. } => document_id,
        }
    }

    pub fn column_id(&self) -> &str {
        match self {
            CellError::ExtractionFailed { column_id, .. } => column_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_error(status: Option<u16>, error_type: Option<&str>, message: &str) -> ExtractError {
        ExtractError::ModelCall {
            status,
            error_type: error_type.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn status_429_is_rate_limited() {
        assert!(model_error(Some(429), None, "Too Many Requests").is_rate_limited());
    }

    #[test]
    fn provider_error_type_is_rate_limited() {
        assert!(model_error(Some(400), Some("rate_limit_error"), "slow down").is_rate_limited());
    }

    #[test]
    fn message_fallback_is_rate_limited() {
        assert!(model_error(None, None, "upstream said 429").is_rate_limited());
        assert!(model_error(None, None, "rate_limit exceeded").is_rate_limited());
    }

    #[test]
    fn structured_non_rate_limit_ignores_message_text() {
        let e = model_error(
            Some(400),
            Some("invalid_request_error"),
            "prompt is too long: 204290 tokens > 200000 maximum",
        );
        assert!(!e.is_rate_limited());
        assert!(!model_error(Some(500), None, "rate_limit in upstream log").is_rate_limited());
        assert!(!model_error(None, Some("api_error"), "status 429 seen").is_rate_limited());
    }

    #[test]
    fn other_errors_are_not_rate_limited() {
        assert!(!model_error(Some(500), Some("api_error"), "overloaded").is_rate_limited());
        assert!(!ExtractError::NoJsonFound {
            snippet: "429".into()
        }
        .is_rate_limited());
    }

    #[test]
    fn upload_display_carries_status_and_body() {
        let e = ExtractError::Upload {
            stage: "start".into(),
            status: 403,
            body: "key invalid".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("key invalid"), "got: {msg}");
    }

    #[test]
    fn schema_violation_lists_fields() {
        let e = ExtractError::SchemaViolation {
            missing: vec!["value".into(), "confidence".into()],
        };
        assert!(e.to_string().contains("value, confidence"));
        assert!(e.is_contract_violation());
    }

    #[test]
    fn cell_error_accessors() {
        let e = CellError::ExtractionFailed {
            document_id: "d1".into(),
            column_id: "c1".into(),
            document: "Invoice A".into(),
            column: "Total".into(),
            detail: "boom".into(),
        };
        assert_eq!(e.document_id(), "d1");
        assert_eq!(e.column_id(), "c1");
        assert!(e.to_string().contains("Invoice A / Total"));
    }
}
