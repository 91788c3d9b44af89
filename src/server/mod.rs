//! Word → PDF conversion service.
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/convert-document` | `POST` | convert a base64 Word file to PDF |
//! | `/health` | `GET` | liveness |
//!
//! CORS preflights are answered by the CORS layer. Every reply is JSON.
//!
//! | Status | Body | When |
//! |--------|------|------|
//! | 200 | `{ pdfData, converted: true, originalFileName, newFileName }` | converted |
//! | 200 | `{ pdfData, converted: false, message }` | not a Word file |
//! | 400 | `{ error }` | bad JSON, missing `fileData`/`fileName` |
//! | 503 | `{ error, instructions }` | no provider key configured |
//! | 500 | `{ error: "Failed to create conversion job", details }` | job rejected |
//! | 504 | `{ error: "Conversion timeout" }` | poll ceiling reached |
//! | 500 | `{ error: "Document conversion failed", message }` | anything else |

pub mod cloudconvert;

use crate::pipeline::conversion::{ConversionRequest, ConversionResponse};
use crate::pipeline::docx::is_word_document;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cloudconvert::{CloudConvertClient, ConvertServiceError, DEFAULT_CLOUDCONVERT_BASE_URL};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

static RE_WORD_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.docx?$").unwrap());

/// Settings for the conversion service.
#[derive(Clone)]
pub struct ServerConfig {
    /// CloudConvert key (`CLOUDCONVERT_API_KEY`). Checked per request.
    pub cloudconvert_api_key: Option<String>,
    /// CloudConvert API root (`DOCSHEET_CLOUDCONVERT_BASE_URL`).
    pub cloudconvert_base_url: String,
    /// Wait between job status polls. Default: 1 s.
    pub poll_interval: Duration,
    /// Status polls before giving up with 504. Default: 30.
    pub max_poll_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cloudconvert_api_key: None,
            cloudconvert_base_url: DEFAULT_CLOUDCONVERT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field(
                "cloudconvert_api_key",
                &self.cloudconvert_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("cloudconvert_base_url", &self.cloudconvert_base_url)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.cloudconvert_api_key = std::env::var("CLOUDCONVERT_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(url) = std::env::var("DOCSHEET_CLOUDCONVERT_BASE_URL") {
            if !url.trim().is_empty() {
                config.cloudconvert_base_url = url;
            }
        }
        config
    }
}

/// Build the service router.
pub fn router(config: ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/convert-document", post(convert_document))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(config))
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(config: ServerConfig, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Conversion service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn convert_document(
    State(config): State<Arc<ServerConfig>>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid request body: {}", rejection.body_text()) })),
            )
                .into_response();
        }
    };

    if req.file_data.is_empty() || req.file_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required fields: fileData and fileName" })),
        )
            .into_response();
    }

    if !is_word_document(&req.mime_type, &req.file_name) {
        return Json(ConversionResponse {
            pdf_data: req.file_data,
            converted: false,
            message: Some("File is not a Word document, no conversion needed".into()),
            original_file_name: None,
            new_file_name: None,
        })
        .into_response();
    }

    let Some(api_key) = config.cloudconvert_api_key.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "CloudConvert API key not configured. Please set CLOUDCONVERT_API_KEY environment variable.",
                "instructions": "Get a free API key at https://cloudconvert.com/register",
            })),
        )
            .into_response();
    };

    let client = CloudConvertClient::new(
        config.cloudconvert_base_url.clone(),
        api_key,
        config.poll_interval,
        config.max_poll_attempts,
    );

    match client.convert(&req.file_data, &req.file_name).await {
        Ok(pdf) => {
            let new_file_name = RE_WORD_EXTENSION.replace(&req.file_name, ".pdf").into_owned();
            info!("Converted '{}' → '{}' ({} bytes)", req.file_name, new_file_name, pdf.len());
            Json(ConversionResponse {
                pdf_data: STANDARD.encode(pdf),
                converted: true,
                message: None,
                original_file_name: Some(req.file_name),
                new_file_name: Some(new_file_name),
            })
            .into_response()
        }
        Err(e) => {
            error!("Document conversion error for '{}': {}", req.file_name, e);
            service_error_response(e)
        }
    }
}

fn service_error_response(e: ConvertServiceError) -> Response {
    match e {
        ConvertServiceError::JobCreation { details } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to create conversion job", "details": details })),
        )
            .into_response(),
        ConvertServiceError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "Conversion timeout" })),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Document conversion failed", "message": other.to_string() })),
        )
            .into_response(),
    }
}
