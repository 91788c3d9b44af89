//! Configuration types for document extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`] or loaded with
//! [`ExtractionConfig::from_env`]. Keys are stored as `Option`s: a missing key
//! is reported when the component that needs it is first used, so a caller
//! that never uploads files does not need an upload key.

use crate::error::ExtractError;
use crate::pipeline::llm::ModelClient;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default model for extraction and chat.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
/// Default Anthropic API root.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Default file-storage API root for the resumable upload path.
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for extraction, chat and ingestion.
///
/// # Example
/// ```rust
/// use docsheet::{ExtractionConfig, IngestStrategy};
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-ant-test")
///     .strategy(IngestStrategy::ConvertThenInline)
///     .convert_service("https://example.supabase.co/functions/v1", "anon-key")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 2048);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model API key (`ANTHROPIC_API_KEY`).
    pub api_key: Option<String>,

    /// Model API root. Default: [`DEFAULT_ANTHROPIC_BASE_URL`].
    pub base_url: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Max output tokens for extraction and chat. Default: 2048.
    pub max_tokens: u32,

    /// Max output tokens for the prompt helper. Default: 1024.
    pub suggest_max_tokens: u32,

    /// Pre-constructed model client. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn ModelClient>>,

    /// Backoff applied to model calls.
    pub retry: RetryPolicy,

    /// What to do when the reply JSON lacks mandated fields.
    pub response_policy: ResponsePolicy,

    /// How files become [`crate::model::Document`]s.
    pub strategy: IngestStrategy,

    /// Run the local Word text extractor during ingestion. Default: true.
    pub extract_local_text: bool,

    /// Conversion service root (the URL that serves `/convert-document`).
    pub convert_url: Option<String>,

    /// Key sent to the conversion service.
    pub convert_key: Option<String>,

    /// File-storage API key for [`IngestStrategy::Reference`] (`GEMINI_API_KEY`).
    pub upload_key: Option<String>,

    /// File-storage API root. Default: [`DEFAULT_UPLOAD_BASE_URL`].
    pub upload_base_url: String,

    /// Concurrent cells in [`crate::extract::extract_table`]. Default: 4.
    ///
    /// Only the table driver honours this; a single `extract` call is
    /// never throttled.
    pub concurrency: usize,

    /// Optional per-cell progress events for table runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            suggest_max_tokens: 1024,
            provider: None,
            retry: RetryPolicy::default(),
            response_policy: ResponsePolicy::default(),
            strategy: IngestStrategy::default(),
            extract_local_text: true,
            convert_url: None,
            convert_key: None,
            upload_key: None,
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn ModelClient>"))
            .field("retry", &self.retry)
            .field("response_policy", &self.response_policy)
            .field("strategy", &self.strategy)
            .field("extract_local_text", &self.extract_local_text)
            .field("convert_url", &self.convert_url)
            .field("upload_base_url", &self.upload_base_url)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load keys and service URLs from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `ANTHROPIC_API_KEY` | `api_key` |
    /// | `DOCSHEET_ANTHROPIC_BASE_URL` | `base_url` |
    /// | `DOCSHEET_MODEL` | `model` |
    /// | `GEMINI_API_KEY` | `upload_key` |
    /// | `DOCSHEET_UPLOAD_BASE_URL` | `upload_base_url` |
    /// | `DOCSHEET_CONVERT_URL` | `convert_url` |
    /// | `DOCSHEET_CONVERT_KEY` | `convert_key` |
    ///
    /// Absent variables are not an error here.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = env_var("ANTHROPIC_API_KEY");
        if let Some(url) = env_var("DOCSHEET_ANTHROPIC_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = env_var("DOCSHEET_MODEL") {
            config.model = model;
        }
        config.upload_key = env_var("GEMINI_API_KEY");
        if let Some(url) = env_var("DOCSHEET_UPLOAD_BASE_URL") {
            config.upload_base_url = url;
        }
        config.convert_url = env_var("DOCSHEET_CONVERT_URL");
        config.convert_key = env_var("DOCSHEET_CONVERT_KEY");
        config
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    /// Start from an existing config (e.g. [`ExtractionConfig::from_env`]).
    pub fn from_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ModelClient>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn response_policy(mut self, policy: ResponsePolicy) -> Self {
        self.config.response_policy = policy;
        self
    }

    pub fn strategy(mut self, strategy: IngestStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn extract_local_text(mut self, v: bool) -> Self {
        self.config.extract_local_text = v;
        self
    }

    pub fn convert_service(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.config.convert_url = Some(url.into());
        self.config.convert_key = Some(key.into());
        self
    }

    pub fn upload_key(mut self, key: impl Into<String>) -> Self {
        self.config.upload_key = Some(key.into());
        self
    }

    pub fn upload_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.upload_base_url = url.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a selected file is turned into a model-ready document.
///
/// The strategies are alternatives, not a fallback chain: exactly one is
/// used per integration.
///
/// | Strategy | Payload | Network |
/// |----------|---------|---------|
/// | `Inline` | base64 of the original bytes | none |
/// | `ConvertThenInline` | base64, Word files converted to PDF first | conversion service |
/// | `Reference` | URI returned by the file store | resumable upload |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStrategy {
    #[default]
    Inline,
    ConvertThenInline,
    Reference,
}

/// Handling of replies whose JSON omits mandated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePolicy {
    /// Fill missing fields with defaults (`""`, `Low`, page 1).
    #[default]
    Lenient,
    /// Fail with [`ExtractError::SchemaViolation`] when `value` or
    /// `confidence` is missing.
    Strict,
    /// Like `Strict`, and contract violations are retried under the
    /// retry policy.
    StrictWithRetry,
}

impl ResponsePolicy {
    pub fn is_strict(&self) -> bool {
        !matches!(self, ResponsePolicy::Lenient)
    }

    pub fn retries_contract_violations(&self) -> bool {
        matches!(self, ResponsePolicy::StrictWithRetry)
    }
}
