//! Model interaction: request types, the [`ModelClient`] seam and the
//! Anthropic Messages API client.
//!
//! This module only moves bytes to and from the model. Prompt text lives in
//! [`crate::prompts`], reply parsing in [`crate::pipeline::parse`], and
//! backoff in [`crate::pipeline::retry`].
//!
//! ## Error classification
//!
//! Non-success replies become [`ExtractError::ModelCall`] with the HTTP status
//! and the provider's `error.type` filled in.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{Column, Document, DocumentPayload, ExtractionCell};
use crate::pipeline::encode::{bytes_to_text, decode_payload};
use crate::pipeline::{parse, retry};
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pinned Anthropic API version header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

// ── Request types ────────────────────────────────────────────────────────

/// A Messages API request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// One role-tagged message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Blocks(blocks),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl From<crate::model::Role> for MessageRole {
    fn from(role: crate::model::Role) -> Self {
        match role {
            crate::model::Role::User => MessageRole::User,
            crate::model::Role::Assistant => MessageRole::Assistant,
        }
    }
}

/// Plain text or a mixed list of blocks.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Document { source: BlockSource },
    Image { source: BlockSource },
}

/// Where a document/image block's bytes come from.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

impl BlockSource {
    /// Source for a document's payload, inline or by reference.
    pub fn for_document(doc: &Document) -> Self {
        match &doc.payload {
            DocumentPayload::Inline { data } => BlockSource::Base64 {
                media_type: doc.mime_type.clone(),
                data: data.clone(),
            },
            DocumentPayload::Reference { uri } => BlockSource::Url { url: uri.clone() },
        }
    }
}

// ── Response types ───────────────────────────────────────────────────────

/// The parts of a Messages API reply this crate reads.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct MessageResponse {
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResponseBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Default)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl MessageResponse {
    /// Build a reply with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ResponseBlock {
                kind: "text".into(),
                text: Some(text.into()),
            }],
            usage: None,
        }
    }

    /// Text of the first content block, if that block is text.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .first()
            .filter(|b| b.kind == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ── Client seam ──────────────────────────────────────────────────────────

/// Anything that can answer a Messages API request.
///
/// Injected through [`ExtractionConfig::provider`] so tests and alternative
/// transports can replace the HTTP client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ExtractError>;
}

/// HTTP client for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ExtractError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| ExtractError::ModelCall {
                status: e.status().map(|s| s.as_u16()),
                error_type: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(env) => (env.error.kind, env.error.message.unwrap_or(body)),
                Err(_) => (None, body),
            };
            return Err(ExtractError::ModelCall {
                status: Some(status.as_u16()),
                error_type,
                message,
            });
        }

        let reply: MessageResponse = response.json().await.map_err(|e| ExtractError::ModelCall {
            status: Some(status.as_u16()),
            error_type: None,
            message: format!("invalid response body: {e}"),
        })?;

        if let Some(usage) = reply.usage {
            debug!(
                "Model call: {} input tokens, {} output tokens",
                usage.input_tokens, usage.output_tokens
            );
        }
        Ok(reply)
    }
}

/// Resolve the model client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.provider`), used as-is. Tests inject
///    doubles here.
/// 2. **API key** (`config.api_key`, usually from `ANTHROPIC_API_KEY`), an
///    [`AnthropicClient`] against `config.base_url`.
///
/// A missing key is a configuration error reported at this first use.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn ModelClient>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(Arc::new(AnthropicClient::new(key, config.base_url.clone()))),
        None => Err(ExtractError::missing_key(
            "ANTHROPIC_API_KEY",
            "Set ANTHROPIC_API_KEY or configure a model client.",
        )),
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Build the extraction request for one (document, column) pair.
///
/// PDFs and images travel as content blocks. Everything else is inlined as
/// text, preferring locally extracted text over the raw bytes; a by-reference
/// payload that is neither goes out as a URL document block since its bytes
/// are not available here.
pub fn build_extraction_request(
    document: &Document,
    column: &Column,
    config: &ExtractionConfig,
) -> Result<MessageRequest, ExtractError> {
    let prompt = prompts::extraction_prompt(column);

    let message = if document.is_image() {
        Message::user_blocks(vec![
            ContentBlock::Image {
                source: BlockSource::for_document(document),
            },
            ContentBlock::Text { text: prompt },
        ])
    } else if document.is_pdf() {
        Message::user_blocks(vec![
            ContentBlock::Document {
                source: BlockSource::for_document(document),
            },
            ContentBlock::Text { text: prompt },
        ])
    } else {
        match (&document.extracted_text, &document.payload) {
            (Some(text), _) => Message::user(prompts::inline_document(text, &prompt)),
            (None, DocumentPayload::Inline { data }) => {
                let text = bytes_to_text(decode_payload(data)?);
                Message::user(prompts::inline_document(&text, &prompt))
            }
            (None, DocumentPayload::Reference { uri }) => Message::user_blocks(vec![
                ContentBlock::Document {
                    source: BlockSource::Url { url: uri.clone() },
                },
                ContentBlock::Text { text: prompt },
            ]),
        }
    };

    Ok(MessageRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system: Some(prompts::EXTRACTION_SYSTEM_PROMPT.to_string()),
        messages: vec![message],
    })
}

/// Extract one cell: one model call under the retry policy, then parse.
///
/// Rate limits are always retried. Contract violations (no JSON, malformed
/// JSON, missing fields) are retried only under
/// [`crate::config::ResponsePolicy::StrictWithRetry`].
pub async fn extract_cell(
    provider: &Arc<dyn ModelClient>,
    document: &Document,
    column: &Column,
    config: &ExtractionConfig,
) -> Result<ExtractionCell, ExtractError> {
    let request = build_extraction_request(document, column, config)?;
    let policy = config.response_policy;

    debug!("Extracting '{}' from '{}'", column.name, document.name);

    let cell = retry::with_retry_if(
        &config.retry,
        |e: &ExtractError| {
            e.is_rate_limited() || (policy.retries_contract_violations() && e.is_contract_violation())
        },
        || {
            let request = &request;
            async move {
                let reply = provider.create_message(request).await?;
                let text = reply.first_text().unwrap_or_default();
                if text.trim().is_empty() {
                    warn!("Empty model response for '{}'", column.name);
                }
                parse::parse_cell(text, policy)
            }
        },
    )
    .await?;

    debug!(
        "'{}' / '{}' → {:?} ({:?})",
        document.name, column.name, cell.value, cell.confidence
    );
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_blocks() {
        let req = MessageRequest {
            model: "m".into(),
            max_tokens: 10,
            system: Some("sys".into()),
            messages: vec![Message::user_blocks(vec![
                ContentBlock::Document {
                    source: BlockSource::Base64 {
                        media_type: "application/pdf".into(),
                        data: "JVBE".into(),
                    },
                },
                ContentBlock::Text { text: "go".into() },
            ])],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["system"], "sys");
        assert_eq!(v["messages"][0]["role"], "user");
        let blocks = &v["messages"][0]["content"];
        assert_eq!(blocks[0]["type"], "document");
        assert_eq!(blocks[0]["source"]["type"], "base64");
        assert_eq!(blocks[0]["source"]["media_type"], "application/pdf");
        assert_eq!(blocks[1]["type"], "text");
    }

    #[test]
    fn plain_text_content_is_a_string() {
        let req = MessageRequest {
            model: "m".into(),
            max_tokens: 10,
            system: None,
            messages: vec![Message::user("hi")],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("system").is_none());
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn reference_payload_becomes_url_source() {
        let doc = Document::reference("a.pdf", "application/pdf", "https://files.example/a");
        let v = serde_json::to_value(BlockSource::for_document(&doc)).unwrap();
        assert_eq!(v["type"], "url");
        assert_eq!(v["url"], "https://files.example/a");
    }

    #[test]
    fn first_text_only_reads_first_block() {
        let reply: MessageResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"late"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.first_text(), None);
        assert_eq!(MessageResponse::text("hi").first_text(), Some("hi"));
    }

    #[test]
    fn resolve_provider_requires_key() {
        let err = resolve_provider(&ExtractionConfig::default()).err().unwrap();
        assert!(matches!(err, ExtractError::Configuration { ref key, .. } if key == "ANTHROPIC_API_KEY"));
    }

    /// Replays scripted replies and records every request it sees.
    struct ScriptedClient {
        replies: std::sync::Mutex<Vec<Result<MessageResponse, ExtractError>>>,
        seen: std::sync::Mutex<Vec<MessageRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<MessageResponse, ExtractError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(replies.into_iter().rev().collect()),
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ExtractError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(MessageResponse::text("{}")))
        }
    }

    fn rate_limited() -> ExtractError {
        ExtractError::ModelCall {
            status: Some(429),
            error_type: Some("rate_limit_error".into()),
            message: "slow down".into(),
        }
    }

    fn test_config(policy: crate::config::ResponsePolicy) -> ExtractionConfig {
        ExtractionConfig {
            retry: crate::pipeline::retry::RetryPolicy::immediate(5),
            response_policy: policy,
            ..Default::default()
        }
    }

    fn column() -> Column {
        Column::new("Total", crate::model::ColumnType::Number, "The invoice total.")
    }

    #[test]
    fn plain_text_document_is_inlined() {
        use base64::Engine as _;
        let data = base64::engine::general_purpose::STANDARD.encode("Total due: $1,200");
        let doc = Document::inline("a.txt", "text/plain", data);
        let req = build_extraction_request(&doc, &column(), &ExtractionConfig::default()).unwrap();
        assert_eq!(req.max_tokens, 2048);
        assert_eq!(req.system.as_deref(), Some(prompts::EXTRACTION_SYSTEM_PROMPT));
        match &req.messages[0].content {
            MessageContent::Text(t) => {
                assert!(t.starts_with("DOCUMENT CONTENT:\nTotal due: $1,200\n\n"));
                assert!(t.contains("Column Name: \"Total\""));
            }
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn extracted_text_wins_over_bytes() {
        let mut doc = Document::inline("a.docx", "application/msword", "UEsDBA==");
        doc.extracted_text = Some("Invoice 42".into());
        let req = build_extraction_request(&doc, &column(), &ExtractionConfig::default()).unwrap();
        match &req.messages[0].content {
            MessageContent::Text(t) => assert!(t.starts_with("DOCUMENT CONTENT:\nInvoice 42")),
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn image_and_pdf_use_blocks() {
        let png = Document::inline("a.png", "image/png", "iVBO");
        let req = build_extraction_request(&png, &column(), &ExtractionConfig::default()).unwrap();
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["content"][0]["type"], "image");
        assert_eq!(v["messages"][0]["content"][1]["type"], "text");

        let pdf = Document::reference("a.pdf", "application/pdf", "https://files.example/a");
        let req = build_extraction_request(&pdf, &column(), &ExtractionConfig::default()).unwrap();
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["content"][0]["type"], "document");
        assert_eq!(v["messages"][0]["content"][0]["source"]["type"], "url");
    }

    #[tokio::test]
    async fn rate_limit_is_retried_then_parsed() {
        let client = ScriptedClient::new(vec![
            Err(rate_limited()),
            Ok(MessageResponse::text(r#"{"value":"1200","confidence":"High","page":1}"#)),
        ]);
        let provider: Arc<dyn ModelClient> = client.clone();
        let doc = Document::inline("a.pdf", "application/pdf", "JVBE");
        let cell = extract_cell(&provider, &doc, &column(), &test_config(Default::default()))
            .await
            .unwrap();
        assert_eq!(cell.value, "1200");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn contract_violation_not_retried_when_lenient() {
        let client = ScriptedClient::new(vec![Ok(MessageResponse::text("no json here"))]);
        let provider: Arc<dyn ModelClient> = client.clone();
        let doc = Document::inline("a.pdf", "application/pdf", "JVBE");
        let err = extract_cell(&provider, &doc, &column(), &test_config(Default::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoJsonFound { .. }));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn strict_with_retry_retries_schema_violation() {
        let client = ScriptedClient::new(vec![
            Ok(MessageResponse::text(r#"{"quote":"x"}"#)),
            Ok(MessageResponse::text(r#"{"value":"x","confidence":"Low"}"#)),
        ]);
        let provider: Arc<dyn ModelClient> = client.clone();
        let doc = Document::inline("a.pdf", "application/pdf", "JVBE");
        let cell = extract_cell(
            &provider,
            &doc,
            &column(),
            &test_config(crate::config::ResponsePolicy::StrictWithRetry),
        )
        .await
        .unwrap();
        assert_eq!(cell.value, "x");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn anthropic_client_posts_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"{\"value\":\"1\"}"}],"usage":{"input_tokens":5,"output_tokens":3}}"#)
            .create_async()
            .await;

        let client = AnthropicClient::new("sk-test", server.url());
        let req = MessageRequest {
            model: "m".into(),
            max_tokens: 10,
            system: None,
            messages: vec![Message::user("hi")],
        };
        let reply = client.create_message(&req).await.unwrap();
        mock.assert_async().await;
        assert_eq!(reply.first_text(), Some("{\"value\":\"1\"}"));
        assert_eq!(reply.usage.unwrap().output_tokens, 3);
    }

    #[tokio::test]
    async fn anthropic_rate_limit_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body(r#"{"type":"error","error":{"type":"rate_limit_error","message":"Number of requests has exceeded your rate limit"}}"#)
            .create_async()
            .await;

        let client = AnthropicClient::new("sk-test", server.url());
        let req = MessageRequest {
            model: "m".into(),
            max_tokens: 10,
            system: None,
            messages: vec![Message::user("hi")],
        };
        let err = client.create_message(&req).await.unwrap_err();
        match &err {
            ExtractError::ModelCall { status, error_type, .. } => {
                assert_eq!(*status, Some(429));
                assert_eq!(error_type.as_deref(), Some("rate_limit_error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_rate_limited());
    }
}
