//! # docsheet
//!
//! Turn a pile of documents into a table. Every (document, column) pair is
//! one call to a hosted language model that reads the document and answers
//! the column's instruction as JSON; the reply becomes an
//! [`ExtractionCell`] with a value, a confidence level, a supporting quote,
//! a page number and the model's reasoning.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Ingest   base64 inline │ Word → PDF via service │ upload by reference
//!  ├─ 2. Text     best-effort .docx text (optional)
//!  ├─ 3. Prompt   column name + instruction + type format + JSON shape
//!  ├─ 4. Model    Anthropic Messages API, retried on rate limits
//!  └─ 5. Parse    first {...} span → ExtractionCell (status needs_review)
//! ```
//!
//! Around the core sit a table driver ([`extract_table`],
//! [`extract_stream`]), a chat helper that answers questions over the
//! finished table ([`chat()`]), a prompt helper ([`suggest_prompt`]) and,
//! behind the `server` feature, the Word → PDF conversion service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsheet::{extract, Column, ColumnType, ExtractionConfig, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys from ANTHROPIC_API_KEY etc.
//!     let config = ExtractionConfig::from_env();
//!     let doc = Ingestor::new(&config).ingest_path("invoice.pdf").await?;
//!     let column = Column::new("Total", ColumnType::Number, "The amount due.");
//!     let cell = extract(&doc, &column, &config).await?;
//!     println!("{} ({:?}): \"{}\"", cell.value, cell.confidence, cell.quote);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`    | on | The `docsheet` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on | The conversion service router (axum + tower-http) |
//!
//! Library-only use:
//! ```toml
//! docsheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{chat, render_table_csv, ChatContext};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, IngestStrategy, ResponsePolicy};
pub use error::{CellError, ExtractError};
pub use extract::{extract, extract_table, suggest_prompt};
pub use model::{
    ChatTurn, Column, ColumnType, Confidence, Document, DocumentPayload, ExtractionCell,
    ExtractionResult, ReviewStatus, Role,
};
pub use output::{CellResult, TableOutput, TableStats};
pub use pipeline::encode::{encode_file, read_file, EncodedFile, FileInput};
pub use pipeline::ingest::Ingestor;
pub use pipeline::llm::{AnthropicClient, MessageRequest, MessageResponse, ModelClient};
pub use pipeline::retry::{with_retry, with_retry_if, RetryPolicy};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, CellStream};
