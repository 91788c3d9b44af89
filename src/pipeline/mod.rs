//! Pipeline stages for document extraction.
//!
//! One submodule per step.
//!
//! ## Data Flow
//!
//! ```text
//! file ──▶ ingest ──────────────────────────▶ llm ──▶ parse
//!           ├─ encode   (base64)               (model call, retried)
//!           ├─ docx     (local text, optional)
//!           ├─ conversion (Word → PDF, optional)
//!           └─ upload   (reference URI, optional)
//! ```
//!
//! 1. [`ingest`]     turn a file into a [`crate::model::Document`] under
//!    the configured strategy
//! 2. [`encode`]     base64-wrap bytes with a MIME type and display name
//! 3. [`docx`]       best-effort plain text from `.docx` archives
//! 4. [`conversion`] call the Word → PDF conversion service
//! 5. [`upload`]     resumable upload to a hosted file store
//! 6. [`llm`]        build the request and call the model
//! 7. [`retry`]      exponential backoff with jitter around model calls
//! 8. [`parse`]      recover the JSON object and normalise it into a cell

pub mod conversion;
pub mod docx;
pub mod encode;
pub mod ingest;
pub mod llm;
pub mod parse;
pub mod retry;
pub mod upload;
