//! File → [`Document`] under the configured [`IngestStrategy`].
//!
//! | Strategy | Steps |
//! |----------|-------|
//! | `Inline` | encode |
//! | `ConvertThenInline` | encode → convert Word to PDF |
//! | `Reference` | resumable upload |
//!
//! Independently of the strategy, Word files get a best-effort local text
//! extraction when `extract_local_text` is on. Its failure never fails
//! ingestion.

use crate::config::{ExtractionConfig, IngestStrategy};
use crate::error::ExtractError;
use crate::model::Document;
use crate::pipeline::conversion::ConversionClient;
use crate::pipeline::docx::{is_word_document, try_extract_text};
use crate::pipeline::encode::{encode_file, read_file, FileInput};
use crate::pipeline::upload::UploadClient;
use std::path::Path;
use tracing::info;

/// Turns user files into model-ready documents.
#[derive(Debug, Clone)]
pub struct Ingestor {
    strategy: IngestStrategy,
    extract_local_text: bool,
    converter: ConversionClient,
    uploader: UploadClient,
}

impl Ingestor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            strategy: config.strategy,
            extract_local_text: config.extract_local_text,
            converter: ConversionClient::new(config.convert_url.clone(), config.convert_key.clone()),
            uploader: UploadClient::new(config.upload_base_url.clone(), config.upload_key.clone()),
        }
    }

    pub fn strategy(&self) -> IngestStrategy {
        self.strategy
    }

    /// Ingest an in-memory file.
    pub async fn ingest(&self, file: FileInput) -> Result<Document, ExtractError> {
        let extracted_text = if self.extract_local_text && is_word_document(file.mime_or_default(), &file.name) {
            try_extract_text(&file.bytes, &file.name)
        } else {
            None
        };

        let mut document = match self.strategy {
            IngestStrategy::Inline => {
                let encoded = encode_file(&file);
                Document::inline(encoded.display_name, encoded.mime_type, encoded.data)
            }
            IngestStrategy::ConvertThenInline => {
                let encoded = encode_file(&file);
                let outcome = self.converter.convert(&encoded).await?;
                if outcome.converted {
                    info!("'{}' converted to '{}'", file.name, outcome.file_name);
                    Document::inline(outcome.file_name, "application/pdf", outcome.pdf_data)
                } else {
                    Document::inline(encoded.display_name, encoded.mime_type, encoded.data)
                }
            }
            IngestStrategy::Reference => {
                let uploaded = self.uploader.upload(&file).await?;
                Document::reference(uploaded.display_name, uploaded.mime_type, uploaded.uri)
            }
        };

        document.extracted_text = extracted_text;
        Ok(document)
    }

    /// Read a file from disk and ingest it.
    pub async fn ingest_path(&self, path: impl AsRef<Path>) -> Result<Document, ExtractError> {
        let file = read_file(path).await?;
        self.ingest(file).await
    }
}
