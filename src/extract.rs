//! Extraction entry points.
//!
//! [`extract`] is the primitive: one document, one column, one cell, no
//! shared state. [`extract_table`] drives it over every (document, column)
//! pair with a bounded number of calls in flight and collects per-cell
//! failures instead of aborting. Use [`crate::stream::extract_stream`] to
//! receive cells as they complete.

use crate::config::ExtractionConfig;
use crate::error::{CellError, ExtractError};
use crate::model::{Column, ColumnType, Document, ExtractionCell};
use crate::output::{CellResult, TableOutput, TableStats};
use crate::pipeline::llm::{self, resolve_provider, Message, MessageRequest, ModelClient};
use crate::prompts;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Extract one column's value from one document.
///
/// # Errors
/// Missing API key, model errors that outlive the retry budget, and replies
/// that break the JSON contract. No placeholder cell is returned on failure.
pub async fn extract(
    document: &Document,
    column: &Column,
    config: &ExtractionConfig,
) -> Result<ExtractionCell, ExtractError> {
    let provider = resolve_provider(config)?;
    llm::extract_cell(&provider, document, column, config).await
}

/// Extract every column from every document.
///
/// Returns `Ok` even when some cells failed; check `output.failures`. The
/// only fatal error is failing to resolve the model client.
pub async fn extract_table(
    documents: &[Document],
    columns: &[Column],
    config: &ExtractionConfig,
) -> Result<TableOutput, ExtractError> {
    let start = Instant::now();
    let provider = resolve_provider(config)?;
    let total_cells = documents.len() * columns.len();
    info!(
        "Extracting {} columns from {} documents ({} cells, concurrency {})",
        columns.len(),
        documents.len(),
        total_cells,
        config.concurrency
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_table_start(total_cells);
    }

    let pairs = documents
        .iter()
        .flat_map(|doc| columns.iter().map(move |col| (doc, col)));

    let outcomes: Vec<Result<CellResult, CellError>> = stream::iter(pairs)
        .map(|(doc, col)| run_cell(&provider, doc, col, config))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut output = TableOutput::default();
    let mut extracted_cells = 0;
    for outcome in outcomes {
        match outcome {
            Ok(r) => {
                extracted_cells += 1;
                output.results.insert(r.document_id, r.column_id, r.cell);
            }
            Err(e) => output.failures.push(e),
        }
    }

    output.stats = TableStats {
        total_cells,
        extracted_cells,
        failed_cells: output.failures.len(),
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Table complete: {}/{} cells, {}ms",
        output.stats.extracted_cells, total_cells, output.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_table_complete(total_cells, output.stats.extracted_cells);
    }

    Ok(output)
}

/// One cell of a table run, with progress events and the failure folded
/// into a [`CellError`].
pub(crate) async fn run_cell(
    provider: &Arc<dyn ModelClient>,
    document: &Document,
    column: &Column,
    config: &ExtractionConfig,
) -> Result<CellResult, CellError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_cell_start(&document.name, &column.name);
    }
    let start = Instant::now();

    match llm::extract_cell(provider, document, column, config).await {
        Ok(cell) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_cell_complete(&document.name, &column.name, &cell.value);
            }
            Ok(CellResult {
                document_id: document.id.clone(),
                column_id: column.id.clone(),
                cell,
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Err(e) => {
            warn!("'{}' / '{}' failed: {}", document.name, column.name, e);
            let detail = e.to_string();
            if let Some(ref cb) = config.progress_callback {
                cb.on_cell_error(&document.name, &column.name, &detail);
            }
            Err(CellError::ExtractionFailed {
                document_id: document.id.clone(),
                column_id: column.id.clone(),
                document: document.name.clone(),
                column: column.name.clone(),
                detail,
            })
        }
    }
}

/// Ask the model to write an extraction instruction for a column.
///
/// Never fails: an empty reply or any error falls back to `draft`, then to
/// a generic `Extract the <name> from the document.`.
pub async fn suggest_prompt(
    name: &str,
    column_type: ColumnType,
    draft: Option<&str>,
    config: &ExtractionConfig,
) -> String {
    let fallback = || {
        draft
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| prompts::default_column_prompt(name))
    };

    let request = MessageRequest {
        model: config.model.clone(),
        max_tokens: config.suggest_max_tokens,
        system: None,
        messages: vec![Message::user(prompts::suggest_prompt_request(name, column_type, draft))],
    };

    let reply = match resolve_provider(config) {
        Ok(provider) => provider.create_message(&request).await,
        Err(e) => Err(e),
    };

    match reply {
        Ok(reply) => {
            let text = reply.first_text().unwrap_or_default().trim();
            if text.is_empty() {
                fallback()
            } else {
                text.to_string()
            }
        }
        Err(e) => {
            error!("Prompt generation error: {}", e);
            fallback()
        }
    }
}
