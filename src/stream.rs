//! Streaming table extraction: emit cells as they complete.
//!
//! Unlike [`crate::extract::extract_table`], which returns after every cell
//! is done, [`extract_stream`] yields each [`CellResult`] as soon as its model
//! call finishes. Cells arrive in completion order, not table order.

use crate::config::ExtractionConfig;
use crate::error::{CellError, ExtractError};
use crate::extract::run_cell;
use crate::model::{Column, Document};
use crate::output::CellResult;
use crate::pipeline::llm::resolve_provider;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of cell results.
pub type CellStream = Pin<Box<dyn Stream<Item = Result<CellResult, CellError>> + Send>>;

/// Extract every column from every document, streaming cells as they are
/// ready.
///
/// # Returns
/// - `Ok(CellStream)`: one item per (document, column) pair
/// - `Err(ExtractError)`: the model client could not be resolved
///
/// # Example
/// ```rust,no_run
/// use docsheet::{extract_stream, Column, ColumnType, Document, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let docs = vec![Document::inline("a.pdf", "application/pdf", "JVBERi0=")];
/// let cols = vec![Column::new("Total", ColumnType::Number, "The invoice total.")];
/// let config = ExtractionConfig::from_env();
/// let mut cells = extract_stream(docs, cols, &config)?;
/// while let Some(cell) = cells.next().await {
///     match cell {
///         Ok(c) => println!("{} / {} = {}", c.document_id, c.column_id, c.cell.value),
///         Err(e) => eprintln!("Error: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    documents: Vec<Document>,
    columns: Vec<Column>,
    config: &ExtractionConfig,
) -> Result<CellStream, ExtractError> {
    let provider = resolve_provider(config)?;
    info!(
        "Streaming {} cells (concurrency {})",
        documents.len() * columns.len(),
        config.concurrency
    );

    let columns = Arc::new(columns);
    let pairs: Vec<(Arc<Document>, usize)> = documents
        .into_iter()
        .map(Arc::new)
        .flat_map(|doc| (0..columns.len()).map(move |i| (Arc::clone(&doc), i)))
        .collect();

    let concurrency = config.concurrency.max(1);
    let config = Arc::new(config.clone());

    let s = stream::iter(pairs.into_iter().map(move |(doc, i)| {
        let provider = Arc::clone(&provider);
        let columns = Arc::clone(&columns);
        let cfg = Arc::clone(&config);
        async move { run_cell(&provider, &doc, &columns[i], &cfg).await }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
