//! Result types for table runs.

use crate::error::CellError;
use crate::model::{ExtractionCell, ExtractionResult};
use serde::{Deserialize, Serialize};

/// One extracted (document, column) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    pub document_id: String,
    pub column_id: String,
    pub cell: ExtractionCell,
    /// Wall-clock time of the cell's model call(s), retries included.
    pub duration_ms: u64,
}

/// Aggregate numbers for a table run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub total_cells: usize,
    pub extracted_cells: usize,
    pub failed_cells: usize,
    pub total_duration_ms: u64,
}

/// Output of [`crate::extract::extract_table`].
///
/// Partial tables are normal: every cell that succeeded is in `results`,
/// every one that did not is in `failures`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableOutput {
    pub results: ExtractionResult,
    pub failures: Vec<CellError>,
    pub stats: TableStats,
}

impl TableOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
