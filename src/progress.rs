//! Progress-callback trait for per-cell extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events while [`crate::extract::extract_table`] works through the table.
//! Callers forward them wherever they like: a channel, a socket, a terminal
//! progress bar.
//!
//! # Example
//!
//! ```rust
//! use docsheet::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_cell_complete(&self, document: &str, column: &str, value: &str) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {document} / {column} = {value}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the table driver as it processes each cell.
///
/// Cells run concurrently, so `on_cell_start`, `on_cell_complete` and
/// `on_cell_error` may be called from different tasks at once.
/// Implementations must synchronise their own shared state. All methods
/// default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any cell is extracted.
    fn on_table_start(&self, total_cells: usize) {
        let _ = total_cells;
    }

    /// Called just before the model request is sent for a cell.
    fn on_cell_start(&self, document: &str, column: &str) {
        let _ = (document, column);
    }

    /// Called when a cell is extracted.
    fn on_cell_complete(&self, document: &str, column: &str, value: &str) {
        let _ = (document, column, value);
    }

    /// Called when a cell fails after all retries are exhausted.
    fn on_cell_error(&self, document: &str, column: &str, error: &str) {
        let _ = (document, column, error);
    }

    /// Called once after every cell has been attempted.
    fn on_table_complete(&self, total_cells: usize, success_count: usize) {
        let _ = (total_cells, success_count);
    }
}

/// No-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_table_start(&self, total_cells: usize) {
            self.total.store(total_cells, Ordering::SeqCst);
        }

        fn on_cell_start(&self, _document: &str, _column: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cell_complete(&self, _document: &str, _column: &str, _value: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cell_error(&self, _document: &str, _column: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_table_complete(&self, _total_cells: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_table_start(4);
        cb.on_cell_start("a.pdf", "Total");
        cb.on_cell_complete("a.pdf", "Total", "42");
        cb.on_cell_error("b.pdf", "Total", "rate limited");
        cb.on_table_complete(4, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_table_start(3);
        tracker.on_cell_start("a", "x");
        tracker.on_cell_complete("a", "x", "1");
        tracker.on_cell_start("b", "x");
        tracker.on_cell_error("b", "x", "boom");
        tracker.on_table_complete(3, 1);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }
}
