//! Progress-callback trait for per-document flattening events.
//!
//! Inject an [`Arc<dyn FlattenProgressCallback>`] via
//! [`crate::config::FlattenConfigBuilder::progress_callback`] to receive
//! events as the traversal driver works through a directory.
//!
//! # Example
//!
//! ```rust
//! use pdf_flatten::{DocumentReport, FlattenConfig, FlattenProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl FlattenProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, report: &DocumentReport) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{index}/{total}: {}", report.output.display());
//!     }
//! }
//!
//! let config = FlattenConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::DocumentReport;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Documents are processed sequentially, but the trait
/// is `Send + Sync` so a callback can be shared with other threads.
pub trait FlattenProgressCallback: Send + Sync {
    /// Called once after discovery, before any document is touched.
    ///
    /// # Arguments
    /// * `total_documents`: number of PDFs that will be processed
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before the vector flatten of a document starts.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the run
    /// * `total`: total documents in the run
    /// * `input`: document being flattened
    /// * `output`: where the flattened result will end up
    fn on_document_start(&self, index: usize, total: usize, input: &Path, output: &Path) {
        let _ = (index, total, input, output);
    }

    /// Called when the raster pass of a document fails. The document still
    /// completes with its vector-flattened content.
    fn on_fallback_warning(&self, input: &Path, warning: &str) {
        let _ = (input, warning);
    }

    /// Called when a document has been flattened.
    fn on_document_complete(&self, index: usize, total: usize, report: &DocumentReport) {
        let _ = (index, total, report);
    }

    /// Called when a document fails fatally.
    fn on_document_error(&self, index: usize, total: usize, input: &Path, error: &str) {
        let _ = (index, total, input, error);
    }

    /// Called once after the last document was attempted.
    ///
    /// # Arguments
    /// * `total`: documents attempted
    /// * `succeeded`: documents flattened without a fatal error
    fn on_run_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FlattenProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FlattenConfig`].
pub type ProgressCallback = Arc<dyn FlattenProgressCallback>;
