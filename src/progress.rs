//! Progress-callback trait for per-document and per-batch events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the input directory. The CLI uses it to draw
//! its status lines; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2txt::{DocumentReport, PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_document_finished(&self, report: &DocumentReport) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}: {:?}", report.name(), report.status);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{DocumentReport, RunSummary};
use std::sync::Arc;

/// Called by the pipeline as it processes documents and batches.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, events for different documents may arrive
/// interleaved and from different tasks. Events for the batches of one
/// document always arrive in batch order.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once after the input directory has been scanned.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document leaves `Pending` (before the skip check).
    fn on_document_start(&self, name: &str) {
        let _ = name;
    }

    /// Called once the document has been rasterised and batched.
    fn on_document_rasterised(&self, name: &str, pages: usize, batches: usize) {
        let _ = (name, pages, batches);
    }

    /// Called just before a batch is sent to the model.
    ///
    /// # Arguments
    /// * `batch`         — 1-based batch ordinal
    /// * `total_batches` — batches in this document
    /// * `first_page`, `last_page` — 1-based inclusive page span
    fn on_batch_start(
        &self,
        name: &str,
        batch: usize,
        total_batches: usize,
        first_page: usize,
        last_page: usize,
    ) {
        let _ = (name, batch, total_batches, first_page, last_page);
    }

    /// Called when a batch has been transcribed.
    fn on_batch_complete(&self, name: &str, batch: usize, total_batches: usize, text_len: usize) {
        let _ = (name, batch, total_batches, text_len);
    }

    /// Called when the harmonisation pass starts for a document.
    fn on_harmonize_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when a document reaches a terminal state.
    fn on_document_finished(&self, report: &DocumentReport) {
        let _ = report;
    }

    /// Called once after every document has been attempted.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
