//! # edgequake-pdf2txt
//!
//! Batch-convert a directory of PDFs into plain-text files using a remote
//! multimodal model as the OCR engine.
//!
//! Reports, filings and scanned statements mix multi-column text, tables
//! that run across pages and small print that text-layer extractors garble
//! or miss entirely. This crate rasterises every page, sends the page images
//! to a vision model in fixed-size batches, and joins the transcriptions
//! into one text file per PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  list *.pdf, skip those whose .txt already exists
//!  ├─ 2. Render    rasterise every page to JPEG via pdfium (spawn_blocking)
//!  ├─ 3. Batch     contiguous batches of `batch_size` pages
//!  ├─ 4. OCR       one model call per batch, strictly in order
//!  │              (optional: check the batch's first page against its text)
//!  ├─ 5. Assemble  "--- END OF BATCH n ---" marker + text, per batch
//!  ├─ 6. Harmonize optional second pass that merges across markers
//!  ├─ 7. Polish    optional deterministic cleanup (fences, whitespace, tables)
//!  └─ 8. Output    atomic write of <stem>.txt (and <stem>.verify.txt)
//! ```
//!
//! A failing document never stops the run: it is reported and the next
//! document starts. Page images are deleted as soon as their document is
//! done, whatever the outcome.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2txt::{Pipeline, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider defaults to gemini / gemini-2.0-flash (needs GEMINI_API_KEY)
//!     let config = PipelineConfig::builder().harmonize(true).build()?;
//!     let pipeline = Pipeline::from_config(config)?;
//!     let summary = pipeline.run(Path::new("pdfs"), Path::new("texts")).await?;
//!     eprintln!(
//!         "{} succeeded, {} skipped, {} failed",
//!         summary.succeeded, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2txt = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{AssembledDocument, DocumentAssembler};
pub use config::{InstructionProfile, PipelineConfig, PipelineConfigBuilder};
pub use convert::{check_credential, resolve_service, Pipeline};
pub use error::{DocumentError, InferenceError, Pdf2TxtError, Stage};
pub use output::{DocumentReport, DocumentStatus, FailureKind, RunSummary};
pub use pipeline::render::{PageImage, PdfiumRasterizer, Rasterizer};
pub use pipeline::verify::PageVerification;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use service::{InferenceRequest, InferenceResponse, InferenceService, ProviderService};
