//! Result types returned by the pipeline driver.
//!
//! Every input PDF ends up as exactly one [`DocumentReport`]; the reports of
//! a run are collected into a [`RunSummary`] whose counters are the run's
//! success / skip / failure tally. All types are `serde`-serialisable so the
//! CLI can emit them as JSON.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model refused to transcribe or harmonise (policy / safety).
    ContentRejected,
    /// Transport, provider or rasteriser failure.
    Service,
    /// Local I/O or internal error.
    Other,
}

/// Terminal state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Output written.
    Succeeded,
    /// Output already existed; nothing was done.
    Skipped,
    /// No output written.
    Failed(FailureKind),
}

/// Outcome of processing a single PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Source PDF path.
    pub source: PathBuf,
    /// Target `.txt` path (exists only when `status` is not `Failed`).
    pub output: PathBuf,
    pub status: DocumentStatus,
    /// Pages rasterised (0 when skipped).
    pub pages: usize,
    /// Batches sent to the model (0 when skipped).
    pub batches: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    /// Human-readable error description when `status` is `Failed`.
    pub error: Option<String>,
    /// Checked pages the model reported discrepancies for.
    #[serde(default)]
    pub flagged_pages: usize,
    /// `<stem>.verify.txt`, when verification ran and its report was written.
    #[serde(default)]
    pub verification: Option<PathBuf>,
}

impl DocumentReport {
    /// A report for a document whose output already exists.
    pub fn skipped(source: PathBuf, output: PathBuf) -> Self {
        Self {
            source,
            output,
            status: DocumentStatus::Skipped,
            pages: 0,
            batches: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            error: None,
            flagged_pages: 0,
            verification: None,
        }
    }

    /// A report for a document that produced no output.
    pub fn failed(source: PathBuf, output: PathBuf, error: &DocumentError, duration_ms: u64) -> Self {
        Self {
            status: DocumentStatus::Failed(error.failure_kind()),
            duration_ms,
            error: Some(error.to_string()),
            ..Self::skipped(source, output)
        }
    }

    /// File name of the source PDF, for status lines.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Tally of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Candidate PDFs found in the input directory.
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// All failures, content rejections included.
    pub failed: usize,
    /// Failures caused by a content rejection (subset of `failed`).
    pub rejected: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    /// Per-document reports in input order.
    pub documents: Vec<DocumentReport>,
}

impl RunSummary {
    /// Build the tally from per-document reports.
    pub fn from_reports(documents: Vec<DocumentReport>, total_duration_ms: u64) -> Self {
        let mut summary = RunSummary {
            total: documents.len(),
            total_duration_ms,
            ..Default::default()
        };

        for report in &documents {
            match report.status {
                DocumentStatus::Succeeded => summary.succeeded += 1,
                DocumentStatus::Skipped => summary.skipped += 1,
                DocumentStatus::Failed(kind) => {
                    summary.failed += 1;
                    if kind == FailureKind::ContentRejected {
                        summary.rejected += 1;
                    }
                }
            }
            summary.total_input_tokens += report.input_tokens;
            summary.total_output_tokens += report.output_tokens;
        }

        summary.documents = documents;
        summary
    }

    /// Reports for documents that failed, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents
            .iter()
            .filter(|r| matches!(r.status, DocumentStatus::Failed(_)))
    }
}
