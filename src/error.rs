//! Error types for the edgequake-pdf2txt library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2TxtError`] — **Fatal**: the run cannot start or continue at all
//!   (missing API key, unreadable input directory, pdfium not found).
//!   Returned as `Err(Pdf2TxtError)` from [`crate::Pipeline::run`] before any
//!   document is touched.
//!
//! * [`DocumentError`] — **Per-document**: one PDF could not be converted
//!   (content rejected by the model, service failure, corrupt file). The
//!   driver records it in a [`crate::output::DocumentReport`] and moves on to
//!   the next document.
//!
//! * [`InferenceError`] — a single remote model call failed. It is wrapped
//!   into a [`DocumentError`] together with the stage (batch or harmonisation)
//!   that issued the call.

use crate::output::FailureKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2txt library.
///
/// Anything that only affects a single document uses [`DocumentError`] and is
/// reported rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2TxtError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// No API key found for the selected provider.
    #[error(
        "No API key found for provider '{provider}'.\n\
Set one of: {}",
        .vars.join(", ")
    )]
    MissingCredential {
        provider: String,
        vars: Vec<&'static str>,
    },

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input / output directories ────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// The input directory exists but could not be listed.
    #[error("Failed to read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),
}

/// Which remote call a [`DocumentError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// OCR of the n-th batch (1-based).
    Batch(usize),
    /// The harmonisation pass over the assembled text.
    Harmonize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Batch(n) => write!(f, "batch {n}"),
            Stage::Harmonize => f.write_str("harmonization"),
        }
    }
}

/// A failure confined to one document.
///
/// The driver turns every variant into a `Failed` status and continues with
/// the next document; no output file is written for the failed one.
#[derive(Debug, Error)]
pub enum DocumentError {
    // ── Model errors ──────────────────────────────────────────────────────
    /// The model declined to produce text (safety / policy filter).
    #[error("{stage}: content rejected by the model: {reason}")]
    ContentRejected { stage: Stage, reason: String },

    /// Transport failure, timeout, auth error or malformed response.
    #[error("{stage}: {source}")]
    Service {
        stage: Stage,
        #[source]
        source: InferenceError,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The file does not start with the `%PDF` magic bytes.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none (or the wrong one) was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// pdfium failed to render or the image could not be saved.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The PDF opened fine but has no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The per-document working directory could not be created.
    #[error("Failed to create working directory: {0}")]
    WorkDir(#[source] std::io::Error),

    /// Could not write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another PDF of the same run already maps to this output file
    /// (e.g. `a.pdf` and `a.PDF` both map to `a.txt`).
    #[error("Output '{path}' is already claimed by '{claimed_by}'")]
    OutputCollision { path: PathBuf, claimed_by: PathBuf },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    /// Wrap a failed model call with the stage that issued it.
    ///
    /// Rejections keep their own variant so callers can tell a policy
    /// refusal apart from an operational failure without matching on the
    /// inner error.
    pub fn from_inference(stage: Stage, err: InferenceError) -> Self {
        match err {
            InferenceError::ContentRejected { reason } => {
                DocumentError::ContentRejected { stage, reason }
            }
            other => DocumentError::Service {
                stage,
                source: other,
            },
        }
    }

    /// Coarse classification used for status lines and run tallies.
    ///
    /// Rasteriser failures count as service errors: they are operational
    /// problems with an external collaborator, not policy refusals.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DocumentError::ContentRejected { .. } => FailureKind::ContentRejected,
            DocumentError::Service { .. }
            | DocumentError::NotAPdf { .. }
            | DocumentError::CorruptPdf { .. }
            | DocumentError::PasswordRequired { .. }
            | DocumentError::RasterisationFailed { .. }
            | DocumentError::EmptyDocument { .. } => FailureKind::Service,
            DocumentError::WorkDir(_)
            | DocumentError::OutputWriteFailed { .. }
            | DocumentError::OutputCollision { .. }
            | DocumentError::Internal(_) => FailureKind::Other,
        }
    }

    pub fn is_content_rejection(&self) -> bool {
        matches!(self, DocumentError::ContentRejected { .. })
    }
}

/// A single remote model call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// The model returned no usable text (blocked, filtered, empty).
    #[error("content rejected: {reason}")]
    ContentRejected { reason: String },

    /// The call did not complete within the configured timeout.
    #[error("API call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 401/403 or an invalid key. Never retried.
    #[error("authentication error: {detail}")]
    Auth { detail: String },

    /// Any other transport or provider failure.
    #[error("service error: {detail}")]
    Service { detail: String },
}

impl InferenceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::Timeout { .. } | InferenceError::Service { .. }
        )
    }
}
