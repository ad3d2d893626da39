//! Configuration types for batch PDF-to-text conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config between the assembler, the harmoniser and the
//! driver, and to log it at the start of a run.

use crate::error::Pdf2TxtError;
use crate::progress::ProgressCallback;
use crate::prompts::{COMPLEX_LAYOUT_INSTRUCTION, FINANCIAL_INSTRUCTION};
use crate::service::InferenceService;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of page images per OCR request.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Configuration for a batch conversion run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2txt::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .batch_size(10)
///     .harmonize(true)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size.get(), 10);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 300.
    ///
    /// Scanned reports with small print need the full 300 DPI; drop to 150
    /// for clean digital PDFs to cut upload size per batch.
    pub dpi: u32,

    /// Page images per OCR request. Default: 25.
    ///
    /// Larger batches mean fewer boundary markers to harmonise but bigger
    /// requests; the provider's request-size and output-token limits are the
    /// upper bound.
    pub batch_size: NonZeroUsize,

    /// Number of documents processed at the same time. Default: 1.
    ///
    /// Batches within one document are always sent one after another.
    pub concurrency: usize,

    /// Run the harmonisation pass after OCR. Default: false.
    pub harmonize: bool,

    /// Apply deterministic text cleanup to the final document. Default: false.
    ///
    /// Off, the written text is exactly the marker-joined transcription (or
    /// the harmonised text).
    pub postprocess: bool,

    /// Ask the model to compare one page of every batch against the batch
    /// text and write its findings to `<stem>.verify.txt`. Default: false.
    pub verify: bool,

    /// Built-in task instruction sent with every batch.
    pub profile: InstructionProfile,

    /// Custom task instruction. Overrides `profile` when set.
    pub instruction: Option<String>,

    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed inference service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn InferenceService>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per request. Default: 8192.
    ///
    /// A 25-page batch of dense text easily exceeds 4 000 output tokens;
    /// a limit that is too low silently truncates the batch.
    pub max_tokens: usize,

    /// Retry attempts on a transient failure (timeout, 5xx). Default: 3.
    ///
    /// Content rejections and authentication errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Parent directory for per-document working directories.
    /// If None, the system temp directory is used.
    pub work_dir: Option<PathBuf>,

    /// Path to a pdfium shared library. If None, `PDFIUM_LIB_PATH`, the
    /// current directory and the system library path are tried in order.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Receives per-document and per-batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            concurrency: 1,
            harmonize: false,
            postprocess: false,
            verify: false,
            profile: InstructionProfile::default(),
            instruction: None,
            model: None,
            provider_name: None,
            service: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 300,
            work_dir: None,
            pdfium_lib_path: None,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("harmonize", &self.harmonize)
            .field("postprocess", &self.postprocess)
            .field("verify", &self.verify)
            .field("profile", &self.profile)
            .field("instruction", &self.instruction.as_ref().map(|_| "<custom>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|_| "<dyn InferenceService>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The task instruction sent with every OCR batch.
    pub fn ocr_instruction(&self) -> &str {
        self.instruction
            .as_deref()
            .unwrap_or_else(|| self.profile.instruction())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn harmonize(mut self, v: bool) -> Self {
        self.config.harmonize = v;
        self
    }

    pub fn postprocess(mut self, v: bool) -> Self {
        self.config.postprocess = v;
        self
    }

    pub fn verify(mut self, v: bool) -> Self {
        self.config.verify = v;
        self
    }

    pub fn profile(mut self, profile: InstructionProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn InferenceService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2TxtError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2TxtError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2TxtError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2TxtError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref text) = c.instruction {
            if text.trim().is_empty() {
                return Err(Pdf2TxtError::InvalidConfig(
                    "Custom instruction is empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Built-in task instruction sent alongside the fixed transcription rules.
///
/// | Profile | Use case |
/// |---------|----------|
/// | `ComplexLayout` | Reports, papers, multi-column layouts (default) |
/// | `Financial` | Statements and filings where numeric accuracy dominates |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionProfile {
    #[default]
    ComplexLayout,
    Financial,
}

impl InstructionProfile {
    pub fn instruction(self) -> &'static str {
        match self {
            InstructionProfile::ComplexLayout => COMPLEX_LAYOUT_INSTRUCTION,
            InstructionProfile::Financial => FINANCIAL_INSTRUCTION,
        }
    }
}
