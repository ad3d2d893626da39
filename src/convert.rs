//! Pipeline driver: walk an input directory and convert every PDF in it.
//!
//! Each candidate PDF moves through `Pending → Skipped | Succeeded | Failed`.
//! A document whose output file already exists is skipped without any
//! rasterisation or model call, so an interrupted run can simply be
//! restarted. Any [`DocumentError`] is confined to its document: it becomes
//! a `Failed` report and the driver moves on.
//!
//! Output files are written atomically (temp file + rename), so a `.txt`
//! that exists is always complete. When two PDFs of one run map to the same
//! `.txt` (`a.pdf` and `a.PDF`), the later one fails without being
//! processed.

use crate::assemble::{display_name, DocumentAssembler};
use crate::config::PipelineConfig;
use crate::error::{DocumentError, Pdf2TxtError};
use crate::output::{DocumentReport, DocumentStatus, RunSummary};
use crate::pipeline::harmonize::Harmonizer;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::{input, postprocess, verify};
use crate::service::{InferenceService, ProviderService};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used with [`DEFAULT_PROVIDER`].
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Batch converter from a directory of PDFs to a directory of `.txt` files.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2txt::{Pipeline, PipelineConfig};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder().batch_size(10).build()?;
/// let pipeline = Pipeline::from_config(config)?;
/// let summary = pipeline.run(Path::new("reports"), Path::new("texts")).await?;
/// println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    assembler: DocumentAssembler,
    harmonizer: Harmonizer,
    config: PipelineConfig,
}

/// Numbers carried from a converted document into its report.
#[derive(Default)]
struct Converted {
    pages: usize,
    batches: usize,
    input_tokens: u64,
    output_tokens: u64,
    flagged_pages: usize,
    verification: Option<PathBuf>,
}

impl Pipeline {
    /// Build a pipeline from explicit collaborators.
    pub fn new(
        service: Arc<dyn InferenceService>,
        rasterizer: Arc<dyn Rasterizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            assembler: DocumentAssembler::new(rasterizer, Arc::clone(&service), config.clone()),
            harmonizer: Harmonizer::new(service, config.clone()),
            config,
        }
    }

    /// Build a pipeline with the provider and pdfium binding the config
    /// describes.
    ///
    /// # Errors
    /// Fails before any document is touched when the provider's credential
    /// is missing, the provider cannot be constructed, or pdfium cannot be
    /// bound.
    pub fn from_config(config: PipelineConfig) -> Result<Self, Pdf2TxtError> {
        let service = resolve_service(&config)?;
        let rasterizer = PdfiumRasterizer::new(config.pdfium_lib_path.clone(), config.password.clone())?;
        Ok(Self::new(service, Arc::new(rasterizer), config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert every candidate PDF in `input_dir` into `output_dir`.
    ///
    /// Returns `Ok` even when individual documents fail; inspect
    /// [`RunSummary::failed`] and the per-document reports.
    ///
    /// # Errors
    /// Only for conditions that stop the whole run: a missing or unreadable
    /// input directory, or an output directory that cannot be created.
    pub async fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<RunSummary, Pdf2TxtError> {
        let run_start = Instant::now();

        let pdfs = input::discover_pdfs(input_dir)?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| Pdf2TxtError::OutputDirFailed {
                path: output_dir.to_path_buf(),
                source,
            })?;

        info!(
            "Found {} PDF(s) in {} → {}",
            pdfs.len(),
            input_dir.display(),
            output_dir.display()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(pdfs.len());
        }

        let collisions = input::output_collisions(&pdfs, output_dir);

        // `buffered` keeps reports in input order even when documents overlap.
        let reports: Vec<DocumentReport> = stream::iter(pdfs.into_iter().map(|pdf| {
            let out = output_dir.to_path_buf();
            let claimed_by = collisions.get(&pdf).cloned();
            async move {
                match claimed_by {
                    Some(first) => self.collision_report(&pdf, &out, first),
                    None => self.process_document(&pdf, &out).await,
                }
            }
        }))
        .buffered(self.config.concurrency.max(1))
        .collect()
        .await;

        let summary = RunSummary::from_reports(reports, run_start.elapsed().as_millis() as u64);
        info!(
            "Run complete: {} succeeded, {} skipped, {} failed ({} content rejections) in {}ms",
            summary.succeeded, summary.skipped, summary.failed, summary.rejected, summary.total_duration_ms
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(&summary);
        }
        Ok(summary)
    }

    /// Convert one PDF into `output_dir`.
    ///
    /// Never fails: every outcome, including errors, is a [`DocumentReport`].
    pub async fn process_document(&self, pdf_path: &Path, output_dir: &Path) -> DocumentReport {
        let start = Instant::now();
        let name = display_name(pdf_path);
        let target = input::output_path_for(pdf_path, output_dir);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(&name);
        }

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            info!("Skipping '{}': {} already exists", name, target.display());
            let report = DocumentReport::skipped(pdf_path.to_path_buf(), target);
            self.finish(&report);
            return report;
        }

        info!("Processing '{}'...", name);
        let result = self.convert_document(pdf_path, &target, &name).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let report = match result {
            Ok(done) => {
                info!(
                    "Converted '{}': {} pages, {} batches in {}ms",
                    name, done.pages, done.batches, duration_ms
                );
                DocumentReport {
                    source: pdf_path.to_path_buf(),
                    output: target,
                    status: DocumentStatus::Succeeded,
                    pages: done.pages,
                    batches: done.batches,
                    input_tokens: done.input_tokens,
                    output_tokens: done.output_tokens,
                    duration_ms,
                    error: None,
                    flagged_pages: done.flagged_pages,
                    verification: done.verification,
                }
            }
            Err(e) => {
                if e.is_content_rejection() {
                    warn!("'{}' was rejected by the model: {}", name, e);
                } else {
                    error!("Failed to convert '{}': {}", name, e);
                }
                DocumentReport::failed(pdf_path.to_path_buf(), target, &e, duration_ms)
            }
        };

        self.finish(&report);
        report
    }

    /// Fail `pdf_path` because `claimed_by` already owns its output file.
    fn collision_report(&self, pdf_path: &Path, output_dir: &Path, claimed_by: PathBuf) -> DocumentReport {
        let name = display_name(pdf_path);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(&name);
        }

        let target = input::output_path_for(pdf_path, output_dir);
        let e = DocumentError::OutputCollision {
            path: target.clone(),
            claimed_by,
        };
        warn!("Not converting '{}': {}", name, e);
        let report = DocumentReport::failed(pdf_path.to_path_buf(), target, &e, 0);
        self.finish(&report);
        report
    }

    async fn convert_document(
        &self,
        pdf_path: &Path,
        target: &Path,
        name: &str,
    ) -> Result<Converted, DocumentError> {
        input::validate_pdf(pdf_path)?;

        let assembled = self.assembler.assemble(pdf_path).await?;
        let mut done = Converted {
            pages: assembled.pages,
            batches: assembled.batches,
            input_tokens: assembled.input_tokens,
            output_tokens: assembled.output_tokens,
            flagged_pages: assembled.verifications.iter().filter(|v| !v.is_clean()).count(),
            verification: None,
        };

        let mut text = assembled.text;
        if self.config.harmonize {
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_harmonize_start(name);
            }
            let harmonized = self.harmonizer.harmonize(&text, &format!("'{name}'")).await?;
            done.input_tokens += harmonized.input_tokens;
            done.output_tokens += harmonized.output_tokens;
            text = harmonized.text;
        }

        if self.config.postprocess {
            text = postprocess::clean_text(&text);
        }

        write_atomic(target, &text).await?;
        debug!("Wrote {} chars to {}", text.len(), target.display());

        if !assembled.verifications.is_empty() {
            let report_path = target.with_extension("verify.txt");
            let body = verify::render_report(name, &assembled.verifications);
            match write_atomic(&report_path, &body).await {
                Ok(()) => {
                    info!(
                        "'{}': {} of {} checked page(s) flagged, see {}",
                        name,
                        done.flagged_pages,
                        assembled.verifications.len(),
                        report_path.display()
                    );
                    done.verification = Some(report_path);
                }
                Err(e) => warn!("'{}': verification report not written: {}", name, e),
            }
        }
        Ok(done)
    }

    fn finish(&self, report: &DocumentReport) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_finished(report);
        }
    }
}

/// Write `text` to `<target>.tmp`, then rename over `target`.
async fn write_atomic(target: &Path, text: &str) -> Result<(), DocumentError> {
    let tmp_path: PathBuf = target.with_extension("txt.tmp");
    let write_failed = |source| DocumentError::OutputWriteFailed {
        path: target.to_path_buf(),
        source,
    };

    tokio::fs::write(&tmp_path, text).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, target).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

/// API key variables accepted for each provider. Any one of them suffices.
///
/// Providers not listed here (local servers, unknown names) need none; the
/// provider factory reports its own error for names it does not know.
pub fn credential_vars(provider: &str) -> &'static [&'static str] {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" | "claude" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        "xai" | "grok" => &["XAI_API_KEY"],
        "azure" | "azure-openai" | "azure_openai" => &["AZURE_OPENAI_API_KEY"],
        _ => &[],
    }
}

/// Fail with [`Pdf2TxtError::MissingCredential`] unless `lookup` finds a
/// non-empty value for one of the provider's key variables.
pub fn check_credential(
    provider: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Pdf2TxtError> {
    let vars = credential_vars(provider);
    if vars.is_empty() {
        return Ok(());
    }
    let found = vars
        .iter()
        .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()));
    if found {
        Ok(())
    } else {
        Err(Pdf2TxtError::MissingCredential {
            provider: provider.to_string(),
            vars: vars.to_vec(),
        })
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Pick the provider and model, from most-specific to least-specific.
///
/// 1. `config.provider_name` / `config.model`
/// 2. `EDGEQUAKE_LLM_PROVIDER` / `EDGEQUAKE_MODEL`
/// 3. [`DEFAULT_PROVIDER`] / [`DEFAULT_MODEL`]
///
/// A model without a provider is never paired with the default provider's
/// model name, and vice versa: a non-default provider with no model set
/// lets the factory choose its own default.
fn select_provider(config: &PipelineConfig) -> (String, Option<String>) {
    let provider = config
        .provider_name
        .clone()
        .or_else(|| non_empty_env("EDGEQUAKE_LLM_PROVIDER"))
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let model = config.model.clone().or_else(|| non_empty_env("EDGEQUAKE_MODEL")).or_else(|| {
        provider
            .eq_ignore_ascii_case(DEFAULT_PROVIDER)
            .then(|| DEFAULT_MODEL.to_string())
    });

    (provider, model)
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2TxtError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2TxtError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the inference service for a run.
///
/// A pre-built `config.service` is used as-is. Otherwise the provider is
/// selected, its credential is checked, and an `edgequake_llm` provider is
/// constructed and wrapped in a [`ProviderService`].
pub fn resolve_service(config: &PipelineConfig) -> Result<Arc<dyn InferenceService>, Pdf2TxtError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    let (provider_name, model) = select_provider(config);
    check_credential(&provider_name, |var| std::env::var(var).ok())?;

    let model = model.unwrap_or_default();
    let provider = create_vision_provider(&provider_name, &model)?;
    let label = if model.is_empty() {
        provider_name
    } else {
        format!("{provider_name}/{model}")
    };
    info!("Using inference provider {}", label);

    Ok(Arc::new(ProviderService::new(provider, label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn gemini_accepts_either_key() {
        assert!(check_credential("gemini", env(&[("GEMINI_API_KEY", "k")])).is_ok());
        assert!(check_credential("gemini", env(&[("GOOGLE_API_KEY", "k")])).is_ok());
    }

    #[test]
    fn missing_key_names_every_accepted_variable() {
        let err = check_credential("gemini", env(&[])).unwrap_err();
        match err {
            Pdf2TxtError::MissingCredential { ref provider, ref vars } => {
                assert_eq!(provider, "gemini");
                assert_eq!(vars, &vec!["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = check_credential("openai", env(&[("OPENAI_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, Pdf2TxtError::MissingCredential { .. }));
    }

    #[test]
    fn local_providers_need_no_key() {
        assert!(check_credential("ollama", env(&[])).is_ok());
        assert!(check_credential("lmstudio", env(&[])).is_ok());
    }

    #[test]
    fn provider_lookup_is_case_insensitive() {
        assert_eq!(credential_vars("OpenAI"), &["OPENAI_API_KEY"]);
    }

    #[test]
    fn explicit_config_wins_over_defaults() {
        let config = PipelineConfig::builder()
            .provider_name("openai")
            .model("gpt-4.1-mini")
            .build()
            .unwrap();
        let (provider, model) = select_provider(&config);
        assert_eq!(provider, "openai");
        assert_eq!(model.as_deref(), Some("gpt-4.1-mini"));
    }

    #[test]
    fn prebuilt_service_skips_credential_check() {
        use crate::error::InferenceError;
        use crate::service::{InferenceRequest, InferenceResponse};
        use async_trait::async_trait;

        struct Fixed;

        #[async_trait]
        impl InferenceService for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }

            async fn generate(&self, _r: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
                Ok(InferenceResponse::default())
            }
        }

        let config = PipelineConfig::builder()
            .provider_name("openai")
            .service(Arc::new(Fixed))
            .build()
            .unwrap();
        let service = resolve_service(&config).unwrap();
        assert_eq!(service.name(), "fixed");
    }
}
