//! Document assembly: rasterise → batch → OCR → marker-joined raw text.
//!
//! One [`DocumentAssembler::assemble`] call owns a private working directory
//! for the lifetime of one document. Page images never outlive that call:
//! they live in a [`PageImageSet`] guard that deletes them when dropped, and
//! the working directory itself is a `TempDir` removed on every exit path,
//! success or failure.
//!
//! Batches are sent strictly one after another, in page order. The first
//! batch that fails aborts the document; a partially transcribed document is
//! never returned.
//!
//! With `verify` on, the first page of every batch is checked against that
//! batch's text right after transcription, while the image still exists.
//! Verification is advisory: a failed check is logged and skipped.

use crate::config::PipelineConfig;
use crate::error::{DocumentError, Stage};
use crate::pipeline::batch::{batch_count, batches, page_span};
use crate::pipeline::ocr::OcrClient;
use crate::pipeline::render::{PageImage, Rasterizer};
use crate::pipeline::verify::{PageVerification, Verifier};
use crate::prompts::batch_marker;
use crate::service::InferenceService;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Raw text of one document plus the numbers the driver reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledDocument {
    /// Concatenation of `batch_marker(n) + text_n` for n = 1..=batches.
    pub text: String,
    pub pages: usize,
    pub batches: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Page checks, in batch order. Empty unless `verify` is on.
    pub verifications: Vec<PageVerification>,
}

/// Owns rasterised page files and deletes them on drop.
struct PageImageSet {
    pages: Vec<PageImage>,
}

impl PageImageSet {
    fn new(pages: Vec<PageImage>) -> Self {
        Self { pages }
    }

    fn as_slice(&self) -> &[PageImage] {
        &self.pages
    }
}

impl Drop for PageImageSet {
    fn drop(&mut self) {
        let mut removed = 0usize;
        for page in &self.pages {
            match std::fs::remove_file(&page.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", page.path.display(), e),
            }
        }
        debug!("Removed {} page image(s)", removed);
    }
}

/// Drives rasteriser and OCR client across all batches of one document.
#[derive(Clone)]
pub struct DocumentAssembler {
    rasterizer: Arc<dyn Rasterizer>,
    ocr: OcrClient,
    verifier: Verifier,
    config: PipelineConfig,
}

impl DocumentAssembler {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        service: Arc<dyn InferenceService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            rasterizer,
            ocr: OcrClient::new(Arc::clone(&service), config.clone()),
            verifier: Verifier::new(service, config.clone()),
            config,
        }
    }

    /// Assemble `pdf_path` in a fresh temporary working directory.
    ///
    /// The directory is created under `config.work_dir` (or the system temp
    /// directory) and removed before this returns.
    pub async fn assemble(&self, pdf_path: &Path) -> Result<AssembledDocument, DocumentError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf2txt-");
        let work = match self.config.work_dir {
            Some(ref parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(DocumentError::WorkDir)?;
        debug!("Using working directory {}", work.path().display());

        let result = self.assemble_in(pdf_path, work.path()).await;

        let work_path = work.path().to_path_buf();
        if let Err(e) = work.close() {
            warn!("Failed to remove working directory {}: {}", work_path.display(), e);
        }

        result
    }

    /// Assemble `pdf_path`, rasterising into `working_dir`.
    ///
    /// Every page image written to `working_dir` is deleted before this
    /// returns, whether it succeeds or fails. The directory itself is left
    /// to the caller.
    pub async fn assemble_in(
        &self,
        pdf_path: &Path,
        working_dir: &Path,
    ) -> Result<AssembledDocument, DocumentError> {
        let start = Instant::now();
        let name = display_name(pdf_path);

        info!("Converting '{}' to images...", name);
        let pages = PageImageSet::new(self.render(pdf_path, working_dir).await?);
        let total_pages = pages.as_slice().len();

        if total_pages == 0 {
            return Err(DocumentError::EmptyDocument {
                path: pdf_path.to_path_buf(),
            });
        }

        let size = self.config.batch_size;
        let total_batches = batch_count(total_pages, size);
        info!(
            "'{}': {} pages in {} batch(es) of up to {}",
            name,
            total_pages,
            total_batches,
            size
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_rasterised(&name, total_pages, total_batches);
        }

        let instruction = self.config.ocr_instruction();
        let mut doc = AssembledDocument {
            pages: total_pages,
            batches: total_batches,
            ..Default::default()
        };

        for (i, batch) in batches(pages.as_slice(), size).enumerate() {
            let n = i + 1;
            let (first, last) = page_span(i, size, total_pages);
            info!(
                "Processing batch {} of {} for '{}' (Pages {} to {})...",
                n, total_batches, name, first, last
            );
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_batch_start(&name, n, total_batches, first, last);
            }

            let label = format!("'{name}' batch {n}");
            let transcription = self
                .ocr
                .transcribe(batch, instruction, &label)
                .await
                .map_err(|e| {
                    warn!(
                        "Failed to OCR batch {} (Pages {} to {}) for '{}': {}",
                        n, first, last, name, e
                    );
                    DocumentError::from_inference(Stage::Batch(n), e)
                })?;

            doc.text.push_str(&batch_marker(n));
            doc.text.push_str(&transcription.text);
            doc.input_tokens += transcription.input_tokens;
            doc.output_tokens += transcription.output_tokens;

            if self.config.verify {
                let page = &batch[0];
                let label = format!("'{name}' page {} check", page.index);
                match self.verifier.verify_page(page, n, &transcription.text, &label).await {
                    Ok(v) => {
                        if v.is_clean() {
                            debug!("{}: no discrepancies", label);
                        } else {
                            warn!("{}: {}", label, v.findings);
                        }
                        doc.input_tokens += v.input_tokens;
                        doc.output_tokens += v.output_tokens;
                        doc.verifications.push(v);
                    }
                    Err(e) => warn!("{}: skipped: {}", label, e),
                }
            }

            if let Some(ref cb) = self.config.progress_callback {
                cb.on_batch_complete(&name, n, total_batches, transcription.text.len());
            }
        }

        info!("Cleaning up temporary images for '{}'...", name);
        drop(pages);

        debug!("'{}' assembled in {:?}", name, start.elapsed());
        Ok(doc)
    }

    /// Rasterise on the blocking pool.
    ///
    /// If rendering fails part-way, whatever pages were already written are
    /// swept from `working_dir` before the error is returned.
    async fn render(&self, pdf_path: &Path, working_dir: &Path) -> Result<Vec<PageImage>, DocumentError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let pdf = pdf_path.to_path_buf();
        let dir = working_dir.to_path_buf();
        let dpi = self.config.dpi;

        let result = tokio::task::spawn_blocking(move || rasterizer.render_pages(&pdf, &dir, dpi))
            .await
            .map_err(|e| DocumentError::Internal(format!("Render task panicked: {}", e)))?;

        if result.is_err() {
            sweep_page_files(working_dir);
        }
        result
    }
}

/// Remove any `page_*.jpg` left in `dir` by an aborted render.
fn sweep_page_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with("page_") && file_name.ends_with(".jpg") {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!("Failed to remove {}: {}", entry.path().display(), e);
            }
        }
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::pipeline::render::{page_file_name, save_jpeg};
    use crate::service::{InferenceRequest, InferenceResponse};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes `pages` JPEGs, then fails at `fail_at` if set.
    struct Pages {
        pages: usize,
        fail_at: Option<usize>,
    }

    impl Rasterizer for Pages {
        fn render_pages(&self, _pdf: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PageImage>, DocumentError> {
            let mut out = Vec::new();
            for index in 1..=self.pages {
                if self.fail_at == Some(index) {
                    return Err(DocumentError::RasterisationFailed {
                        page: index,
                        detail: "boom".into(),
                    });
                }
                let path = out_dir.join(page_file_name(index));
                save_jpeg(&RgbImage::from_pixel(8, 8, Rgb([200, 200, 200])), &path).unwrap();
                out.push(PageImage { index, path, dpi });
            }
            Ok(out)
        }
    }

    /// Answers "call n"; fails the call numbered `fail_call` with `error`.
    struct Counting {
        calls: AtomicUsize,
        fail_call: Option<(usize, InferenceError)>,
    }

    impl Counting {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_call: None,
            })
        }

        fn failing(call: usize, error: InferenceError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_call: Some((call, error)),
            })
        }
    }

    #[async_trait]
    impl InferenceService for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            if request.system == crate::prompts::VERIFY_PROMPT {
                return Ok(InferenceResponse {
                    text: if request.prompt.contains("call 2") {
                        "Footer missing.".into()
                    } else {
                        "No errors found.".into()
                    },
                    input_tokens: 1,
                    output_tokens: 1,
                });
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((call, ref error)) = self.fail_call {
                if call == n {
                    return Err(error.clone());
                }
            }
            Ok(InferenceResponse {
                text: format!("call {n}: {} pages", request.images.len()),
                input_tokens: 10,
                output_tokens: 1,
            })
        }
    }

    fn assembler(pages: Pages, service: Arc<Counting>, batch_size: usize) -> DocumentAssembler {
        let config = PipelineConfig::builder()
            .batch_size(batch_size)
            .max_retries(0)
            .build()
            .unwrap();
        DocumentAssembler::new(Arc::new(pages), service, config)
    }

    fn jpg_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".jpg"))
            .count()
    }

    #[tokio::test]
    async fn joins_batches_with_markers_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Counting::ok();
        let a = assembler(Pages { pages: 5, fail_at: None }, svc.clone(), 2);

        let doc = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap();

        let expected = format!(
            "{}call 1: 2 pages{}call 2: 2 pages{}call 3: 1 pages",
            batch_marker(1),
            batch_marker(2),
            batch_marker(3)
        );
        assert_eq!(doc.text, expected);
        assert_eq!((doc.pages, doc.batches), (5, 3));
        assert_eq!(doc.input_tokens, 30);
        assert_eq!(jpg_count(dir.path()), 0);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn first_failing_batch_aborts_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Counting::failing(
            2,
            InferenceError::ContentRejected {
                reason: "SAFETY".into(),
            },
        );
        let a = assembler(Pages { pages: 6, fail_at: None }, svc.clone(), 2);

        let err = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            DocumentError::ContentRejected { stage: Stage::Batch(2), .. }
        ));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
        assert_eq!(jpg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn service_error_is_tagged_with_batch() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Counting::failing(
            1,
            InferenceError::Auth {
                detail: "401".into(),
            },
        );
        let a = assembler(Pages { pages: 1, fail_at: None }, svc, 25);

        let err = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap_err();
        assert!(matches!(err, DocumentError::Service { stage: Stage::Batch(1), .. }));
        assert_eq!(jpg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn zero_pages_is_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Counting::ok();
        let a = assembler(Pages { pages: 0, fail_at: None }, svc.clone(), 2);

        let err = a.assemble_in(Path::new("blank.pdf"), dir.path()).await.unwrap_err();
        assert!(matches!(err, DocumentError::EmptyDocument { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_render_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(Pages { pages: 4, fail_at: Some(3) }, Counting::ok(), 2);

        let err = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap_err();
        assert!(matches!(err, DocumentError::RasterisationFailed { page: 3, .. }));
        assert_eq!(jpg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn assemble_removes_its_working_directory() {
        let parent = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .batch_size(3)
            .work_dir(parent.path())
            .build()
            .unwrap();
        let a = DocumentAssembler::new(
            Arc::new(Pages { pages: 3, fail_at: None }),
            Counting::ok(),
            config,
        );

        a.assemble(Path::new("x.pdf")).await.unwrap();
        assert!(std::fs::read_dir(parent.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn verify_checks_first_page_of_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .batch_size(2)
            .max_retries(0)
            .verify(true)
            .build()
            .unwrap();
        let svc = Counting::ok();
        let a = DocumentAssembler::new(Arc::new(Pages { pages: 5, fail_at: None }), svc.clone(), config);

        let doc = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap();

        let checked: Vec<(usize, usize)> = doc.verifications.iter().map(|v| (v.page, v.batch)).collect();
        assert_eq!(checked, vec![(1, 1), (3, 2), (5, 3)]);
        assert!(doc.verifications[0].is_clean());
        assert_eq!(doc.verifications[1].findings, "Footer missing.");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
        assert_eq!(doc.input_tokens, 33);
        assert!(!doc.text.contains("Footer"));
        assert_eq!(jpg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn verify_off_sends_no_checks() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(Pages { pages: 3, fail_at: None }, Counting::ok(), 2);

        let doc = a.assemble_in(Path::new("x.pdf"), dir.path()).await.unwrap();
        assert!(doc.verifications.is_empty());
        assert_eq!(doc.input_tokens, 20);
    }
}
