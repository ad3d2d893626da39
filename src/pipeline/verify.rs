//! Page verification: ask the model whether a transcription matches its page.
//!
//! One request per checked page: [`VERIFY_PROMPT`] as the system message,
//! the extracted text plus the page image as the user message. The model's
//! answer is kept verbatim; a reply of [`VERIFY_CLEAN_REPLY`] marks the page
//! clean.

use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::pipeline::render::PageImage;
use crate::pipeline::{encode, llm};
use crate::prompts::{VERIFY_CLEAN_REPLY, VERIFY_PROMPT};
use crate::service::{InferenceRequest, InferenceService};
use std::sync::Arc;

/// Model findings for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVerification {
    /// 1-based page number.
    pub page: usize,
    /// 1-based batch the page belongs to.
    pub batch: usize,
    /// The model's summary, trimmed.
    pub findings: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl PageVerification {
    /// True when the model reported no discrepancies.
    pub fn is_clean(&self) -> bool {
        self.findings
            .trim_end_matches('.')
            .eq_ignore_ascii_case(VERIFY_CLEAN_REPLY.trim_end_matches('.'))
    }
}

/// Sends verification requests to the inference service.
#[derive(Clone)]
pub struct Verifier {
    service: Arc<dyn InferenceService>,
    config: PipelineConfig,
}

impl Verifier {
    pub fn new(service: Arc<dyn InferenceService>, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    /// Compare `page` against `text`, the transcription of its batch.
    pub async fn verify_page(
        &self,
        page: &PageImage,
        batch: usize,
        text: &str,
        label: &str,
    ) -> Result<PageVerification, InferenceError> {
        let owned = page.clone();
        let image = tokio::task::spawn_blocking(move || encode::encode_page(&owned))
            .await
            .map_err(|e| InferenceError::Service {
                detail: format!("image encoding task panicked: {e}"),
            })?
            .map_err(|e| InferenceError::Service {
                detail: format!("cannot encode page {} for verification: {e}", page.index),
            })?;

        let request = InferenceRequest {
            system: VERIFY_PROMPT.to_string(),
            prompt: format!("Extracted text to verify:\n---\n{text}\n---"),
            images: vec![image],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = llm::call_model(self.service.as_ref(), &request, &self.config, label).await?;

        Ok(PageVerification {
            page: page.index,
            batch,
            findings: response.text.trim().to_string(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}

/// Render findings as the `<stem>.verify.txt` report body.
pub fn render_report(source: &str, pages: &[PageVerification]) -> String {
    let flagged = pages.iter().filter(|p| !p.is_clean()).count();
    let mut out = format!(
        "Verification of {source}: {} page(s) checked, {flagged} with findings\n",
        pages.len()
    );
    for p in pages {
        out.push_str(&format!("\n== Page {} (batch {}) ==\n{}\n", p.page, p.batch, p.findings));
    }
    out
}
