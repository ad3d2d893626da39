//! OCR client: transcribe one batch of page images via the model.
//!
//! This module turns a batch of page images into one transcription request.
//! Prompt text lives in [`crate::prompts`]; retry and timeout handling live in
//! [`crate::pipeline::llm`].
//!
//! ## Message Layout
//!
//! 1. **System message** — [`TRANSCRIPTION_RULES`]
//! 2. **User message** — the task instruction followed by the page images in
//!    page order, so the model's text follows the input order

use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::pipeline::{encode, llm};
use crate::pipeline::render::PageImage;
use crate::prompts::TRANSCRIPTION_RULES;
use crate::service::{InferenceRequest, InferenceService};
use std::sync::Arc;
use tracing::warn;

/// Text produced for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Sends batches of page images to the inference service.
#[derive(Clone)]
pub struct OcrClient {
    service: Arc<dyn InferenceService>,
    config: PipelineConfig,
}

impl OcrClient {
    pub fn new(service: Arc<dyn InferenceService>, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    /// Transcribe `images` (in order) following `instruction`.
    ///
    /// Images that fail to decode are skipped with a warning. If none of
    /// them decodes, returns empty text without calling the service.
    ///
    /// `label` identifies the batch in log lines.
    pub async fn transcribe(
        &self,
        images: &[PageImage],
        instruction: &str,
        label: &str,
    ) -> Result<Transcription, InferenceError> {
        let pages = images.to_vec();
        let encoded = tokio::task::spawn_blocking(move || encode::encode_batch(&pages))
            .await
            .map_err(|e| InferenceError::Service {
                detail: format!("image encoding task panicked: {e}"),
            })?;

        if encoded.is_empty() {
            warn!(
                "{}: none of the {} page image(s) could be decoded; returning empty text",
                label,
                images.len()
            );
            return Ok(Transcription::default());
        }

        let request = InferenceRequest {
            system: TRANSCRIPTION_RULES.to_string(),
            prompt: instruction.to_string(),
            images: encoded,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = llm::call_model(self.service.as_ref(), &request, &self.config, label).await?;

        Ok(Transcription {
            text: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}
