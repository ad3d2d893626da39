//! Harmonisation: turn marker-joined batch text into one coherent document.
//!
//! Batch-wise OCR leaves seams: a paragraph cut mid-sentence, a table whose
//! header row sits in one batch and whose body sits in the next. The
//! harmoniser sends the whole assembled text back to the model with
//! [`HARMONIZE_PROMPT`] and returns the model's merged version.
//!
//! There is no fallback: if harmonisation was requested and fails, the
//! document fails and no output is written.

use crate::config::PipelineConfig;
use crate::error::{DocumentError, Stage};
use crate::pipeline::llm;
use crate::prompts::HARMONIZE_PROMPT;
use crate::service::{InferenceRequest, InferenceService};
use std::sync::Arc;
use tracing::info;

/// Result of a harmonisation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harmonized {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Sends assembled text through the harmonisation prompt.
#[derive(Clone)]
pub struct Harmonizer {
    service: Arc<dyn InferenceService>,
    config: PipelineConfig,
}

impl Harmonizer {
    pub fn new(service: Arc<dyn InferenceService>, config: PipelineConfig) -> Self {
        Self { service, config }
    }

    /// Remove boundary markers and stitch content across them.
    ///
    /// `label` identifies the document in log lines.
    pub async fn harmonize(&self, raw_text: &str, label: &str) -> Result<Harmonized, DocumentError> {
        info!("{}: harmonising {} chars", label, raw_text.len());

        let request = InferenceRequest {
            system: HARMONIZE_PROMPT.to_string(),
            prompt: raw_text.to_string(),
            images: Vec::new(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let call_label = format!("{label} harmonization");
        let response = llm::call_model(self.service.as_ref(), &request, &self.config, &call_label)
            .await
            .map_err(|e| DocumentError::from_inference(Stage::Harmonize, e))?;

        Ok(Harmonized {
            text: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}
