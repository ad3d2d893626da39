//! The remote inference seam.
//!
//! The OCR client and the harmoniser never talk to a provider directly; they
//! go through [`InferenceService`], constructed once per run and injected
//! into the pipeline. [`ProviderService`] is the production implementation,
//! backed by any `edgequake_llm` provider. Tests substitute a scripted
//! implementation.
//!
//! The one job the adapter has beyond message plumbing is classification:
//! a response with no usable text, or a content-filter error from the
//! provider, must surface as [`InferenceError::ContentRejected`] and never as
//! empty-but-successful output.

use crate::error::InferenceError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// One request to the remote model.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// System message (transcription rules or harmonisation prompt).
    pub system: String,
    /// User message text (task instruction or the text to harmonise).
    pub prompt: String,
    /// Page images attached to the user message, in page order.
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Text produced by the remote model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A remote multimodal text-generation service.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Generate text for `request`.
    ///
    /// Implementations must return `ContentRejected` rather than an empty
    /// response when the model produced no usable text.
    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError>;
}

/// [`InferenceService`] backed by an `edgequake_llm` provider.
pub struct ProviderService {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl ProviderService {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl InferenceService for ProviderService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.prompt.as_str(),
                request.images.clone(),
            ));
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(InferenceError::ContentRejected {
                reason: "model returned no text".to_string(),
            });
        }

        Ok(InferenceResponse {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Map a provider error message onto the [`InferenceError`] taxonomy.
///
/// edgequake-llm reports content-filter guardrails, auth failures and
/// timeouts as differently-worded `LlmError`s; the wording is the only
/// stable signal across providers.
pub fn classify_provider_error(message: &str) -> InferenceError {
    let lower = message.to_lowercase();

    // Lowercase phrases providers use for filtered completions.
    const REJECTION_PHRASES: &[&str] = &["content_filter", "content filter", "content management policy"];
    // Finish/block reason enum values, matched case-sensitively so ordinary
    // words like "blocked" or "safety" in transport errors do not count.
    const REJECTION_REASONS: &[&str] = &[
        "SAFETY",
        "RECITATION",
        "PROHIBITED_CONTENT",
        "BLOCKLIST",
        "SPII",
        "IMAGE_SAFETY",
    ];
    const AUTH_MARKERS: &[&str] = &[
        "401",
        "403",
        "unauthorized",
        "unauthorised",
        "invalid api key",
        "api key not valid",
        "authentication",
        "permission denied",
    ];

    let rejected = REJECTION_PHRASES.iter().any(|m| lower.contains(m))
        || REJECTION_REASONS.iter().any(|r| contains_token(message, r));

    if rejected {
        InferenceError::ContentRejected {
            reason: message.to_string(),
        }
    } else if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        InferenceError::Auth {
            detail: message.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        InferenceError::Service {
            detail: format!("provider timeout: {message}"),
        }
    } else {
        InferenceError::Service {
            detail: message.to_string(),
        }
    }
}

/// `token` appears in `message` with no identifier character on either side.
fn contains_token(message: &str, token: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    message.match_indices(token).any(|(at, _)| {
        let before = message[..at].chars().next_back();
        let after = message[at + token.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}
