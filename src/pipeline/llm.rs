//! Model calls with timeout and retry.
//!
//! Both the OCR client and the harmoniser go through [`call_model`], which
//! bounds every attempt with `api_timeout_secs` and retries transient
//! failures.
//!
//! ## Retry Strategy
//!
//! HTTP 5xx errors and timeouts are usually transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s. A single wait never exceeds [`MAX_BACKOFF_MS`].
//! Content rejections and authentication errors are
//! returned immediately: a refusal is a property of the content, and a bad
//! key will not fix itself.

use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::service::{InferenceRequest, InferenceResponse, InferenceService};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Upper bound on one retry wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Wait before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// capped at [`MAX_BACKOFF_MS`].
pub fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Send `request` to `service`, retrying transient failures.
///
/// `label` identifies the call in log lines (e.g. `"report.pdf batch 2"`).
pub async fn call_model(
    service: &dyn InferenceService,
    request: &InferenceRequest,
    config: &PipelineConfig,
    label: &str,
) -> Result<InferenceResponse, InferenceError> {
    let start = Instant::now();
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<InferenceError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let outcome = match timeout(limit, service.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(response) => {
                debug!(
                    "{}: {} chars from {} in {:?} ({} in / {} out tokens)",
                    label,
                    response.text.len(),
                    service.name(),
                    start.elapsed(),
                    response.input_tokens,
                    response.output_tokens
                );
                return Ok(response);
            }
            Err(e) if e.is_retryable() => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| InferenceError::Service {
        detail: "Unknown error".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<InferenceResponse, InferenceError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<InferenceResponse, InferenceError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceService for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().pop().unwrap_or_else(|| {
                Err(InferenceError::Service {
                    detail: "script exhausted".into(),
                })
            })
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest {
            system: "rules".into(),
            prompt: "task".into(),
            images: Vec::new(),
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    fn config(max_retries: u32) -> PipelineConfig {
        PipelineConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(0)
            .build()
            .unwrap()
    }

    fn ok(text: &str) -> Result<InferenceResponse, InferenceError> {
        Ok(InferenceResponse {
            text: text.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let svc = Scripted::new(vec![
            Err(InferenceError::Service { detail: "503".into() }),
            ok("text"),
        ]);
        let resp = call_model(&svc, &request(), &config(3), "t").await.unwrap();
        assert_eq!(resp.text, "text");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let svc = Scripted::new(vec![
            Err(InferenceError::ContentRejected { reason: "SAFETY".into() }),
            ok("never"),
        ]);
        let err = call_model(&svc, &request(), &config(3), "t").await.unwrap_err();
        assert!(matches!(err, InferenceError::ContentRejected { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let svc = Scripted::new(Vec::new());
        let err = call_model(&svc, &request(), &config(2), "t").await.unwrap_err();
        assert!(matches!(err, InferenceError::Service { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
    }

    struct Slow;

    #[async_trait]
    impl InferenceService for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            sleep(Duration::from_secs(3600)).await;
            ok("late")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let cfg = PipelineConfig::builder()
            .max_retries(0)
            .api_timeout_secs(5)
            .build()
            .unwrap();
        let err = call_model(&Slow, &request(), &cfg, "t").await.unwrap_err();
        assert_eq!(err, InferenceError::Timeout { secs: 5 });
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1_000);
        assert_eq!(backoff_ms(500, 3), 2_000);
        assert_eq!(backoff_ms(500, 8), MAX_BACKOFF_MS);
    }

    #[test]
    fn backoff_never_overflows() {
        assert_eq!(backoff_ms(500, 65), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, u32::MAX), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(0, 200), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn many_retries_do_not_panic() {
        let cfg = PipelineConfig::builder()
            .max_retries(70)
            .retry_backoff_ms(500)
            .build()
            .unwrap();
        let svc = Scripted::new(Vec::new());
        let err = call_model(&svc, &request(), &cfg, "t").await.unwrap_err();
        assert!(matches!(err, InferenceError::Service { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 71);
    }
}
