//! Model backends.
//!
//! Every provider implements [`Backend`]; the orchestrator only ever sees
//! `Arc<dyn Backend>`. Provider failures never escape `generate`, they come
//! back as a [`GenerationResult`] with `error` set.
//!
//! Use [`build_backend`] to construct the variant named by a model config.

pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::config::{ModelConfig, Provider};
use crate::models::{GenerationOptions, GenerationResult};
use crate::pricing::ModelPrice;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Uniform "generate text" capability implemented by every model backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identifier used in results, the ledger and pricing lookups
    fn model_name(&self) -> &str;

    /// Run one generation. Never fails; errors are reported in the result.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult;
}

/// Failure inside a backend call, flattened into `GenerationResult::error`
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Environment variable {0} not found")]
    MissingApiKey(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Connection(_) | BackendError::Timeout(_) | BackendError::RateLimited => true,
            BackendError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            BackendError::RateLimited
        } else {
            BackendError::Http {
                status: status.as_u16(),
                body,
            }
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout.as_secs())
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

/// Text and token usage of a successful call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Transport settings shared by every backend
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential backoff for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

/// Execute an async operation, retrying transient errors with backoff
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Minimum spacing between requests to one backend
#[derive(Debug)]
pub struct RateLimiter {
    rate_limit_rps: f64,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(rate_limit_rps: f64) -> Self {
        Self {
            rate_limit_rps,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed. Non-positive rates disable limiting.
    pub async fn acquire(&self) {
        if self.rate_limit_rps <= 0.0 {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / self.rate_limit_rps);
        let mut last_request = self.last_request.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

/// Time a provider call and fold its outcome into a `GenerationResult`
pub(crate) async fn run_timed<Fut>(model: &str, price: ModelPrice, call: Fut) -> GenerationResult
where
    Fut: Future<Output = Result<Completion, BackendError>>,
{
    let start = Instant::now();
    let outcome = call.await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(completion) => GenerationResult {
            cost_usd: price.cost(completion.input_tokens, completion.output_tokens),
            content: completion.content,
            model_identifier: model.to_string(),
            input_token_count: completion.input_tokens,
            output_token_count: completion.output_tokens,
            latency_ms,
            resource_memory_mb: 0.0,
            error: None,
        },
        Err(err) => GenerationResult::failure(model, err.to_string(), latency_ms),
    }
}

/// Construct the backend variant a model config asks for
pub fn build_backend(model: &ModelConfig, settings: &BackendSettings, price: ModelPrice) -> Arc<dyn Backend> {
    match model.provider {
        Provider::OpenAi => Arc::new(OpenAiBackend::new(model, settings, price)),
        Provider::Gemini => Arc::new(GeminiBackend::new(model, settings, price)),
        Provider::Ollama => Arc::new(OllamaBackend::new(model, settings, price)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        for rps in [0.0, -1.0] {
            let limiter = RateLimiter::new(rps);
            let start = Instant::now();
            limiter.acquire().await;
            limiter.acquire().await;
            assert!(start.elapsed() < Duration::from_millis(10)); // Should return immediately
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_first_request() {
        let limiter = RateLimiter::new(10.0);
        let start = Instant::now();

        limiter.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(10)); // Should not sleep on first request
        assert!(limiter.last_request.lock().await.is_some());
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(100.0);
        limiter.acquire().await;
        let start = Instant::now();

        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(8)); // ~10ms minus some tolerance
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick_policy(2), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BackendError::Connection("reset".to_string()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&quick_policy(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::RateLimited)
        })
        .await;

        assert!(matches!(result, Err(BackendError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&quick_policy(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Http {
                status: 401,
                body: "unauthorized".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Timeout(30).is_retryable());
        assert!(BackendError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!BackendError::MissingApiKey("KEY".to_string()).is_retryable());
        assert!(!BackendError::MalformedResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = quick_policy(10);
        assert_eq!(policy.backoff(0), Duration::from_millis(1));
        assert_eq!(policy.backoff(1), Duration::from_millis(2));
        assert_eq!(policy.backoff(5), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_run_timed_success_prices_tokens() {
        let price = ModelPrice { input: 0.15, output: 0.60 };
        let result = run_timed("gpt-4o-mini", price, async {
            Ok(Completion {
                content: "{}".to_string(),
                input_tokens: 1_000_000,
                output_tokens: 1_000_000,
            })
        })
        .await;

        assert!(result.error.is_none());
        assert!((result.cost_usd - 0.75).abs() < 1e-9);
        assert!(result.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_run_timed_failure_is_captured() {
        let result = run_timed("gpt-4o-mini", ModelPrice::default(), async {
            Err(BackendError::MissingApiKey("OPENAI_API_KEY".to_string()))
        })
        .await;

        assert!(result.content.is_empty());
        assert_eq!(result.cost_usd, 0.0);
        assert!(result.error.unwrap().contains("not found"));
    }
}
