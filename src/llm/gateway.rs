//! The gateway itself: backend-agnostic retry/backoff/fallback policy on top
//! of whatever [`LlmBackend`]s it is constructed with.

use crate::error::LlmError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A single failure mode a concrete backend can report, distinct enough for
/// the gateway's retry policy to act on: rotate keys, back off, or give up.
#[derive(Debug, Clone)]
pub enum BackendError {
    RateLimited,
    ServerError(String),
    Malformed(String),
    Network(String),
}

/// One concrete way of talking to an LLM provider (REST completion endpoint,
/// hosted Vertex-style endpoint, ...). Backends own their own key rotation.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, request: &GenerationRequest) -> Result<String, BackendError>;
    /// Advance to the next configured API key, if more than one is held.
    /// Returns `false` when there is nothing left to rotate to.
    fn rotate_key(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub requests: AtomicU64,
    pub retries: AtomicU64,
    pub backend_failovers: AtomicU64,
}

impl GatewayMetrics {
    fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;
}

/// Tries each backend in order, retrying a transient failure on the same
/// backend up to `max_attempts_per_backend` times with exponential backoff,
/// rotating API keys on rate limiting before counting it as an attempt.
pub struct FallbackGateway {
    backends: Vec<std::sync::Arc<dyn LlmBackend>>,
    max_attempts_per_backend: u32,
    base_backoff: Duration,
    metrics: GatewayMetrics,
}

impl FallbackGateway {
    pub fn new(backends: Vec<std::sync::Arc<dyn LlmBackend>>) -> Self {
        Self {
            backends,
            max_attempts_per_backend: 3,
            base_backoff: Duration::from_millis(500),
            metrics: GatewayMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}

#[async_trait]
impl LlmGateway for FallbackGateway {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);
        let mut last_error = String::new();

        for (idx, backend) in self.backends.iter().enumerate() {
            if idx > 0 {
                self.metrics.backend_failovers.fetch_add(1, Ordering::Relaxed);
            }
            for attempt in 1..=self.max_attempts_per_backend {
                match backend.complete(&request).await {
                    Ok(text) => return Ok(text),
                    Err(BackendError::Malformed(msg)) => {
                        return Err(LlmError::MalformedResponse(msg));
                    }
                    Err(BackendError::RateLimited) => {
                        warn!(backend = backend.name(), "rate limited, rotating key");
                        if !backend.rotate_key() {
                            last_error = format!("{}: rate limit exhausted", backend.name());
                            break;
                        }
                        self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(BackendError::ServerError(msg)) => {
                        last_error = format!("{}: {}", backend.name(), msg);
                        if attempt < self.max_attempts_per_backend {
                            let backoff = self.base_backoff * 2u32.pow(attempt - 1);
                            debug!(backend = backend.name(), attempt, ?backoff, "backing off after server error");
                            tokio::time::sleep(backoff).await;
                            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(BackendError::Network(msg)) => {
                        last_error = format!("{}: {}", backend.name(), msg);
                        if attempt < self.max_attempts_per_backend {
                            tokio::time::sleep(self.base_backoff).await;
                            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }

        if last_error.contains("rate limit exhausted")
            && self.backends.len() == 1
        {
            return Err(LlmError::RateLimitExhausted);
        }
        Err(LlmError::AllBackendsFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    struct FlakyBackend {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn complete(&self, _request: &GenerationRequest) -> Result<String, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                Err(BackendError::ServerError("503".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    struct AlwaysMalformed;

    #[async_trait]
    impl LlmBackend for AlwaysMalformed {
        fn name(&self) -> &'static str {
            "malformed"
        }
        async fn complete(&self, _request: &GenerationRequest) -> Result<String, BackendError> {
            Err(BackendError::Malformed("not json".to_string()))
        }
    }

    #[tokio::test]
    async fn retries_transient_server_errors_then_succeeds() {
        let backend = Arc::new(FlakyBackend {
            fail_times: 2,
            calls: AtomicU32::new(0),
        });
        let gateway = FallbackGateway::new(vec![backend]);
        let result = gateway.generate(GenerationRequest::new("hi")).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn malformed_response_is_terminal_not_retried() {
        let gateway = FallbackGateway::new(vec![Arc::new(AlwaysMalformed)]);
        let result = gateway.generate(GenerationRequest::new("hi")).await;
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn falls_over_to_second_backend_when_first_exhausts() {
        let failing = Arc::new(FlakyBackend {
            fail_times: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let succeeding = Arc::new(FlakyBackend {
            fail_times: 0,
            calls: AtomicU32::new(0),
        });
        let gateway = FallbackGateway::new(vec![failing, succeeding]);
        let result = gateway.generate(GenerationRequest::new("hi")).await;
        assert_eq!(result.unwrap(), "ok");
    }
}
