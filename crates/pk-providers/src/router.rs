//! `RetryingProvider` — an optional, caller-composed decorator that
//! retries a wrapped [`Provider`]'s `complete`/`complete_stream` on
//! classified-retryable errors with exponential backoff.
//!
//! §4.5 is explicit that the provider stage itself never retries
//! internally; this decorator is how a caller opts into retry without
//! that behavior leaking into `ProviderStage`'s mandatory contract. It is
//! the retry-on-transient-failure half of the teacher's `LlmRouter`,
//! stripped of the role-based fallback-model selection half (which has
//! no counterpart in the spec's single-Provider-contract model).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pk_domain::{BoxStream, Chunk, Error, LlmCapabilities, Result};

use crate::traits::{ChatRequest, ChatResponse, Provider};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.policy.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..self.policy.max_attempts {
            match self.inner.complete(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(provider = %self.inner.name(), attempt, error = %err, "retrying provider call");
                    last_err = Some(err);
                    tokio::time::sleep(self.backoff_for_attempt(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::RuntimeInternal("retry loop exited without attempting a call".into())
        }))
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, Chunk>> {
        // Streaming retries would require re-establishing an in-flight
        // connection mid-stream; the contract here only retries the
        // initial handshake, matching the teacher's non-streaming-only
        // fallback path in `LlmRouter::chat_for_role`.
        let mut last_err: Option<Error> = None;
        for attempt in 0..self.policy.max_attempts {
            match self.inner.complete_stream(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(provider = %self.inner.name(), attempt, error = %err, "retrying provider stream call");
                    last_err = Some(err);
                    tokio::time::sleep(self.backoff_for_attempt(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::RuntimeInternal("retry loop exited without attempting a call".into())
        }))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn capabilities(&self) -> &LlmCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyOnceProvider {
        inner: MockProvider,
        failed_once: AtomicUsize,
    }

    #[async_trait]
    impl Provider for FlakyOnceProvider {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
            if self.failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::ProviderRetryable {
                    provider: "flaky".into(),
                    message: "429".into(),
                });
            }
            self.inner.complete(request).await
        }

        async fn complete_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, Chunk>> {
            self.inner.complete_stream(request).await
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn capabilities(&self) -> &LlmCapabilities {
            self.inner.capabilities()
        }
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let flaky = Arc::new(FlakyOnceProvider {
            inner: MockProvider::fixed("mock", "hello"),
            failed_once: AtomicUsize::new(0),
        });
        let retrying = RetryingProvider::new(
            flaky,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        );
        let resp = retrying.complete(ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "hello");
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        struct AlwaysFatal;
        #[async_trait]
        impl Provider for AlwaysFatal {
            async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
                Err(Error::InvalidRequest("bad request".into()))
            }
            async fn complete_stream(&self, _request: ChatRequest) -> Result<BoxStream<'static, Chunk>> {
                Err(Error::InvalidRequest("bad request".into()))
            }
            fn name(&self) -> &str {
                "fatal"
            }
            fn capabilities(&self) -> &LlmCapabilities {
                static CAPS: std::sync::OnceLock<LlmCapabilities> = std::sync::OnceLock::new();
                CAPS.get_or_init(LlmCapabilities::default)
            }
        }

        let retrying = RetryingProvider::new(Arc::new(AlwaysFatal), RetryPolicy::default());
        let err = retrying.complete(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
