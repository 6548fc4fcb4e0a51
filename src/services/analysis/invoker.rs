// Model Invoker
// Single analysis call against the model capability, with bounded retry
// and exponential backoff for transient failures

use crate::services::config_store::EngineConfig;
use crate::services::providers::{ProviderClient, ProviderError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("model call timed out")]
    Timeout,
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model protocol error: {0}")]
    Protocol(String),
    #[error("model request failed ({status:?}): {message}")]
    Fatal {
        status: Option<u16>,
        message: String,
    },
}

impl InvokeError {
    /// Transient failures are retried with backoff; fatal ones surface
    /// immediately.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Fatal { .. })
    }

    /// Upstream HTTP status for fatal API rejections, when known.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Fatal { status, .. } => *status,
            _ => None,
        }
    }
}

/// Classify a transport error into the retry taxonomy.
fn classify(err: ProviderError) -> InvokeError {
    match err {
        ProviderError::HttpError(e) if e.is_timeout() => InvokeError::Timeout,
        // Connection resets and similar transport hiccups are worth a retry
        ProviderError::HttpError(e) => InvokeError::Protocol(e.to_string()),
        ProviderError::ApiError { status: 429, message } => InvokeError::RateLimited(message),
        ProviderError::ApiError { status, message } if status >= 500 => {
            InvokeError::Protocol(format!("upstream {}: {}", status, message))
        }
        ProviderError::ApiError { status, message } => InvokeError::Fatal {
            status: Some(status),
            message,
        },
        ProviderError::MissingContent => InvokeError::Protocol("empty completion".to_string()),
        ProviderError::JsonError(msg) => InvokeError::Protocol(msg),
        ProviderError::MissingApiKey => InvokeError::Fatal {
            status: None,
            message: "API key not configured".to_string(),
        },
    }
}

/// Backoff before the next attempt, as a pure function of the attempt
/// count: `min(cap, base * 2^(attempt-1))`.
pub fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(cap_ms))
}

/// Issues analysis calls with per-attempt timeout and retry.
pub struct ModelInvoker {
    client: ProviderClient,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
    attempt_timeout: Duration,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl ModelInvoker {
    pub fn new(config: &EngineConfig, api_key: String) -> Self {
        Self {
            // The reqwest-level timeout sits above the attempt timeout so
            // tokio::time::timeout decides first
            client: ProviderClient::new(config.model_timeout_secs + 5),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            attempt_timeout: Duration::from_secs(config.model_timeout_secs),
            max_attempts: config.retry_max_attempts.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// One logical analysis call: returns the raw JSON document text, or
    /// the terminal error after the retry budget is spent. No degraded
    /// substitute is ever fabricated.
    pub async fn analyze(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, InvokeError> {
        let mut last_err = InvokeError::Protocol("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            let call = self.client.call_chat(
                model,
                &self.api_key,
                system_prompt,
                user_prompt,
                self.max_tokens,
                self.temperature,
                true,
            );

            match tokio::time::timeout(self.attempt_timeout, call).await {
                Ok(Ok(chat)) => {
                    debug!(
                        "[INVOKER] ok model={} attempt={} latency_ms={}",
                        model, attempt, chat.latency_ms
                    );
                    return Ok(chat.content);
                }
                Ok(Err(e)) => {
                    let err = classify(e);
                    if !err.is_transient() {
                        warn!(
                            "[INVOKER] fatal model={} attempt={} : {}",
                            model, attempt, err
                        );
                        return Err(err);
                    }
                    warn!(
                        "[INVOKER] transient model={} attempt={} : {}",
                        model, attempt, err
                    );
                    last_err = err;
                }
                Err(_) => {
                    warn!(
                        "[INVOKER] timeout model={} attempt={} ({}s)",
                        model,
                        attempt,
                        self.attempt_timeout.as_secs()
                    );
                    last_err = InvokeError::Timeout;
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms))
                    .await;
            }
        }

        Err(last_err)
    }

    /// Minimal call to verify the model capability is reachable.
    pub async fn health_check(&self, model: &str) -> bool {
        let result = tokio::time::timeout(
            self.attempt_timeout,
            self.client
                .call_chat(model, &self.api_key, "", "test", 5, 0.0, false),
        )
        .await;
        matches!(result, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(1, 500, 10_000), Duration::from_millis(500));
        assert_eq!(backoff_delay(2, 500, 10_000), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3, 500, 10_000), Duration::from_millis(2000));
        assert_eq!(backoff_delay(5, 500, 10_000), Duration::from_millis(8000));
        // Capped at the maximum
        assert_eq!(backoff_delay(6, 500, 10_000), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(40, 500, 10_000), Duration::from_millis(10_000));
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify(ProviderError::ApiError {
            status: 429,
            message: "slow down".to_string(),
        });
        assert!(matches!(err, InvokeError::RateLimited(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = classify(ProviderError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        });
        assert!(matches!(err, InvokeError::Protocol(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_errors_are_fatal() {
        let err = classify(ProviderError::ApiError {
            status: 400,
            message: "bad request".to_string(),
        });
        assert!(!err.is_transient());
        assert_eq!(err.upstream_status(), Some(400));
    }

    #[test]
    fn test_empty_completion_is_transient() {
        let err = classify(ProviderError::MissingContent);
        assert!(matches!(err, InvokeError::Protocol(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let err = classify(ProviderError::MissingApiKey);
        assert!(!err.is_transient());
        assert_eq!(err.upstream_status(), None);
    }
}
