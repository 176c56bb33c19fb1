use std::time::Duration;

use anyhow::Result;
use tracing::{error, warn};

/// Error keywords that justify a retry before cascading tiers.
const RETRYABLE_ERROR_KEYWORDS: &[&str] = &[
    "connection",
    "timeout",
    "network",
    "rate",
    "server",
    "unavailable",
    "quota",
    "503",
    "502",
    "429",
];

/// Centralized retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    max_retries: u32,
    base_delay: Duration,
    backoff_factor: u32,
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2,
        }
    }
}

impl RetryHandler {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_factor: u32) -> Self {
        Self { max_retries, base_delay, backoff_factor }
    }

    /// Whether the error looks transient.
    pub fn is_retryable(error: &anyhow::Error) -> bool {
        let message = error.to_string().to_lowercase();
        RETRYABLE_ERROR_KEYWORDS.iter().any(|kw| message.contains(kw))
    }

    /// Run `operation` until success, a fatal error, or retries exhausted.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        operation_name: &str,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = Self::is_retryable(&err);
                    if !retryable || attempt + 1 >= self.max_retries {
                        error!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = self.max_retries,
                            "failed: {err}"
                        );
                        return Err(err);
                    }
                    let delay = self.base_delay * self.backoff_factor.pow(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "failed, retrying in {delay:?}: {err}"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{operation_name} exhausted retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retryable_classification() {
        assert!(RetryHandler::is_retryable(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(RetryHandler::is_retryable(&anyhow::anyhow!("connection reset by peer")));
        assert!(RetryHandler::is_retryable(&anyhow::anyhow!("quota exceeded for model")));
        assert!(!RetryHandler::is_retryable(&anyhow::anyhow!("invalid api key")));
        assert!(!RetryHandler::is_retryable(&anyhow::anyhow!("malformed request body")));
    }

    #[tokio::test]
    async fn fatal_errors_abort_immediately() {
        let handler = RetryHandler::new(3, Duration::from_millis(1), 2);
        let calls = AtomicU32::new(0);
        let result: Result<()> = handler
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(anyhow::anyhow!("invalid api key")) }
                },
                "test",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let handler = RetryHandler::new(3, Duration::from_millis(1), 2);
        let calls = AtomicU32::new(0);
        let result = handler
            .execute_with_retry(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(anyhow::anyhow!("503 service unavailable"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                "test",
            )
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
