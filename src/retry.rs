// Retry policy shared by every outbound call
//
// Throttled (429) and upstream-unavailable (502) answers are retried with a
// linearly growing delay. Each attempt is a fresh request, so the per-request
// timeout starts over on every retry.

use crate::error::HttpError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Status codes that trigger another attempt.
    pub retry_statuses: Vec<u16>,
    /// Delay before retry `n` is `backoff_step * n`.
    pub backoff_step: Duration,
    /// Hard ceiling on status-triggered retries.
    pub max_retries: u32,
    /// Transport failures are retried this many times before surfacing.
    pub max_transport_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_statuses: vec![429, 502],
            backoff_step: Duration::from_secs(2),
            max_retries: 1000,
            max_transport_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Anything carrying an HTTP status that the retry loop can inspect.
pub trait HasStatus {
    fn status(&self) -> u16;
}

/// Run `attempt` until it yields a non-retryable outcome.
///
/// Responses with a retryable status are retried up to `max_retries`; after
/// that the last response is returned as-is so callers still see the status.
/// Transport errors are retried up to `max_transport_retries` and then
/// propagated. Every other error propagates immediately.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut attempt: F,
) -> Result<T, HttpError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
{
    let mut status_retries = 0u32;
    let mut transport_retries = 0u32;

    loop {
        match attempt().await {
            Ok(response)
                if policy.should_retry_status(response.status())
                    && status_retries < policy.max_retries =>
            {
                status_retries += 1;
                let delay = policy.delay_for(status_retries);
                tracing::debug!(
                    request = label,
                    status = response.status(),
                    attempt = status_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying throttled request"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(err) if err.is_transport() && transport_retries < policy.max_transport_retries => {
                transport_retries += 1;
                let delay = policy.delay_for(transport_retries);
                tracing::debug!(
                    request = label,
                    attempt = transport_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transport failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
