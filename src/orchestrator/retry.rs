//! Retry with exponential backoff around whole dispatcher calls.

use std::future::Future;
use std::time::Duration;

use crate::config::OrchestrationSettings;
use crate::dispatcher::ToolResult;

/// Retry policy: `max_retries` extra attempts, delay `base × 2^n` before retry n+1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&OrchestrationSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &OrchestrationSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.retry_base_delay(),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run `attempt` until it succeeds, fails non-retriably, or the budget is
    /// spent. The returned result carries the attempt count.
    pub async fn run<F, Fut>(&self, tool_id: &str, mut attempt: F) -> ToolResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ToolResult>,
    {
        let mut attempts = 0u32;
        loop {
            let mut result = attempt().await;
            attempts += 1;
            result.attempts = attempts;

            if result.success || !result.retriable || attempts > self.max_retries {
                return result;
            }

            let delay = self.delay_for(attempts - 1);
            tracing::warn!(
                tool = tool_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %result.error_message(),
                "tool failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
