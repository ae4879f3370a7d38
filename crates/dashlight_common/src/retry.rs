//! Timeout and bounded retry around one completion call.

use crate::config::{LlmConfig, RetryConfig};
use crate::llm_client::{CompletionClient, CompletionError};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
    pub jitter: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &LlmConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, llm: &LlmConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            backoff: retry.backoff_ms.iter().copied().map(Duration::from_millis).collect(),
            jitter: Duration::from_millis(retry.jitter_ms),
            timeout: Duration::from_secs(llm.timeout_secs),
        }
    }

    /// Same attempts and timeout, no sleeping between them.
    pub fn immediate(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Vec::new(),
            jitter: Duration::ZERO,
            timeout,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let base = self
            .backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Run `client.generate` under the policy. Non-retryable errors return at
/// once; retryable ones are retried until attempts run out.
pub async fn generate_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, CompletionError> {
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, client.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(policy.timeout.as_millis() as u64)),
        };
        match result {
            Ok(text) => {
                debug!(attempt, "Completion succeeded");
                return Ok(text);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "Completion failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(attempt, error = %err, "Completion failed");
                return Err(err);
            }
        }
    }
}
