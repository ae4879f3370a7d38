//! Tests for retry.rs

use async_trait::async_trait;
use dashlight_common::{generate_with_retry, CompletionClient, CompletionError, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Hangs on the first call, answers on the next.
struct SlowFirst {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionClient for SlowFirst {
    async fn generate(&self, _prompt: &str) -> Result<String, CompletionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok("{\"ok\":true}".to_string())
    }
}

#[tokio::test]
async fn test_timeout_counts_as_retryable_attempt() {
    let client = SlowFirst {
        calls: AtomicUsize::new(0),
    };
    let policy = RetryPolicy::immediate(3, Duration::from_millis(50));
    let text = generate_with_retry(&client, "p", &policy).await.unwrap();
    assert_eq!(text, "{\"ok\":true}");
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_single_attempt_timeout() {
    let client = SlowFirst {
        calls: AtomicUsize::new(0),
    };
    let policy = RetryPolicy::immediate(1, Duration::from_millis(20));
    assert_eq!(
        generate_with_retry(&client, "p", &policy).await,
        Err(CompletionError::Timeout(20))
    );
}
