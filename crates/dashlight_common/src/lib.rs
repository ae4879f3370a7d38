//! Async layer for dashlight: configuration, the completion client with
//! timeout and retry, and the consultant that resolves deferred turns.

pub mod config;
pub mod consultant;
pub mod llm_client;
pub mod prompts;
pub mod retry;

pub use config::{ConfigError, DashlightConfig};
pub use consultant::{ConsultLimits, Consultant, SetupError};
pub use llm_client::{CompletionClient, CompletionError, FakeCompletionClient, HttpCompletionClient};
pub use retry::{generate_with_retry, RetryPolicy};
