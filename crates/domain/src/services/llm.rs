//! LLM provider trait and in-memory implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::lock;
use crate::error::DomainError;

/// Text generated for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Text completion.
///
/// Implementations report unparseable responses as
/// [`DomainError::MalformedResponse`], the only failure worth retrying.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, DomainError>;
}

#[derive(Debug, Default)]
struct InMemoryLlmState {
    calls: u32,
    malformed_remaining: u32,
    fail_on_complete: bool,
}

/// In-memory LLM provider that echoes the prompt.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLlmProvider {
    state: Arc<Mutex<InMemoryLlmState>>,
}

impl InMemoryLlmProvider {
    pub const MODEL: &'static str = "echo-1";

    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls return malformed responses.
    pub fn set_malformed_responses(&self, count: u32) {
        lock(&self.state).malformed_remaining = count;
    }

    /// Makes every call fail with an upstream error.
    pub fn set_fail_on_complete(&self, fail: bool) {
        lock(&self.state).fail_on_complete = fail;
    }

    pub fn call_count(&self) -> u32 {
        lock(&self.state).calls
    }
}

#[async_trait]
impl LlmProvider for InMemoryLlmProvider {
    async fn complete(&self, prompt: &str) -> Result<Completion, DomainError> {
        let mut state = lock(&self.state);
        state.calls += 1;

        if state.fail_on_complete {
            return Err(DomainError::upstream("llm", "model overloaded"));
        }
        if state.malformed_remaining > 0 {
            state.malformed_remaining -= 1;
            return Err(DomainError::malformed("llm", "response was not valid JSON"));
        }

        Ok(Completion {
            text: format!("Echo: {prompt}"),
            model: Self::MODEL.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_then_success() {
        let llm = InMemoryLlmProvider::new();
        llm.set_malformed_responses(1);

        assert!(matches!(
            llm.complete("hi").await,
            Err(DomainError::MalformedResponse { .. })
        ));
        assert_eq!(llm.complete("hi").await.unwrap().text, "Echo: hi");
        assert_eq!(llm.call_count(), 2);
    }
}
