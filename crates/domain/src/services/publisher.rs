//! Message publisher trait and in-memory implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::lock;
use crate::error::DomainError;

/// Publishes messages onto the processing queue.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `message` as the record body and returns its message id.
    async fn publish(&self, message: &Value) -> Result<String, DomainError>;
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    messages: Vec<Value>,
    fail_on_publish: bool,
}

/// Publisher that keeps messages in memory for inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        lock(&self.state).fail_on_publish = fail;
    }

    /// Messages published so far, in order.
    pub fn published(&self) -> Vec<Value> {
        lock(&self.state).messages.clone()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    async fn publish(&self, message: &Value) -> Result<String, DomainError> {
        let mut state = lock(&self.state);
        if state.fail_on_publish {
            return Err(DomainError::upstream("queue", "publish failed"));
        }
        state.messages.push(message.clone());
        Ok(format!("msg-{}", state.messages.len()))
    }
}
