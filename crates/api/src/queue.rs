//! In-process processing queue.
//!
//! At-least-once delivery: a received message stays in the queue, invisible,
//! until its receipt token is used to delete it. An unacknowledged message
//! becomes visible again once its visibility timeout lapses and is delivered
//! with a fresh receipt token. Stale tokens cannot delete a redelivered
//! message.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::AppError;
use domain::{DomainError, MessagePublisher};
use inbound::{QueueRecord, RecordAcknowledger};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

/// Attribute carrying how many times a record has been delivered.
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "approximateReceiveCount";

#[derive(Debug, Clone)]
struct Message {
    id: String,
    body: String,
    receipt_token: Option<String>,
    visible_at: Instant,
    receive_count: u32,
}

/// A message that exhausted its deliveries without being acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: String,
    pub body: String,
    pub receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    dead_letters: Vec<DeadLetter>,
}

/// FIFO queue with visibility timeouts and receipt tokens.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    max_receive_count: u32,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// The source reference stamped on every record from this queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message and returns its id.
    pub fn send(&self, body: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().messages.push_back(Message {
            id: id.clone(),
            body: body.into(),
            receipt_token: None,
            visible_at: Instant::now(),
            receive_count: 0,
        });
        metrics::counter!("queue_messages_sent_total", "queue" => self.name.clone()).increment(1);
        id
    }

    /// Receives up to `max` visible messages in FIFO order.
    ///
    /// Each returned record carries a new receipt token and stays invisible for
    /// the visibility timeout. Messages past their receive limit are moved to
    /// the dead letters instead.
    pub fn receive(&self, max: usize) -> Vec<QueueRecord> {
        let now = Instant::now();
        let mut state = self.lock();
        let mut records = Vec::new();
        let mut index = 0;

        while index < state.messages.len() && records.len() < max {
            let message = &mut state.messages[index];
            if message.visible_at > now {
                index += 1;
                continue;
            }

            if message.receive_count >= self.max_receive_count {
                let expired = state.messages.remove(index);
                if let Some(expired) = expired {
                    tracing::warn!(
                        queue = %self.name,
                        message_id = %expired.id,
                        receive_count = expired.receive_count,
                        "message moved to dead letters"
                    );
                    metrics::counter!("queue_dead_letters_total", "queue" => self.name.clone())
                        .increment(1);
                    state.dead_letters.push(DeadLetter {
                        id: expired.id,
                        body: expired.body,
                        receive_count: expired.receive_count,
                    });
                }
                continue;
            }

            let token = Uuid::new_v4().to_string();
            message.receipt_token = Some(token.clone());
            message.visible_at = now + self.visibility_timeout;
            message.receive_count += 1;
            records.push(
                QueueRecord::new(&message.id, &message.body)
                    .with_source(&self.name, token)
                    .with_attribute(RECEIVE_COUNT_ATTRIBUTE, message.receive_count.to_string()),
            );
            index += 1;
        }

        records
    }

    /// Messages still in the queue, visible or in flight.
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages currently received and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .messages
            .iter()
            .filter(|m| m.receipt_token.is_some() && m.visible_at > now)
            .count()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryQueue {
    async fn publish(&self, message: &Value) -> Result<String, DomainError> {
        Ok(self.send(message.to_string()))
    }
}

#[async_trait]
impl RecordAcknowledger for InMemoryQueue {
    async fn delete(&self, source_reference: &str, receipt_token: &str) -> Result<(), AppError> {
        if source_reference != self.name {
            return Err(AppError::Internal(format!(
                "unknown queue {source_reference:?}"
            )));
        }

        let mut state = self.lock();
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt_token.as_deref() == Some(receipt_token))
            .ok_or_else(|| AppError::Internal("receipt token is no longer valid".to_string()))?;
        state.messages.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn queue() -> InMemoryQueue {
        InMemoryQueue::new("prompts", Duration::from_secs(30), 3)
    }

    #[tokio::test]
    async fn test_receive_is_fifo_and_respects_max() {
        let q = queue();
        q.send("a");
        q.send("b");
        q.send("c");

        let first = q.receive(2);
        assert_eq!(
            first.iter().map(|r| r.body.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let rest = q.receive(10);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body, "c");
        assert_eq!(q.in_flight(), 3);
    }

    #[tokio::test]
    async fn test_received_records_carry_source_and_token() {
        let q = queue();
        let id = q.send("a");

        let records = q.receive(1);
        assert_eq!(records[0].record_id, id);
        assert_eq!(records[0].source_reference, "prompts");
        assert!(!records[0].receipt_token.is_empty());
        assert_eq!(
            records[0].attributes.get(RECEIVE_COUNT_ATTRIBUTE).map(String::as_str),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_delete_removes_message() {
        let q = queue();
        q.send("a");
        let record = q.receive(1).remove(0);

        q.delete(&record.source_reference, &record.receipt_token)
            .await
            .unwrap();

        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_delete_rejects_unknown_source() {
        let q = queue();
        q.send("a");
        let record = q.receive(1).remove(0);

        assert!(q.delete("other", &record.receipt_token).await.is_err());
        assert_eq!(q.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered_after_timeout() {
        let q = queue();
        q.send("a");
        let first = q.receive(1).remove(0);
        assert!(q.receive(1).is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;

        let second = q.receive(1).remove(0);
        assert_eq!(second.record_id, first.record_id);
        assert_ne!(second.receipt_token, first.receipt_token);
        assert_eq!(
            second.attributes.get(RECEIVE_COUNT_ATTRIBUTE).map(String::as_str),
            Some("2")
        );

        assert!(q.delete("prompts", &first.receipt_token).await.is_err());
        q.delete("prompts", &second.receipt_token).await.unwrap();
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_moves_to_dead_letters_after_max_receives() {
        let q = queue();
        q.send("poison");

        for _ in 0..3 {
            assert_eq!(q.receive(1).len(), 1);
            tokio::time::advance(Duration::from_secs(31)).await;
        }

        assert!(q.receive(1).is_empty());
        assert!(q.is_empty());
        let dead = q.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "poison");
        assert_eq!(dead[0].receive_count, 3);
    }

    #[tokio::test]
    async fn test_publish_serializes_message() {
        let q = queue();
        let id = q.publish(&json!({"payload": {"id": "p1"}})).await.unwrap();

        let record = q.receive(1).remove(0);
        assert_eq!(record.record_id, id);
        assert_eq!(
            serde_json::from_str::<Value>(&record.body).unwrap(),
            json!({"payload": {"id": "p1"}})
        );
    }
}
