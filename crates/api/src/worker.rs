//! Polling worker that feeds queue batches to a [`QueueAdapter`].

use std::sync::Arc;
use std::time::Duration;

use common::{AppError, UseCase, Validate};
use inbound::{BatchResult, QueueAdapter, QueueEvent};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::queue::InMemoryQueue;

/// Receives batches from an [`InMemoryQueue`] until told to stop.
pub struct QueueWorker<T, U>
where
    T: Send + 'static,
    U: UseCase<T>,
{
    queue: Arc<InMemoryQueue>,
    adapter: Arc<QueueAdapter<T, U>>,
    batch_size: usize,
    poll_interval: Duration,
}

impl<T, U> QueueWorker<T, U>
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
    U: UseCase<T> + 'static,
{
    pub fn new(
        queue: Arc<InMemoryQueue>,
        adapter: Arc<QueueAdapter<T, U>>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            adapter,
            batch_size: batch_size.max(1),
            poll_interval,
        }
    }

    /// Receives one batch and processes it.
    ///
    /// Returns `None` when no message was visible. A batch-level error leaves
    /// every unacknowledged record in flight for redelivery.
    pub async fn poll_once(&self) -> Option<Result<BatchResult, AppError>> {
        let records = self.queue.receive(self.batch_size);
        if records.is_empty() {
            return None;
        }

        let result = self.adapter.handle(QueueEvent::new(records)).await;
        match &result {
            Ok(batch) if !batch.is_success() => {
                tracing::warn!(
                    adapter = %self.adapter.name(),
                    failed = batch.failed,
                    "queue batch finished with failed records"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(adapter = %self.adapter.name(), error = %err, "queue batch aborted");
            }
        }
        Some(result)
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A batch in progress when shutdown is requested runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            adapter = %self.adapter.name(),
            queue = %self.queue.name(),
            batch_size = self.batch_size,
            "queue worker started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // Drain without waiting while messages keep coming.
                    while self.poll_once().await.is_some() {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(adapter = %self.adapter.name(), "queue worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use common::use_case_fn;
    use serde_json::{Value, json};

    use super::*;

    fn worker<U>(queue: &Arc<InMemoryQueue>, use_case: U) -> QueueWorker<Value, U>
    where
        U: UseCase<Value, Output = ()> + 'static,
    {
        let adapter = QueueAdapter::new(
            "test",
            use_case,
            Arc::clone(queue) as Arc<dyn inbound::RecordAcknowledger>,
        );
        QueueWorker::new(Arc::clone(queue), Arc::new(adapter), 10, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_poll_once_on_empty_queue() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30), 5));
        let worker = worker(&queue, use_case_fn(|_: Value| async { Ok::<_, AppError>(()) }));

        assert!(worker.poll_once().await.is_none());
    }

    #[tokio::test]
    async fn test_poll_once_acknowledges_successes() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30), 5));
        queue.send(json!({"payload": {"n": 1}}).to_string());
        queue.send(json!({"payload": {"n": 2}}).to_string());
        let worker = worker(&queue, use_case_fn(|_: Value| async { Ok::<_, AppError>(()) }));

        let batch = worker.poll_once().await.unwrap().unwrap();

        assert_eq!(batch.processed, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_stays_in_queue() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30), 5));
        queue.send(json!({"payload": {"n": 1}}).to_string());
        queue.send(json!({"payload": {"n": 2}}).to_string());
        let worker = worker(
            &queue,
            use_case_fn(|input: Value| async move {
                if input["n"] == 2 {
                    Err(AppError::TransientUpstream("busy".to_string()))
                } else {
                    Ok(())
                }
            }),
        );

        let batch = worker.poll_once().await.unwrap().unwrap();

        assert_eq!(batch.failed, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(InMemoryQueue::new("q", Duration::from_secs(30), 5));
        queue.send(json!({"payload": {}}).to_string());
        let worker = worker(&queue, use_case_fn(|_: Value| async { Ok::<_, AppError>(()) }));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(worker.run(rx));
        for _ in 0..100 {
            if queue.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(queue.is_empty());
    }
}
