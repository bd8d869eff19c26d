//! Integration tests for the queue batch pipeline and its acknowledgment rules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{AppError, FieldError, UseCase, Validate};
use inbound::{QueueAdapter, QueueEvent, QueueOptions, QueueRecord, RecordAcknowledger};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
struct Job {
    id: String,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    fail: bool,
}

impl Validate for Job {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        if self.id.is_empty() {
            return Err(vec![FieldError::new("id", "must not be empty")]);
        }
        Ok(())
    }
}

/// Records which receipt tokens were deleted.
#[derive(Clone, Default)]
struct RecordingAcknowledger {
    deleted: Arc<Mutex<Vec<String>>>,
    fail_for: Arc<Mutex<Option<String>>>,
}

impl RecordingAcknowledger {
    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn set_fail_for(&self, receipt_token: &str) {
        *self.fail_for.lock().unwrap() = Some(receipt_token.to_string());
    }
}

#[async_trait]
impl RecordAcknowledger for RecordingAcknowledger {
    async fn delete(&self, source_reference: &str, receipt_token: &str) -> Result<(), AppError> {
        assert_eq!(source_reference, "jobs");
        if self.fail_for.lock().unwrap().as_deref() == Some(receipt_token) {
            return Err(AppError::Internal("queue unavailable".to_string()));
        }
        self.deleted.lock().unwrap().push(receipt_token.to_string());
        Ok(())
    }
}

/// Records the ids of the jobs it ran, in start order.
#[derive(Clone, Default)]
struct JobRunner {
    started: Arc<Mutex<Vec<String>>>,
}

impl JobRunner {
    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl UseCase<Job> for JobRunner {
    type Output = ();

    async fn execute(&self, job: Job) -> Result<(), AppError> {
        self.started.lock().unwrap().push(job.id.clone());
        if job.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(job.delay_ms)).await;
        }
        if job.fail {
            return Err(AppError::Permanent(format!("job {} failed", job.id)));
        }
        Ok(())
    }
}

struct TestHarness {
    runner: JobRunner,
    acknowledger: RecordingAcknowledger,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            runner: JobRunner::default(),
            acknowledger: RecordingAcknowledger::default(),
        }
    }

    fn adapter(&self, options: QueueOptions) -> QueueAdapter<Job, JobRunner> {
        QueueAdapter::new(
            "jobs",
            self.runner.clone(),
            Arc::new(self.acknowledger.clone()),
        )
        .options(options)
    }
}

fn record(n: usize, payload: Value) -> QueueRecord {
    QueueRecord::new(format!("r{n}"), json!({"payload": payload}).to_string())
        .with_source("jobs", format!("rt{n}"))
}

#[tokio::test]
async fn test_sequential_batch_isolates_invalid_record() {
    let h = TestHarness::new();
    let event = QueueEvent::new(vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": ""})),
        record(3, json!({"id": "c"})),
    ]);

    let result = h
        .adapter(QueueOptions::default().sequential())
        .handle(event)
        .await
        .unwrap();

    assert_eq!(h.acknowledger.deleted(), vec!["rt1", "rt3"]);
    assert_eq!(result.processed, 2);
    assert_eq!(result.failed, 1);
    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "r2");
    assert!(matches!(errors[0].1, AppError::Validation { .. }));
    assert_eq!(h.runner.started(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_sequential_stop_on_error_aborts_remaining_records() {
    let h = TestHarness::new();
    let event = QueueEvent::new(vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": "b", "fail": true})),
        record(3, json!({"id": "c"})),
    ]);

    let err = h
        .adapter(QueueOptions::default().sequential().stop_on_error())
        .handle(event)
        .await
        .unwrap_err();

    assert_eq!(err, AppError::Permanent("job b failed".to_string()));
    assert_eq!(h.runner.started(), vec!["a", "b"]);
    assert_eq!(h.acknowledger.deleted(), vec!["rt1"]);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_failure_does_not_block_other_records() {
    let h = TestHarness::new();
    let event = QueueEvent::new(vec![
        record(1, json!({"id": "slow", "delay_ms": 50})),
        record(2, json!({"id": "bad", "fail": true})),
        record(3, json!({"id": "fast"})),
    ]);

    let result = h.adapter(QueueOptions::default()).handle(event).await.unwrap();

    let mut deleted = h.acknowledger.deleted();
    deleted.sort();
    assert_eq!(deleted, vec!["rt1", "rt3"]);
    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(
        result.outcomes.iter().map(|o| o.success).collect::<Vec<_>>(),
        vec![true, false, true]
    );
}

#[tokio::test(start_paused = true)]
async fn test_parallel_dispatches_all_records_concurrently() {
    let h = TestHarness::new();
    let event = QueueEvent::new(
        (0..5)
            .map(|n| record(n, json!({"id": format!("j{n}"), "delay_ms": 100})))
            .collect(),
    );

    let started = tokio::time::Instant::now();
    let result = h.adapter(QueueOptions::default()).handle(event).await.unwrap();

    assert!(result.is_success());
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(h.acknowledger.deleted().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_stop_on_error_fails_batch() {
    let h = TestHarness::new();
    let event = QueueEvent::new(vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": "b", "fail": true})),
    ]);

    let err = h
        .adapter(QueueOptions::default().stop_on_error())
        .handle(event)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Permanent(_)));
    assert!(!h.acknowledger.deleted().contains(&"rt2".to_string()));
}

#[tokio::test]
async fn test_ack_failure_marks_record_failed() {
    let h = TestHarness::new();
    h.acknowledger.set_fail_for("rt1");
    let event = QueueEvent::new(vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": "b"})),
    ]);

    let result = h
        .adapter(QueueOptions::default().sequential())
        .handle(event)
        .await
        .unwrap();

    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].0, "r1");
    assert_eq!(h.acknowledger.deleted(), vec!["rt2"]);
}

#[tokio::test]
async fn test_unrecognized_and_wrapped_messages() {
    let h = TestHarness::new();
    let wrapped = json!({"Message": json!({"payload": {"id": "w"}}).to_string()}).to_string();
    let event = QueueEvent::new(vec![
        QueueRecord::new("r1", wrapped).with_source("jobs", "rt1"),
        QueueRecord::new("r2", r#"{"id":"direct-without-payload"}"#).with_source("jobs", "rt2"),
    ]);

    let result = h
        .adapter(QueueOptions::default().sequential().verbose())
        .handle(event)
        .await
        .unwrap();

    assert_eq!(h.runner.started(), vec!["w"]);
    assert_eq!(h.acknowledger.deleted(), vec!["rt1"]);
    assert_eq!(
        result.errors()[0].1,
        &AppError::bad_request("Unrecognized message format")
    );
}

#[tokio::test]
async fn test_redelivered_record_is_deleted_again_only_on_success() {
    let h = TestHarness::new();
    let adapter = h.adapter(QueueOptions::default().sequential());

    let failing = QueueEvent::new(vec![record(1, json!({"id": "a", "fail": true}))]);
    adapter.handle(failing).await.unwrap();
    assert!(h.acknowledger.deleted().is_empty());

    let retry = QueueEvent::new(vec![record(1, json!({"id": "a"}))]);
    adapter.handle(retry).await.unwrap();
    assert_eq!(h.acknowledger.deleted(), vec!["rt1"]);
}
