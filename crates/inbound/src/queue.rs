//! Per-batch queue pipeline.
//!
//! Each record goes through extract → validate → use case → acknowledge.
//! A record is deleted from its source only after its use case succeeded;
//! failed records stay unacknowledged so the queue redelivers or dead-letters
//! them.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, UseCase, Validate, parse_input};
use futures_util::future::{join_all, try_join_all};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::extract_payload;

/// One record of a queue batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub record_id: String,
    pub body: String,
    /// Identifies the queue the record came from.
    #[serde(default)]
    pub source_reference: String,
    /// Handle for this delivery; required to delete the record.
    #[serde(default)]
    pub receipt_token: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl QueueRecord {
    pub fn new(record_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            body: body.into(),
            source_reference: String::new(),
            receipt_token: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_source(
        mut self,
        source_reference: impl Into<String>,
        receipt_token: impl Into<String>,
    ) -> Self {
        self.source_reference = source_reference.into();
        self.receipt_token = receipt_token.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A batch of records delivered in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    #[serde(default)]
    pub records: Vec<QueueRecord>,
}

impl QueueEvent {
    pub fn new(records: Vec<QueueRecord>) -> Self {
        Self { records }
    }
}

/// Deletes processed records from their source queue.
#[async_trait]
pub trait RecordAcknowledger: Send + Sync {
    async fn delete(&self, source_reference: &str, receipt_token: &str) -> Result<(), AppError>;
}

#[async_trait]
impl<A: RecordAcknowledger + ?Sized> RecordAcknowledger for Arc<A> {
    async fn delete(&self, source_reference: &str, receipt_token: &str) -> Result<(), AppError> {
        (**self).delete(source_reference, receipt_token).await
    }
}

/// Decodes the candidate input from a record.
pub type MessageExtractor = Arc<dyn Fn(&QueueRecord) -> Result<Value, AppError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Dispatch all records concurrently instead of one at a time in order.
    pub process_in_parallel: bool,
    /// Record failures and keep going instead of aborting the batch.
    pub continue_on_error: bool,
    /// Log payloads and every per-record outcome.
    pub verbose_logging: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            process_in_parallel: true,
            continue_on_error: true,
            verbose_logging: false,
        }
    }
}

impl QueueOptions {
    pub fn sequential(mut self) -> Self {
        self.process_in_parallel = false;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.process_in_parallel = true;
        self
    }

    pub fn stop_on_error(mut self) -> Self {
        self.continue_on_error = false;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose_logging = true;
        self
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecordOutcome {
    pub record_id: String,
    pub success: bool,
    pub error: Option<AppError>,
}

impl QueueRecordOutcome {
    fn succeeded(record_id: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            success: true,
            error: None,
        }
    }

    fn failed(record_id: &str, error: AppError) -> Self {
        Self {
            record_id: record_id.to_string(),
            success: false,
            error: Some(error),
        }
    }
}

/// Outcomes of a whole batch, in record order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub outcomes: Vec<QueueRecordOutcome>,
    pub processed: usize,
    pub failed: usize,
}

impl BatchResult {
    fn from_outcomes(outcomes: Vec<QueueRecordOutcome>) -> Self {
        let failed = outcomes.iter().filter(|o| !o.success).count();
        Self {
            processed: outcomes.len() - failed,
            failed,
            outcomes,
        }
    }

    /// `(record_id, error)` for every failed record.
    pub fn errors(&self) -> Vec<(&str, &AppError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (o.record_id.as_str(), e)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Adapts one use case to queue batches.
pub struct QueueAdapter<T, U> {
    name: String,
    use_case: U,
    extractor: MessageExtractor,
    acknowledger: Arc<dyn RecordAcknowledger>,
    options: QueueOptions,
    _input: PhantomData<fn() -> T>,
}

impl<T, U> QueueAdapter<T, U>
where
    T: DeserializeOwned + Validate + Send + 'static,
    U: UseCase<T>,
{
    /// Creates an adapter using the default message extractor.
    pub fn new(name: impl Into<String>, use_case: U, acknowledger: Arc<dyn RecordAcknowledger>) -> Self {
        Self {
            name: name.into(),
            use_case,
            extractor: Arc::new(extract_payload),
            acknowledger,
            options: QueueOptions::default(),
            _input: PhantomData,
        }
    }

    pub fn extractor(
        mut self,
        extractor: impl Fn(&QueueRecord) -> Result<Value, AppError> + Send + Sync + 'static,
    ) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Processes a batch.
    ///
    /// Returns `Err` for a malformed batch, for a fatal record error, and for
    /// the first record failure when `continue_on_error` is off. Records that
    /// had not started by then are left untouched.
    #[tracing::instrument(skip_all, fields(adapter = %self.name, records = event.records.len()))]
    pub async fn handle(&self, event: QueueEvent) -> Result<BatchResult, AppError> {
        if event.records.is_empty() {
            tracing::error!("received a batch with no records");
            return Err(AppError::FatalBatch("batch contains no records".to_string()));
        }

        let outcomes = match (self.options.process_in_parallel, self.options.continue_on_error) {
            (false, _) => self.process_sequentially(&event.records).await?,
            (true, true) => join_all(event.records.iter().map(|r| self.process_record(r))).await,
            (true, false) => {
                try_join_all(event.records.iter().map(|record| async move {
                    let outcome = self.process_record(record).await;
                    match outcome.error {
                        Some(err) => Err(err),
                        None => Ok(outcome),
                    }
                }))
                .await?
            }
        };

        if let Some(fatal) = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref())
            .find(|e| e.is_fatal())
        {
            return Err(fatal.clone());
        }

        let result = BatchResult::from_outcomes(outcomes);
        tracing::info!(
            processed = result.processed,
            failed = result.failed,
            "queue batch processed"
        );
        Ok(result)
    }

    async fn process_sequentially(
        &self,
        records: &[QueueRecord],
    ) -> Result<Vec<QueueRecordOutcome>, AppError> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let outcome = self.process_record(record).await;
            if let Some(err) = &outcome.error {
                if !self.options.continue_on_error || err.is_fatal() {
                    tracing::warn!(
                        record_id = %record.record_id,
                        skipped = records.len() - outcomes.len() - 1,
                        "aborting batch after record failure"
                    );
                    return Err(err.clone());
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    #[tracing::instrument(skip_all, fields(record_id = %record.record_id))]
    async fn process_record(&self, record: &QueueRecord) -> QueueRecordOutcome {
        let outcome = match self.run_record(record).await {
            Ok(()) => QueueRecordOutcome::succeeded(&record.record_id),
            Err(err) => {
                tracing::warn!(error = %err, kind = %err.kind(), "queue record failed");
                QueueRecordOutcome::failed(&record.record_id, err)
            }
        };

        if self.options.verbose_logging && outcome.success {
            tracing::info!("queue record processed");
        }
        let label = if outcome.success { "success" } else { "failure" };
        metrics::counter!(
            "queue_records_total",
            "adapter" => self.name.clone(),
            "outcome" => label
        )
        .increment(1);

        outcome
    }

    async fn run_record(&self, record: &QueueRecord) -> Result<(), AppError> {
        let payload = (self.extractor)(record)?;
        if self.options.verbose_logging {
            tracing::debug!(%payload, "extracted queue payload");
        }

        let input: T = parse_input(payload)?;
        self.use_case.execute(input).await?;

        self.acknowledger
            .delete(&record.source_reference, &record.receipt_token)
            .await
            .inspect_err(|err| {
                tracing::error!(error = %err, "failed to acknowledge processed record");
            })?;
        metrics::counter!("queue_records_acknowledged_total", "adapter" => self.name.clone())
            .increment(1);

        Ok(())
    }
}
