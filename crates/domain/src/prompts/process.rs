//! Asynchronous prompt processing, driven by the processing queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AppError, FieldError, RetryPolicy, UseCase, Validate, Violations};
use serde::Deserialize;

use super::{PromptRecord, PromptRepository, PromptStatus};
use crate::credits::CreditLedger;
use crate::error::DomainError;
use crate::services::LlmProvider;

/// Credits charged per completed prompt.
const PROMPT_COST: i64 = 1;

/// Payload of a processing message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPromptInput {
    pub id: String,
    pub user_id: String,
    /// Key to charge; resolved from the user when absent.
    #[serde(default)]
    pub key_id: Option<String>,
}

impl Validate for ProcessPromptInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Violations::new();
        v.non_blank("id", &self.id).non_blank("userId", &self.user_id);
        v.finish()
    }
}

/// Runs a pending prompt through the LLM and charges one credit.
///
/// Redelivery of an already completed prompt is a no-op, and a charge marker
/// keeps overlapping deliveries from charging twice. A prompt that could not
/// be charged is marked failed and reported as a permanent error; it is
/// processed again if the message is redelivered.
pub struct ProcessPrompt {
    prompts: PromptRepository,
    llm: Arc<dyn LlmProvider>,
    ledger: Arc<dyn CreditLedger>,
    retry: RetryPolicy<DomainError>,
}

impl ProcessPrompt {
    pub fn new(
        prompts: PromptRepository,
        llm: Arc<dyn LlmProvider>,
        ledger: Arc<dyn CreditLedger>,
        retry: RetryPolicy<DomainError>,
    ) -> Self {
        Self {
            prompts,
            llm,
            ledger,
            retry,
        }
    }

    async fn mark_failed(&self, mut record: PromptRecord, err: &DomainError) -> Result<(), DomainError> {
        record.status = PromptStatus::Failed;
        record.error = Some(err.to_string());
        record.updated_at = Utc::now();
        self.prompts.save(&record).await
    }

    /// Outcome for a delivery that lost the charge to a concurrent one.
    async fn settled_elsewhere(&self, input: &ProcessPromptInput) -> Result<PromptRecord, AppError> {
        let current = self
            .prompts
            .get(&input.user_id, &input.id)
            .await?
            .ok_or_else(|| DomainError::PromptNotFound(input.id.clone()))?;
        if current.status.is_terminal() {
            tracing::info!("prompt completed by a concurrent delivery");
            return Ok(current);
        }
        tracing::warn!("prompt charge held by a concurrent delivery, leaving for redelivery");
        Err(DomainError::ChargeInProgress(input.id.clone()).into())
    }
}

#[async_trait]
impl UseCase<ProcessPromptInput> for ProcessPrompt {
    type Output = PromptRecord;

    #[tracing::instrument(skip(self, input), fields(prompt_id = %input.id, principal_id = %input.user_id))]
    async fn execute(&self, input: ProcessPromptInput) -> Result<PromptRecord, AppError> {
        let mut record = self
            .prompts
            .get(&input.user_id, &input.id)
            .await?
            .ok_or_else(|| DomainError::PromptNotFound(input.id.clone()))?;

        if record.status.is_terminal() {
            tracing::info!("prompt already completed, skipping redelivery");
            return Ok(record);
        }

        let completion = self
            .retry
            .run(|| self.llm.complete(&record.prompt))
            .await?;

        if !self.prompts.claim_charge(&record.user_id, &record.id).await? {
            return self.settled_elsewhere(&input).await;
        }

        match self
            .ledger
            .decrement(&record.user_id, input.key_id.as_deref(), PROMPT_COST)
            .await
        {
            Ok(remaining) => tracing::debug!(remaining, "charged prompt"),
            Err(err @ (DomainError::InsufficientCredits { .. } | DomainError::KeyNotFound(_))) => {
                tracing::warn!(error = %err, "cannot charge prompt, marking failed");
                self.prompts.release_charge(&record.user_id, &record.id).await?;
                self.mark_failed(record, &err).await?;
                metrics::counter!("prompts_failed_total").increment(1);
                return Err(err.into());
            }
            Err(err) => {
                self.prompts.release_charge(&record.user_id, &record.id).await?;
                return Err(err.into());
            }
        }

        record.status = PromptStatus::Completed;
        record.completion = Some(completion.text);
        record.model = Some(completion.model);
        record.error = None;
        record.updated_at = Utc::now();
        self.prompts.save(&record).await?;

        metrics::counter!("prompts_completed_total").increment(1);
        tracing::info!("prompt completed");
        Ok(record)
    }
}
