//! Prompt submission.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, FieldError, UseCase, Validate, Violations};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{PromptRecord, PromptRepository, PromptStatus};
use crate::services::MessagePublisher;

/// Longest prompt accepted, in characters.
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Input of [`SubmitPrompt`]. `id` and `userId` are filled in by the HTTP
/// layer from a generated id and the caller's identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPromptInput {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub key_id: Option<String>,
    pub prompt: String,
}

impl Validate for SubmitPromptInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Violations::new();
        v.non_blank("id", &self.id)
            .non_blank("userId", &self.user_id)
            .non_blank("prompt", &self.prompt)
            .max_chars("prompt", &self.prompt, MAX_PROMPT_CHARS);
        v.finish()
    }
}

/// Echo returned once a prompt is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAccepted {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub status: PromptStatus,
}

/// Stores a pending prompt and queues it for processing.
pub struct SubmitPrompt {
    prompts: PromptRepository,
    publisher: Arc<dyn MessagePublisher>,
}

impl SubmitPrompt {
    pub fn new(prompts: PromptRepository, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { prompts, publisher }
    }
}

#[async_trait]
impl UseCase<SubmitPromptInput> for SubmitPrompt {
    type Output = PromptAccepted;

    #[tracing::instrument(skip(self, input), fields(prompt_id = %input.id, principal_id = %input.user_id))]
    async fn execute(&self, input: SubmitPromptInput) -> Result<PromptAccepted, AppError> {
        let record = PromptRecord::pending(&input.id, &input.user_id, &input.prompt);
        self.prompts.insert(&record).await?;

        let mut payload = json!({"id": record.id, "userId": record.user_id});
        if let Some(key_id) = &input.key_id {
            payload["keyId"] = json!(key_id);
        }

        if let Err(err) = self.publisher.publish(&json!({ "payload": payload })).await {
            tracing::error!(error = %err, "failed to queue prompt, removing record");
            if let Err(cleanup) = self.prompts.delete(&record.user_id, &record.id).await {
                tracing::error!(error = %cleanup, "failed to remove unqueued prompt");
            }
            return Err(err.into());
        }

        metrics::counter!("prompts_submitted_total").increment(1);
        Ok(PromptAccepted {
            id: record.id,
            user_id: record.user_id,
            prompt: record.prompt,
            status: record.status,
        })
    }
}
