//! Prompt lookup.

use async_trait::async_trait;
use common::{AppError, FieldError, UseCase, Validate, Violations};
use serde::{Deserialize, Serialize};

use super::{PromptRecord, PromptRepository};
use crate::error::DomainError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPromptInput {
    pub id: String,
    pub user_id: String,
}

impl Validate for GetPromptInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Violations::new();
        v.non_blank("id", &self.id).non_blank("userId", &self.user_id);
        v.finish()
    }
}

/// Returns one of the caller's prompts.
///
/// A prompt owned by someone else is reported as not found.
pub struct GetPrompt {
    prompts: PromptRepository,
}

impl GetPrompt {
    pub fn new(prompts: PromptRepository) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl UseCase<GetPromptInput> for GetPrompt {
    type Output = PromptRecord;

    #[tracing::instrument(skip(self, input), fields(prompt_id = %input.id, principal_id = %input.user_id))]
    async fn execute(&self, input: GetPromptInput) -> Result<PromptRecord, AppError> {
        match self.prompts.get(&input.user_id, &input.id).await? {
            Some(record) if record.user_id == input.user_id => Ok(record),
            _ => Err(DomainError::PromptNotFound(input.id).into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsInput {
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListPromptsInput {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 100;
}

impl Validate for ListPromptsInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Violations::new();
        v.non_blank("userId", &self.user_id);
        if let Some(limit) = self.limit {
            v.check(
                (1..=Self::MAX_LIMIT).contains(&limit),
                "limit",
                "must be between 1 and 100",
            );
        }
        v.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptList {
    pub items: Vec<PromptRecord>,
}

/// Lists the caller's prompts, newest first.
pub struct ListPrompts {
    prompts: PromptRepository,
}

impl ListPrompts {
    pub fn new(prompts: PromptRepository) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl UseCase<ListPromptsInput> for ListPrompts {
    type Output = PromptList;

    #[tracing::instrument(skip(self, input), fields(principal_id = %input.user_id))]
    async fn execute(&self, input: ListPromptsInput) -> Result<PromptList, AppError> {
        let limit = input.limit.unwrap_or(ListPromptsInput::DEFAULT_LIMIT);
        let items = self.prompts.list(&input.user_id, limit).await?;
        Ok(PromptList { items })
    }
}
