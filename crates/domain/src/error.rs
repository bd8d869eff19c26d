//! Domain error types.

use common::{AppError, Retryable};
use item_store::StoreError;
use saga::SagaError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the item store.
    #[error("Item store error: {0}")]
    Store(#[from] StoreError),

    /// The saga could not be assembled.
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    /// Prompt not found, or owned by someone else.
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// The caller has no API key to charge or credit.
    #[error("No API key found for user {0}")]
    KeyNotFound(String),

    /// The key's balance cannot cover the charge.
    #[error("Insufficient credits for key {key_id}")]
    InsufficientCredits { key_id: String },

    /// Another delivery of the same prompt holds its charge.
    #[error("Prompt {0} is being charged by another delivery")]
    ChargeInProgress(String),

    /// An account already exists for the email address.
    #[error("Account already exists for {0}")]
    AccountExists(String),

    /// An upstream service answered with something we could not parse.
    #[error("Malformed response from {service}: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },

    /// An upstream service failed or was unreachable.
    #[error("{service} failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        DomainError::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        DomainError::MalformedResponse {
            service,
            message: message.into(),
        }
    }
}

impl Retryable for DomainError {
    fn is_retryable(&self) -> bool {
        matches!(self, DomainError::MalformedResponse { .. })
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::PromptNotFound(_) => AppError::NotFound("Prompt not found".to_string()),
            DomainError::KeyNotFound(_)
            | DomainError::InsufficientCredits { .. }
            | DomainError::AccountExists(_) => AppError::Permanent(err.to_string()),
            DomainError::MalformedResponse { .. } => AppError::TransientUpstream(err.to_string()),
            DomainError::Store(StoreError::ConditionFailed { .. }) => {
                AppError::Permanent(err.to_string())
            }
            DomainError::Store(_)
            | DomainError::Saga(_)
            | DomainError::ChargeInProgress(_)
            | DomainError::Upstream { .. }
            | DomainError::Serialization(_) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_responses_are_retryable() {
        assert!(DomainError::malformed("llm", "truncated json").is_retryable());
        assert!(!DomainError::upstream("llm", "503").is_retryable());
        assert!(
            !DomainError::InsufficientCredits {
                key_id: "k".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_app_error_mapping() {
        let err: AppError = DomainError::PromptNotFound("p1".into()).into();
        assert_eq!(err, AppError::NotFound("Prompt not found".to_string()));

        let err: AppError = DomainError::InsufficientCredits {
            key_id: "k1".into(),
        }
        .into();
        assert_eq!(
            err,
            AppError::Permanent("Insufficient credits for key k1".to_string())
        );

        let err: AppError = DomainError::malformed("llm", "bad").into();
        assert!(matches!(err, AppError::TransientUpstream(_)));

        let err: AppError = DomainError::upstream("kms", "down").into();
        assert_eq!(err, AppError::Internal("kms failed: down".to_string()));
    }
}
