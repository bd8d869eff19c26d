//! Saga error types.

use common::AppError;
use thiserror::Error;

/// Errors raised while assembling a saga.
///
/// Step failures are never wrapped: the orchestrator returns the failing
/// step's own error unchanged.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga must have at least one step.
    #[error("Saga '{0}' has no steps")]
    NoSteps(String),

    /// Two steps share a name, which would make logs and reports ambiguous.
    #[error("Saga '{saga}' has duplicate step '{step}'")]
    DuplicateStep { saga: String, step: String },
}

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// A compensation that failed during rollback.
///
/// Recorded and logged; rollback continues with the next lower step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Compensation step '{step}' failed: {reason}")]
pub struct CompensationFailure {
    /// Name of the step whose compensation failed.
    pub step: String,
    /// Position of the step in the saga.
    pub index: usize,
    /// Display form of the compensation error.
    pub reason: String,
}
