//! Outward error taxonomy.
//!
//! Every crate keeps its own error enum; at the adapter boundary they are
//! converted into [`AppError`], whose variant decides the HTTP status, whether
//! a retry is allowed and whether a queue batch is aborted outright.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single violated field reported by a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name (or dotted path) of the offending field.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors as seen by the inbound adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Schema or field violations in the caller's input.
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// Missing or rejected credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The requested resource does not exist (or is not visible to the caller).
    #[error("{0}")]
    NotFound(String),

    /// An upstream response could not be parsed or had an unexpected shape.
    /// These are the only failures retried by default.
    #[error("Upstream response could not be processed: {0}")]
    TransientUpstream(String),

    /// A business rule was violated; retrying cannot help.
    #[error("{0}")]
    Permanent(String),

    /// The trigger envelope itself is malformed; the whole invocation fails.
    #[error("Malformed batch: {0}")]
    FatalBatch(String),

    /// Anything else, including collaborator outages.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`AppError`], used for metric labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    NotFound,
    TransientUpstream,
    Permanent,
    FatalBatch,
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientUpstream => "transient_upstream",
            ErrorKind::Permanent => "permanent",
            ErrorKind::FatalBatch => "fatal_batch",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    /// Creates a validation error enumerating the violated fields.
    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: message.into(),
            errors,
        }
    }

    /// Creates a validation error with no per-field detail.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::validation(message, Vec::new())
    }

    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::Authentication(_) => ErrorKind::Authentication,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::TransientUpstream(_) => ErrorKind::TransientUpstream,
            AppError::Permanent(_) => ErrorKind::Permanent,
            AppError::FatalBatch(_) => ErrorKind::FatalBatch,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the violated fields for validation errors, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            AppError::Validation { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Returns true if the error aborts a whole queue batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::FatalBatch(_))
    }
}
