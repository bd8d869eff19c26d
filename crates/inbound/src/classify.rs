//! Maps errors to stable outward status codes and bodies.

use common::{AppError, ErrorKind, FieldError};
use serde::{Deserialize, Serialize};

use crate::http::HttpResponse;

/// The body every failed HTTP invocation returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// An error after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status: u16,
    pub kind: ErrorKind,
    pub body: ErrorBody,
}

impl ClassifiedError {
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::json(self.status, &self.body)
    }
}

/// Stateless mapping from [`AppError`] to status and body.
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn status(err: &AppError) -> u16 {
        match err.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Permanent => 422,
            ErrorKind::TransientUpstream => 502,
            ErrorKind::FatalBatch | ErrorKind::Internal => 500,
        }
    }

    /// Classifies `err`, logging server-side failures.
    pub fn classify(err: &AppError) -> ClassifiedError {
        let status = Self::status(err);
        if status >= 500 {
            tracing::error!(error = %err, kind = %err.kind(), status, "request failed");
        } else {
            tracing::debug!(error = %err, kind = %err.kind(), status, "request rejected");
        }

        ClassifiedError {
            status,
            kind: err.kind(),
            body: ErrorBody {
                message: err.to_string(),
                errors: err.field_errors().to_vec(),
            },
        }
    }
}
