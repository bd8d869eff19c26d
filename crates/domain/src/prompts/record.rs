//! Stored prompt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a prompt.
///
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed ──► Completed (after credits are added and the message is redelivered)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStatus::Pending => "pending",
            PromptStatus::Completed => "completed",
            PromptStatus::Failed => "failed",
        }
    }

    /// Returns true if no further processing will change the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PromptStatus::Completed)
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A prompt as stored in the user's partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub status: PromptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptRecord {
    /// A new pending record.
    pub fn pending(id: impl Into<String>, user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            status: PromptStatus::Pending,
            completion: None,
            model: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(PromptStatus::Pending).unwrap(), json!("pending"));
        assert_eq!(PromptStatus::Failed.to_string(), "failed");
        assert!(PromptStatus::Completed.is_terminal());
        assert!(!PromptStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_record_omits_empty_fields() {
        let record = PromptRecord::pending("p1", "u1", "hello");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["userId"], "u1");
        assert!(json.get("completion").is_none());
    }
}
