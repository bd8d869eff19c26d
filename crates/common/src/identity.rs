//! Verified caller identity.

use serde::{Deserialize, Serialize};

/// The verified principal behind an invocation.
///
/// Resolved at most once per invocation from the bearer credential.
/// `credential_id` is the caller's API key identifier when the identity
/// authority includes one in its claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub principal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

impl CallerIdentity {
    /// Creates an identity without a credential id.
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            credential_id: None,
        }
    }

    /// Attaches a credential (API key) id.
    pub fn with_credential(mut self, credential_id: impl Into<String>) -> Self {
        self.credential_id = Some(credential_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case_and_skips_missing_credential() {
        let identity = CallerIdentity::new("u1");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json, serde_json::json!({"principalId": "u1"}));

        let identity = identity.with_credential("key-1");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["credentialId"], "key-1");
    }
}
