//! Route handlers.
//!
//! Business routes are thin: each hands a [`GatewayEvent`](crate::gateway::GatewayEvent)
//! to the request adapter stored in [`AppState`](crate::AppState).

pub mod accounts;
pub mod credits;
pub mod ops;
pub mod prompts;

use common::{AppError, CallerIdentity};
use serde_json::Value;

/// Stamps the caller's identity onto a candidate input.
///
/// `userId` and `keyId` always come from the identity, never from the client.
pub(crate) fn with_caller(
    mut candidate: Value,
    identity: Option<&CallerIdentity>,
) -> Result<Value, AppError> {
    let identity = identity
        .ok_or_else(|| AppError::Authentication("caller identity missing".to_string()))?;
    let fields = candidate
        .as_object_mut()
        .ok_or_else(|| AppError::bad_request("Request body must be a JSON object"))?;

    fields.insert(
        "userId".to_string(),
        Value::String(identity.principal_id.clone()),
    );
    match &identity.credential_id {
        Some(key_id) => fields.insert("keyId".to_string(), Value::String(key_id.clone())),
        None => fields.remove("keyId"),
    };
    Ok(candidate)
}
