//! Default queue message decoding.
//!
//! Two shapes are accepted, tried in this order:
//! - direct: `{"payload": {...}}`
//! - wrapped by a fan-out topic: `{"Message": "<json string of the direct shape>"}`
//!
//! Exactly one level of wrapping is removed. Anything else is rejected.

use common::AppError;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::queue::QueueRecord;

#[derive(Deserialize)]
struct Direct {
    payload: Map<String, Value>,
}

#[derive(Deserialize)]
struct Wrapped {
    #[serde(rename = "Message")]
    message: String,
}

fn unrecognized() -> AppError {
    AppError::bad_request("Unrecognized message format")
}

fn decode_direct(body: &Value) -> Option<Value> {
    Direct::deserialize(body)
        .ok()
        .map(|direct| Value::Object(direct.payload))
}

/// Decodes the domain payload carried by a queue record.
pub fn extract_payload(record: &QueueRecord) -> Result<Value, AppError> {
    let body: Value = serde_json::from_str(&record.body).map_err(|_| unrecognized())?;

    if let Some(payload) = decode_direct(&body) {
        return Ok(payload);
    }

    let wrapped = Wrapped::deserialize(&body).map_err(|_| unrecognized())?;
    let inner: Value = serde_json::from_str(&wrapped.message).map_err(|_| unrecognized())?;
    decode_direct(&inner).ok_or_else(unrecognized)
}
