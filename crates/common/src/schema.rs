//! Input schemas.
//!
//! A schema is a `Deserialize` type that also implements [`Validate`].
//! [`parse_input`] turns an untyped candidate into a validated value or a
//! [`AppError::Validation`] enumerating every violated field.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, FieldError};

/// Field-level rules that go beyond what deserialization enforces.
pub trait Validate {
    /// Checks the value, returning every violated field.
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

impl Validate for Value {}

/// Accumulates field violations.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    /// Creates an empty set of violations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldError::new(field, message));
        }
        self
    }

    /// Records a violation when `value` is empty or only whitespace.
    pub fn non_blank(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "must not be blank")
    }

    /// Records a violation when `value` is longer than `max` characters.
    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        let ok = value.chars().count() <= max;
        self.check(ok, field, &format!("must be at most {max} characters"))
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts into the [`Validate::validate`] result.
    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

/// Deserializes `candidate` into `T` and runs its validation rules.
pub fn parse_input<T>(candidate: Value) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    let input: T = serde_json::from_value(candidate)
        .map_err(|e| AppError::validation("Validation failed", vec![field_error_from_serde(&e)]))?;

    input
        .validate()
        .map_err(|errors| AppError::validation("Validation failed", errors))?;

    Ok(input)
}

/// Maps a serde error to a field entry. serde_json names the field in
/// backticks for missing/unknown fields; other errors are attributed to
/// the input as a whole.
fn field_error_from_serde(err: &serde_json::Error) -> FieldError {
    let message = err.to_string();
    let named = ["missing field `", "unknown field `"]
        .iter()
        .find_map(|prefix| message.strip_prefix(prefix))
        .and_then(|rest| rest.split('`').next());

    match named {
        Some(field) => FieldError::new(field, message.clone()),
        None => FieldError::new("input", message),
    }
}
