//! Shared building blocks for the serverless backend.
//!
//! This crate holds the pieces every other crate agrees on:
//! - [`AppError`], the outward error taxonomy consumed by the adapters
//! - [`CallerIdentity`], the verified principal of an invocation
//! - [`Validate`] and [`parse_input`] for schema-checked inputs
//! - [`UseCase`], the seam between inbound adapters and domain logic
//! - [`RetryPolicy`], fixed-delay retry for transient upstream failures

pub mod error;
pub mod identity;
pub mod retry;
pub mod schema;
pub mod types;
pub mod use_case;

pub use error::{AppError, ErrorKind, FieldError};
pub use identity::CallerIdentity;
pub use retry::{RetryAttempt, RetryPolicy, Retryable};
pub use schema::{Validate, Violations, parse_input};
pub use types::EntityId;
pub use use_case::{FnUseCase, UseCase, use_case_fn};
