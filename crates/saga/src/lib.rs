//! Saga orchestration for multi-step operations against independent systems.
//!
//! A saga is a fixed, linear list of steps. Each step pairs an `execute`
//! action with a `compensate` action. Steps run strictly one after another;
//! if step *k* fails, steps *k-1 .. 0* are compensated in reverse order and
//! the original error from step *k* is returned to the caller.
//!
//! Saga progress lives only in memory for the duration of one invocation.

pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod state;
pub mod step;

pub use error::{CompensationFailure, SagaError};
pub use execution::SagaExecution;
pub use orchestrator::{SagaBuilder, SagaOrchestrator, SagaReport};
pub use state::SagaState;
pub use step::{FnStep, SagaStep, step};
