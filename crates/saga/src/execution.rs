//! Per-invocation saga bookkeeping.

use crate::state::SagaState;

/// Progress of a single saga invocation.
///
/// Holds the outputs of the steps that completed, in order. The number of
/// completed steps always equals the number of stored outputs.
#[derive(Debug)]
pub struct SagaExecution<T> {
    step_count: usize,
    results: Vec<T>,
    state: SagaState,
}

impl<T> SagaExecution<T> {
    /// Create bookkeeping for a saga with `step_count` steps.
    pub fn new(step_count: usize) -> Self {
        Self {
            step_count,
            results: Vec::with_capacity(step_count),
            state: SagaState::NotStarted,
        }
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Number of steps whose `execute` succeeded.
    pub fn completed_count(&self) -> usize {
        self.results.len()
    }

    /// Outputs of the completed steps, in execution order.
    pub fn results(&self) -> &[T] {
        &self.results
    }

    fn transition(&mut self, next: SagaState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid saga transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    pub fn start(&mut self) {
        self.transition(SagaState::Running);
    }

    /// Record the output of the next step.
    pub fn record_success(&mut self, output: T) {
        debug_assert_eq!(self.state, SagaState::Running);
        debug_assert!(self.results.len() < self.step_count);
        self.results.push(output);
    }

    /// Mark the saga as finished once every step has completed.
    pub fn complete(&mut self) {
        debug_assert_eq!(self.results.len(), self.step_count);
        self.transition(SagaState::Completed);
    }

    pub fn begin_compensation(&mut self) {
        self.transition(SagaState::Compensating);
    }

    pub fn finish_compensation(&mut self) {
        self.transition(SagaState::Compensated);
    }

    /// Consume the execution and return the step outputs.
    pub fn into_results(self) -> Vec<T> {
        self.results
    }
}
