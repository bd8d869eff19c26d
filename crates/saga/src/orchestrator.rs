//! Saga orchestrator: runs steps in order and rolls back on failure.

use std::fmt::Display;
use std::time::Instant;

use common::EntityId;

use crate::error::{CompensationFailure, SagaError};
use crate::execution::SagaExecution;
use crate::state::SagaState;
use crate::step::SagaStep;

/// Summary of one saga invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaReport {
    /// Correlation id for this invocation's log lines.
    pub saga_id: EntityId,
    pub state: SagaState,
    /// Number of steps whose `execute` succeeded.
    pub completed_count: usize,
    /// Names of the steps that were compensated successfully, in rollback order.
    pub compensated: Vec<String>,
    pub compensation_failures: Vec<CompensationFailure>,
}

/// Builder for [`SagaOrchestrator`].
pub struct SagaBuilder<T, E> {
    name: String,
    steps: Vec<Box<dyn SagaStep<T, E>>>,
}

impl<T, E> SagaBuilder<T, E>
where
    T: Send + Sync,
{
    /// Append a step. Steps run in the order they are added.
    pub fn step(mut self, step: impl SagaStep<T, E> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn build(self) -> Result<SagaOrchestrator<T, E>, SagaError> {
        if self.steps.is_empty() {
            return Err(SagaError::NoSteps(self.name));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if self.steps[..index].iter().any(|s| s.name() == step.name()) {
                return Err(SagaError::DuplicateStep {
                    saga: self.name,
                    step: step.name().to_string(),
                });
            }
        }
        Ok(SagaOrchestrator {
            name: self.name,
            steps: self.steps,
        })
    }
}

/// Executes a fixed, linear list of saga steps.
///
/// Steps run strictly sequentially. When step *k* fails, steps *k-1* down to
/// *0* are compensated in descending order; the failing step itself is never
/// compensated. A failing compensation is logged and rollback continues.
/// The original error from step *k* is returned unchanged.
pub struct SagaOrchestrator<T, E> {
    name: String,
    steps: Vec<Box<dyn SagaStep<T, E>>>,
}

impl<T, E> SagaOrchestrator<T, E>
where
    T: Send + Sync,
    E: Display + Send,
{
    pub fn builder(name: impl Into<String>) -> SagaBuilder<T, E> {
        SagaBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the saga and return the outputs of every step, in order.
    pub async fn execute(&self) -> Result<Vec<T>, E> {
        self.execute_with_report().await.1
    }

    /// Run the saga, returning a report alongside the result.
    #[tracing::instrument(skip(self), fields(saga = %self.name, saga_id))]
    pub async fn execute_with_report(&self) -> (SagaReport, Result<Vec<T>, E>) {
        let saga_id = EntityId::new();
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));
        metrics::counter!("saga_executions_total", "saga" => self.name.clone()).increment(1);
        let start = Instant::now();

        let mut execution = SagaExecution::new(self.steps.len());
        execution.start();

        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(step = step.name(), index, "executing saga step");

            match step.execute(execution.results()).await {
                Ok(output) => execution.record_success(output),
                Err(err) => {
                    tracing::warn!(
                        step = step.name(),
                        index,
                        error = %err,
                        "saga step failed, compensating"
                    );
                    execution.begin_compensation();
                    let (compensated, compensation_failures) = self.compensate(&execution).await;
                    execution.finish_compensation();

                    metrics::counter!("saga_compensated_total", "saga" => self.name.clone())
                        .increment(1);
                    self.record_duration(start);

                    let report = SagaReport {
                        saga_id,
                        state: execution.state(),
                        completed_count: execution.completed_count(),
                        compensated,
                        compensation_failures,
                    };
                    return (report, Err(err));
                }
            }
        }

        execution.complete();
        metrics::counter!("saga_completed_total", "saga" => self.name.clone()).increment(1);
        self.record_duration(start);
        tracing::info!(%saga_id, steps = self.steps.len(), "saga completed");

        let report = SagaReport {
            saga_id,
            state: execution.state(),
            completed_count: execution.completed_count(),
            compensated: Vec::new(),
            compensation_failures: Vec::new(),
        };
        (report, Ok(execution.into_results()))
    }

    async fn compensate(
        &self,
        execution: &SagaExecution<T>,
    ) -> (Vec<String>, Vec<CompensationFailure>) {
        let mut compensated = Vec::new();
        let mut failures = Vec::new();

        for index in (0..execution.completed_count()).rev() {
            let step = &self.steps[index];
            let output = &execution.results()[index];

            match step.compensate(output).await {
                Ok(()) => {
                    tracing::info!(step = step.name(), index, "saga step compensated");
                    compensated.push(step.name().to_string());
                }
                Err(err) => {
                    tracing::error!(
                        step = step.name(),
                        index,
                        error = %err,
                        "saga compensation failed, continuing rollback"
                    );
                    metrics::counter!(
                        "saga_compensation_failures_total",
                        "saga" => self.name.clone(),
                        "step" => step.name().to_string()
                    )
                    .increment(1);
                    failures.push(CompensationFailure {
                        step: step.name().to_string(),
                        index,
                        reason: err.to_string(),
                    });
                }
            }
        }

        (compensated, failures)
    }

    fn record_duration(&self, start: Instant) {
        metrics::histogram!("saga_duration_seconds", "saga" => self.name.clone())
            .record(start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::step;

    #[test]
    fn test_build_rejects_empty_saga() {
        let result = SagaOrchestrator::<u32, String>::builder("empty").build();
        assert!(matches!(result, Err(SagaError::NoSteps(name)) if name == "empty"));
    }

    #[test]
    fn test_build_rejects_duplicate_step_names() {
        let noop = || {
            step(
                "same",
                |_: &[u32]| async { Ok::<_, String>(1) },
                |_: &u32| async { Ok::<_, String>(()) },
            )
        };
        let result = SagaOrchestrator::builder("dup")
            .step(noop())
            .step(noop())
            .build();
        assert!(matches!(result, Err(SagaError::DuplicateStep { step, .. }) if step == "same"));
    }

    #[tokio::test]
    async fn test_single_step_failure_compensates_nothing() {
        let saga = SagaOrchestrator::builder("one")
            .step(step(
                "only",
                |_: &[u32]| async { Err::<u32, _>("boom".to_string()) },
                |_: &u32| async { Err::<(), _>("failing step must not be compensated".to_string()) },
            ))
            .build()
            .unwrap();

        let (report, result) = saga.execute_with_report().await;
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(report.state, SagaState::Compensated);
        assert_eq!(report.completed_count, 0);
        assert!(report.compensated.is_empty());
        assert!(report.compensation_failures.is_empty());
    }

    #[tokio::test]
    async fn test_results_chain_between_steps() {
        let saga = SagaOrchestrator::builder("chain")
            .step(step(
                "first",
                |_: &[u32]| async { Ok::<_, String>(10) },
                |_: &u32| async { Ok::<_, String>(()) },
            ))
            .step(step(
                "second",
                |done: &[u32]| {
                    let prev = done[0];
                    async move { Ok::<_, String>(prev * 2) }
                },
                |_: &u32| async { Ok::<_, String>(()) },
            ))
            .build()
            .unwrap();

        assert_eq!(saga.step_names(), vec!["first", "second"]);
        assert_eq!(saga.execute().await, Ok(vec![10, 20]));
    }
}
