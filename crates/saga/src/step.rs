//! Saga step abstraction.

use std::future::Future;

use async_trait::async_trait;

/// One step of a saga.
///
/// `execute` receives the outputs of all previously completed steps, in
/// order, and returns this step's output. `compensate` receives that output
/// back if a later step fails and must undo whatever `execute` did.
#[async_trait]
pub trait SagaStep<T, E>: Send + Sync
where
    T: Send + Sync,
{
    /// Step name used in logs and reports.
    fn name(&self) -> &str;

    /// Perform the step's side effect.
    async fn execute(&self, completed: &[T]) -> Result<T, E>;

    /// Undo the side effect recorded in `output`.
    async fn compensate(&self, output: &T) -> Result<(), E>;
}

/// A saga step built from a pair of closures.
///
/// The closures return owned futures, so anything a future needs from the
/// borrowed arguments has to be cloned out before the `async move` block.
pub struct FnStep<X, C> {
    name: String,
    execute: X,
    compensate: C,
}

/// Build a step from an execute closure and a compensate closure.
pub fn step<X, C>(name: impl Into<String>, execute: X, compensate: C) -> FnStep<X, C> {
    FnStep {
        name: name.into(),
        execute,
        compensate,
    }
}

#[async_trait]
impl<T, E, X, XFut, C, CFut> SagaStep<T, E> for FnStep<X, C>
where
    T: Send + Sync,
    E: Send,
    X: Fn(&[T]) -> XFut + Send + Sync,
    XFut: Future<Output = Result<T, E>> + Send,
    C: Fn(&T) -> CFut + Send + Sync,
    CFut: Future<Output = Result<(), E>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, completed: &[T]) -> Result<T, E> {
        (self.execute)(completed).await
    }

    async fn compensate(&self, output: &T) -> Result<(), E> {
        (self.compensate)(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_step_sees_previous_outputs() {
        let s: Box<dyn SagaStep<u32, String>> = Box::new(step(
            "sum",
            |done: &[u32]| {
                let total: u32 = done.iter().sum();
                async move { Ok::<_, String>(total + 1) }
            },
            |_: &u32| async { Ok::<_, String>(()) },
        ));

        assert_eq!(s.name(), "sum");
        assert_eq!(s.execute(&[2, 3]).await, Ok(6));
        assert_eq!(s.compensate(&6).await, Ok(()));
    }
}
