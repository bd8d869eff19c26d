//! The seam between inbound adapters and domain logic.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;

/// A domain operation invoked once per validated input.
#[async_trait]
pub trait UseCase<I: Send + 'static>: Send + Sync {
    /// The value handed to the response formatter (HTTP) or dropped (queue).
    type Output: Send;

    /// Runs the operation.
    async fn execute(&self, input: I) -> Result<Self::Output, AppError>;
}

#[async_trait]
impl<I, U> UseCase<I> for Arc<U>
where
    I: Send + 'static,
    U: UseCase<I> + ?Sized,
{
    type Output = U::Output;

    async fn execute(&self, input: I) -> Result<Self::Output, AppError> {
        (**self).execute(input).await
    }
}

/// A use case backed by an async closure.
pub struct FnUseCase<F> {
    f: F,
}

/// Wraps an async closure as a [`UseCase`].
pub fn use_case_fn<F>(f: F) -> FnUseCase<F> {
    FnUseCase { f }
}

#[async_trait]
impl<I, O, F, Fut> UseCase<I> for FnUseCase<F>
where
    I: Send + 'static,
    O: Send,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, AppError>> + Send,
{
    type Output = O;

    async fn execute(&self, input: I) -> Result<O, AppError> {
        (self.f)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_use_case_runs_closure() {
        let double = use_case_fn(|n: u32| async move { Ok::<_, AppError>(n * 2) });
        assert_eq!(double.execute(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_arc_forwards() {
        let shared = Arc::new(use_case_fn(|s: String| async move {
            Err::<(), _>(AppError::NotFound(s))
        }));
        let err = shared.execute("missing".to_string()).await.unwrap_err();
        assert_eq!(err, AppError::NotFound("missing".to_string()));
    }
}
