//! External collaborators reached by the use cases.
//!
//! Each collaborator is a trait with an in-memory implementation used for
//! local runs and tests. Handles are injected explicitly; nothing here is a
//! global.

pub mod identity_provider;
pub mod key_management;
pub mod llm;
pub mod publisher;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use identity_provider::{IdentityProvider, InMemoryIdentityProvider, ProvisionedUser};
pub use key_management::{ApiKey, InMemoryKeyManagement, KeyManagement};
pub use llm::{Completion, InMemoryLlmProvider, LlmProvider};
pub use publisher::{InMemoryPublisher, MessagePublisher};

/// Locks in-memory state. A panic while holding the lock cannot leave the
/// maps half-written, so a poisoned lock is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
