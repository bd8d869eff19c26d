//! Lifecycle of one saga invocation.

/// Where a saga invocation is in its lifecycle.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Compensated
/// ```
///
/// `Compensated` ends the invocation without success; the error that
/// triggered the rollback is what the caller receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    /// Undoing the completed steps after a failure.
    Compensating,
    Completed,
    Compensated,
}

impl SagaState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Completed)
                | (Running, Compensating)
                | (Compensating, Compensated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Compensated)
    }

    /// Snake-case name, used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            SagaState::NotStarted => "not_started",
            SagaState::Running => "running",
            SagaState::Compensating => "compensating",
            SagaState::Completed => "completed",
            SagaState::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SagaState::{self, *};

    const ALL: [SagaState; 5] = [NotStarted, Running, Compensating, Completed, Compensated];

    #[test]
    fn test_only_lifecycle_edges_are_allowed() {
        let allowed = [
            (NotStarted, Running),
            (Running, Completed),
            (Running, Compensating),
            (Compensating, Compensated),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_successor() {
        for state in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|next| !state.can_transition_to(*next)));
        }
        assert_eq!(ALL.iter().filter(|s| s.is_terminal()).count(), 2);
    }

    #[test]
    fn test_names() {
        assert_eq!(SagaState::default().to_string(), "not_started");
        assert_eq!(Compensated.as_str(), "compensated");
    }
}
