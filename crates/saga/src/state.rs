//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Reserving ──┬──► Completed
///                            └──► Compensating ──► Failed
/// ```
/// A saga that fails before its order is persisted goes straight from
/// `NotStarted` to `Failed`, since there is nothing to compensate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Order not persisted yet.
    #[default]
    NotStarted,

    /// Order persisted, stock being reserved.
    Reserving,

    /// A reservation failed and reserved lines are being released.
    Compensating,

    /// All lines reserved and the order confirmed (terminal state).
    Completed,

    /// The order was rejected (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if reservations may start.
    pub fn can_reserve(&self) -> bool {
        matches!(self, SagaState::NotStarted)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Reserving)
    }

    /// Returns true if the saga can complete successfully.
    pub fn can_complete(&self) -> bool {
        matches!(self, SagaState::Reserving)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Reserving => "Reserving",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_not_started() {
        assert_eq!(SagaState::default(), SagaState::NotStarted);
    }

    #[test]
    fn test_can_reserve() {
        assert!(SagaState::NotStarted.can_reserve());
        assert!(!SagaState::Reserving.can_reserve());
        assert!(!SagaState::Compensating.can_reserve());
        assert!(!SagaState::Completed.can_reserve());
        assert!(!SagaState::Failed.can_reserve());
    }

    #[test]
    fn test_can_compensate_and_complete_only_while_reserving() {
        for state in [
            SagaState::NotStarted,
            SagaState::Compensating,
            SagaState::Completed,
            SagaState::Failed,
        ] {
            assert!(!state.can_compensate());
            assert!(!state.can_complete());
        }
        assert!(SagaState::Reserving.can_compensate());
        assert!(SagaState::Reserving.can_complete());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::NotStarted.is_terminal());
        assert!(!SagaState::Reserving.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::Reserving.to_string(), "Reserving");
        assert_eq!(SagaState::Compensating.to_string(), "Compensating");
    }
}
