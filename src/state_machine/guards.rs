//! Transition table for the invocation lifecycle.
//!
//! Stores apply the same rules as conditional updates; the in-memory store and
//! the runner call [`InvocationTransitionGuard::target`] directly.

use super::events::InvocationEvent;
use super::states::InvocationStatus;
use crate::error::{ClearanceError, Result};

pub struct InvocationTransitionGuard;

impl InvocationTransitionGuard {
    /// Resolve the state `event` leads to from `from`, or explain why it cannot fire
    pub fn target(from: InvocationStatus, event: &InvocationEvent) -> Result<InvocationStatus> {
        use InvocationStatus::*;

        let target = match (from, event) {
            (Pending | Retry, InvocationEvent::Claim) => InProgress,
            (InProgress, InvocationEvent::Succeed) => Success,
            (InProgress, InvocationEvent::ScheduleRetry(_)) => Retry,
            (InProgress, InvocationEvent::GiveUp(_)) => PermanentlyFailed,
            (Retry, InvocationEvent::Requeue) => Pending,
            (Pending | Retry | Success, InvocationEvent::Rearm) => Pending,
            _ => {
                return Err(ClearanceError::StateTransitionError(format!(
                    "Cannot apply '{}' to invocation in state {from}",
                    event.event_type()
                )))
            }
        };

        Ok(target)
    }

    pub fn can_transition(from: InvocationStatus, event: &InvocationEvent) -> bool {
        Self::target(from, event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use InvocationStatus::*;

    #[test]
    fn test_claim_only_from_pending_or_retry() {
        assert_eq!(
            InvocationTransitionGuard::target(Pending, &InvocationEvent::Claim).unwrap(),
            InProgress
        );
        assert_eq!(
            InvocationTransitionGuard::target(Retry, &InvocationEvent::Claim).unwrap(),
            InProgress
        );
        for from in [InProgress, Success, PermanentlyFailed] {
            assert!(!InvocationTransitionGuard::can_transition(from, &InvocationEvent::Claim));
        }
    }

    #[test]
    fn test_attempt_outcomes_require_in_progress() {
        let retry = InvocationEvent::ScheduleRetry(Utc::now());
        assert_eq!(
            InvocationTransitionGuard::target(InProgress, &retry).unwrap(),
            Retry
        );
        assert!(!InvocationTransitionGuard::can_transition(Pending, &retry));
        assert!(!InvocationTransitionGuard::can_transition(
            Success,
            &InvocationEvent::Succeed
        ));
    }

    #[test]
    fn test_permanently_failed_is_never_rearmed_or_requeued() {
        assert!(!InvocationTransitionGuard::can_transition(
            PermanentlyFailed,
            &InvocationEvent::Requeue
        ));
        assert!(!InvocationTransitionGuard::can_transition(
            PermanentlyFailed,
            &InvocationEvent::Rearm
        ));
    }

    #[test]
    fn test_requeue_only_from_retry() {
        assert!(InvocationTransitionGuard::can_transition(Retry, &InvocationEvent::Requeue));
        assert!(!InvocationTransitionGuard::can_transition(
            Success,
            &InvocationEvent::Requeue
        ));
        let err = InvocationTransitionGuard::target(InProgress, &InvocationEvent::Requeue)
            .unwrap_err();
        assert!(err.to_string().contains("requeue"));
    }

    #[test]
    fn test_rearm_from_success_for_next_poll_cycle() {
        assert_eq!(
            InvocationTransitionGuard::target(Success, &InvocationEvent::Rearm).unwrap(),
            Pending
        );
        assert!(!InvocationTransitionGuard::can_transition(
            InProgress,
            &InvocationEvent::Rearm
        ));
    }
}
