//! Run status transition validation.

use crate::error::StateError;
use crate::status::RunStatus;

/// Returns `true` if the transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    matches!(
        (from, to),
        (RunStatus::Created, RunStatus::Running)
            | (RunStatus::Running, RunStatus::Completed)
            | (RunStatus::Running, RunStatus::Failed)
            | (RunStatus::Running, RunStatus::Cancelled)
            | (RunStatus::Running, RunStatus::LimitExceeded)
    )
}

/// Validate a transition, returning an error if invalid.
pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), StateError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(StateError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
