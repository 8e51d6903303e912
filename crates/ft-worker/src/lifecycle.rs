//! Worker lifecycle states.

use std::fmt;

use crate::error::{Result, WorkerError};

/// Where a worker instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkerState {
    /// Script evaluated, install not started yet.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed and waiting for `SKIP_WAITING`.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced or failed.
    Redundant,
}

impl WorkerState {
    /// Lowercase name, as the platform reports it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }

    /// Whether this worker is waiting to be released.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        *self == Self::Installed
    }

    /// Whether this worker intercepts fetches.
    #[must_use]
    pub fn is_controlling(&self) -> bool {
        *self == Self::Activated
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from -> to` is a legal lifecycle step.
///
/// There is no `Installing -> Activating` edge: a freshly installed worker
/// always waits until a page releases it.
#[must_use]
pub fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::{Activated, Activating, Installed, Installing, Parsed, Redundant};

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Installed, Redundant)
            | (Activating, Activated)
            | (Activating, Redundant)
            | (Activated, Redundant)
    )
}

/// Step `state` to `to`, rejecting illegal transitions.
pub fn transition(state: &mut WorkerState, to: WorkerState) -> Result<WorkerState> {
    let from = *state;
    if !is_valid_transition(from, to) {
        return Err(WorkerError::InvalidStateTransition { from, to });
    }
    *state = to;
    tracing::debug!("Worker state {} -> {}", from, to);
    Ok(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = WorkerState::default();
        for next in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            transition(&mut state, next).unwrap();
        }
        assert!(state.is_controlling());
    }

    #[test]
    fn test_no_automatic_activation() {
        assert!(!is_valid_transition(WorkerState::Installing, WorkerState::Activating));
        assert!(!is_valid_transition(WorkerState::Installing, WorkerState::Activated));
    }

    #[test]
    fn test_rejected_transition_leaves_state() {
        let mut state = WorkerState::Installed;
        assert!(state.is_waiting());
        let err = transition(&mut state, WorkerState::Activated).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::InvalidStateTransition {
                from: WorkerState::Installed,
                to: WorkerState::Activated
            }
        ));
        assert_eq!(state, WorkerState::Installed);
    }

    #[test]
    fn test_redundant_is_terminal() {
        for to in [
            WorkerState::Parsed,
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            assert!(!is_valid_transition(WorkerState::Redundant, to));
        }
    }
}
