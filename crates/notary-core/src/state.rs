//! Run state machine
//!
//! `COLLECTING → HASHING → ROOT_COMPUTED → ANCHORING → PINNING → PERSISTING → DONE`
//! with a terminal `FAILED(stage)` reachable from any non-terminal state.
//! An unchanged manifest short-circuits `ROOT_COMPUTED → DONE`.

use crate::error::NotaryError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Collecting,
    Hashing,
    RootComputed,
    Anchoring,
    Pinning,
    Persisting,
    Done,
    Failed(FailedAt),
}

/// Stage a failed run stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailedAt {
    Collecting,
    Hashing,
    RootComputed,
    Anchoring,
    Pinning,
    Persisting,
}

impl RunState {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// The `FAILED` state for this stage, if it is non-terminal
    #[must_use]
    pub fn failed(self) -> Option<Self> {
        let at = match self {
            Self::Collecting => FailedAt::Collecting,
            Self::Hashing => FailedAt::Hashing,
            Self::RootComputed => FailedAt::RootComputed,
            Self::Anchoring => FailedAt::Anchoring,
            Self::Pinning => FailedAt::Pinning,
            Self::Persisting => FailedAt::Persisting,
            Self::Done | Self::Failed(_) => return None,
        };
        Some(Self::Failed(at))
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collecting => f.write_str("COLLECTING"),
            Self::Hashing => f.write_str("HASHING"),
            Self::RootComputed => f.write_str("ROOT_COMPUTED"),
            Self::Anchoring => f.write_str("ANCHORING"),
            Self::Pinning => f.write_str("PINNING"),
            Self::Persisting => f.write_str("PERSISTING"),
            Self::Done => f.write_str("DONE"),
            Self::Failed(at) => write!(f, "FAILED({at})"),
        }
    }
}

impl Display for FailedAt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stage: RunState = (*self).into();
        Display::fmt(&stage, f)
    }
}

impl From<FailedAt> for RunState {
    fn from(at: FailedAt) -> Self {
        match at {
            FailedAt::Collecting => Self::Collecting,
            FailedAt::Hashing => Self::Hashing,
            FailedAt::RootComputed => Self::RootComputed,
            FailedAt::Anchoring => Self::Anchoring,
            FailedAt::Pinning => Self::Pinning,
            FailedAt::Persisting => Self::Persisting,
        }
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::*;
    let mut next = match from {
        Collecting => vec![Hashing],
        Hashing => vec![RootComputed],
        RootComputed => vec![Anchoring, Done],
        Anchoring => vec![Pinning],
        Pinning => vec![Persisting],
        Persisting => vec![Done],
        Done | Failed(_) => vec![],
    };
    next.extend(from.failed());
    next
}

/// Validate a state transition
///
/// # Errors
/// Returns [`NotaryError::IllegalTransition`] if `to` is not reachable from
/// `from` in one step
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), NotaryError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(NotaryError::IllegalTransition { from, to })
    }
}

/// Current state plus the trail of states a run went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTracker {
    trail: Vec<RunState>,
}

impl RunTracker {
    /// Start in `COLLECTING`
    #[must_use]
    pub fn new() -> Self {
        Self {
            trail: vec![RunState::Collecting],
        }
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> RunState {
        self.trail
            .last()
            .copied()
            .unwrap_or(RunState::Collecting)
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns error if the transition is illegal; the state is unchanged
    pub fn advance(&mut self, to: RunState) -> Result<(), NotaryError> {
        let from = self.current();
        validate_transition(from, to)?;
        tracing::debug!("run state {} -> {}", from, to);
        self.trail.push(to);
        Ok(())
    }

    /// Move to `FAILED(current)`; no-op if already terminal
    pub fn fail(&mut self) {
        if let Some(failed) = self.current().failed() {
            self.trail.push(failed);
        }
    }

    /// Every state visited, in order
    #[must_use]
    pub fn trail(&self) -> &[RunState] {
        &self.trail
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let mut tracker = RunTracker::new();
        for next in [
            RunState::Hashing,
            RunState::RootComputed,
            RunState::Anchoring,
            RunState::Pinning,
            RunState::Persisting,
            RunState::Done,
        ] {
            tracker.advance(next).unwrap();
        }
        assert!(tracker.current().is_terminal());
        assert_eq!(tracker.trail().len(), 7);
    }

    #[test]
    fn unchanged_short_circuit_is_legal() {
        assert!(validate_transition(RunState::RootComputed, RunState::Done).is_ok());
    }

    #[test]
    fn skipping_stages_is_rejected() {
        assert!(validate_transition(RunState::Collecting, RunState::RootComputed).is_err());
        assert!(validate_transition(RunState::Hashing, RunState::Persisting).is_err());
        assert!(validate_transition(RunState::Anchoring, RunState::Done).is_err());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_transitions(RunState::Done).is_empty());
        assert!(allowed_transitions(RunState::Failed(FailedAt::Pinning)).is_empty());
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for state in [
            RunState::Collecting,
            RunState::Hashing,
            RunState::RootComputed,
            RunState::Anchoring,
            RunState::Pinning,
            RunState::Persisting,
        ] {
            let failed = state.failed().unwrap();
            assert!(validate_transition(state, failed).is_ok(), "{state}");
        }
    }

    #[test]
    fn fail_records_stage() {
        let mut tracker = RunTracker::new();
        tracker.advance(RunState::Hashing).unwrap();
        tracker.fail();
        assert_eq!(tracker.current(), RunState::Failed(FailedAt::Hashing));
        assert_eq!(tracker.current().to_string(), "FAILED(HASHING)");
        tracker.fail();
        assert_eq!(tracker.trail().len(), 3);
    }

    #[test]
    fn illegal_advance_leaves_state() {
        let mut tracker = RunTracker::new();
        assert!(tracker.advance(RunState::Done).is_err());
        assert_eq!(tracker.current(), RunState::Collecting);
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&RunState::RootComputed).unwrap();
        assert_eq!(json, "\"ROOT_COMPUTED\"");
    }
}
