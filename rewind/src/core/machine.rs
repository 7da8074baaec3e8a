//! State machine for a single mutation attempt.
//!
//! ```text
//! Start --Guarded--> Generating --Generated--> Applied --Verified--> Done
//!                        |                        |
//!                        | GenerationFailed        | VerificationFailed
//!                        | Cancelled               | Cancelled
//!                        v                        v
//!                      Failed                 RollingBack --Restored--> RolledBack
//! ```
//!
//! The controller feeds events through [`StateTrail::advance`], which rejects any
//! transition outside this table. Terminal states accept no further events.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::AttemptOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Start,
    Generating,
    Applied,
    RollingBack,
    Done,
    RolledBack,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Done | AttemptState::RolledBack | AttemptState::Failed
        )
    }

    /// Terminal projection, or `None` while the attempt is in flight.
    pub fn outcome(self) -> Option<AttemptOutcome> {
        match self {
            AttemptState::Done => Some(AttemptOutcome::Done),
            AttemptState::RolledBack => Some(AttemptOutcome::RolledBack),
            AttemptState::Failed => Some(AttemptOutcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Start => "START",
            AttemptState::Generating => "GENERATING",
            AttemptState::Applied => "APPLIED",
            AttemptState::RollingBack => "ROLLING_BACK",
            AttemptState::Done => "DONE",
            AttemptState::RolledBack => "ROLLED_BACK",
            AttemptState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    /// Guard finished and the baseline is captured.
    Guarded,
    /// Content was produced and written to the target.
    Generated,
    /// Generation or apply failed; nothing was written.
    GenerationFailed,
    Verified,
    VerificationFailed,
    /// The operator cancelled the attempt.
    Cancelled,
    /// The target is back at its baseline.
    Restored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: AttemptState,
    pub event: AttemptEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition from {} on {:?}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

/// Compute the state that follows `from` on `event`.
pub fn next_state(from: AttemptState, event: AttemptEvent) -> Result<AttemptState, TransitionError> {
    use AttemptEvent as E;
    use AttemptState as S;

    let next = match (from, event) {
        (S::Start, E::Guarded) => S::Generating,
        (S::Generating, E::Generated) => S::Applied,
        (S::Generating, E::GenerationFailed | E::Cancelled) => S::Failed,
        (S::Applied, E::Verified) => S::Done,
        (S::Applied, E::VerificationFailed | E::Cancelled) => S::RollingBack,
        (S::RollingBack, E::Restored) => S::RolledBack,
        _ => return Err(TransitionError { from, event }),
    };
    Ok(next)
}

/// Ordered record of the states an attempt passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTrail {
    states: Vec<AttemptState>,
}

impl Default for StateTrail {
    fn default() -> Self {
        Self {
            states: vec![AttemptState::Start],
        }
    }
}

impl StateTrail {
    pub fn current(&self) -> AttemptState {
        // Never empty: constructed with `Start` and only ever pushed to.
        self.states
            .last()
            .copied()
            .unwrap_or(AttemptState::Start)
    }

    pub fn advance(&mut self, event: AttemptEvent) -> Result<AttemptState, TransitionError> {
        let next = next_state(self.current(), event)?;
        self.states.push(next);
        Ok(next)
    }

    pub fn states(&self) -> &[AttemptState] {
        &self.states
    }

    pub fn render(&self) -> String {
        render_states(&self.states)
    }
}

/// Render as `START -> GENERATING -> ...` for operator output.
pub fn render_states(states: &[AttemptState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
