//! Trial loop phases, transitions, and per-trial records.

use chrono::{DateTime, Utc};
use sdk::errors::ErrorReport;
use sdk::types::{Artifact, ExpertId, Verdict};
use serde::{Deserialize, Serialize};

/// Phase of the trial loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Experts contribute forward comments.
    Collaborating,
    /// The reducer builds the trial's artifact.
    Synthesizing,
    /// The artifact runs against the fixtures.
    Evaluating,
    /// Experts revise with the verdict in hand.
    Reflecting,
    /// Terminal.
    Done,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    /// Valid transitions from this phase.
    ///
    /// Besides the main cycle, an aborted trial may restart collaboration
    /// directly or end the session.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Collaborating => &[Self::Synthesizing, Self::Collaborating, Self::Done],
            Self::Synthesizing => &[Self::Evaluating, Self::Collaborating, Self::Done],
            Self::Evaluating => &[Self::Reflecting, Self::Done],
            Self::Reflecting => &[Self::Collaborating],
            Self::Done => &[],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collaborating => write!(f, "COLLABORATING"),
            Self::Synthesizing => write!(f, "SYNTHESIZING"),
            Self::Evaluating => write!(f, "EVALUATING"),
            Self::Reflecting => write!(f, "REFLECTING"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub trial: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Current phase of one session's loop
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: Phase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: Phase::Collaborating,
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(
        &mut self,
        to: Phase,
        trial: u32,
        reason: impl Into<String>,
    ) -> Result<Transition, TransitionError> {
        let from = self.phase;
        if !from.valid_transitions().contains(&to) {
            return Err(TransitionError { from, to });
        }
        self.phase = to;
        let transition = Transition {
            from,
            to,
            trial,
            reason: reason.into(),
            timestamp: Utc::now(),
        };
        tracing::info!(trial, "{} -> {}: {}", from, to, transition.reason);
        Ok(transition)
    }
}

/// What one iteration of the loop did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: u32,
    /// Experts whose forward comment made it into the pool, in order
    pub selected: Vec<ExpertId>,
    pub artifact: Option<Artifact>,
    pub verdict: Option<Verdict>,
    /// Trial-level failure, if the trial was cut short
    pub error: Option<ErrorReport>,
    pub transitions: Vec<Transition>,
}

impl TrialRecord {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            selected: Vec::new(),
            artifact: None,
            verdict: None,
            error: None,
            transitions: Vec::new(),
        }
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_cycle_is_valid() {
        let mut tracker = PhaseTracker::new();
        for to in [
            Phase::Synthesizing,
            Phase::Evaluating,
            Phase::Reflecting,
            Phase::Collaborating,
            Phase::Synthesizing,
            Phase::Done,
        ] {
            tracker.advance(to, 0, "test").unwrap();
        }
        assert!(tracker.phase().is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(Phase::Evaluating, 0, "skip").unwrap_err();
        assert_eq!(err.from, Phase::Collaborating);
        assert_eq!(err.to, Phase::Evaluating);
        assert_eq!(tracker.phase(), Phase::Collaborating);

        tracker.advance(Phase::Done, 0, "abort").unwrap();
        assert!(tracker.advance(Phase::Collaborating, 1, "again").is_err());
    }

    #[test]
    fn test_reflecting_only_returns_to_collaborating() {
        assert_eq!(Phase::Reflecting.valid_transitions(), &[Phase::Collaborating]);
        assert!(Phase::Done.valid_transitions().is_empty());
    }
}
