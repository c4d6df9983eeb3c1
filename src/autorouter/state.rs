//! Run state machine for one `(sample_id, autorouter_id)` pair.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AutorouterError;

/// State of an autorouter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Allowed state transitions.
///
/// - Pending -> Running
/// - Running -> Succeeded
/// - Running -> Failed
pub struct RunTransitions {
    valid_transitions: HashMap<RunState, Vec<RunState>>,
}

impl RunTransitions {
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();
        valid_transitions.insert(RunState::Pending, vec![RunState::Running]);
        valid_transitions.insert(
            RunState::Running,
            vec![RunState::Succeeded, RunState::Failed],
        );
        valid_transitions.insert(RunState::Succeeded, vec![]);
        valid_transitions.insert(RunState::Failed, vec![]);
        Self { valid_transitions }
    }

    pub fn can_transition(&self, from: RunState, to: RunState) -> bool {
        self.valid_transitions
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }
}

impl Default for RunTransitions {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one run and the timestamped states it passed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutorouterRun {
    pub sample_id: String,
    pub autorouter_id: String,
    state: RunState,
    history: Vec<(RunState, DateTime<Utc>)>,
    /// Failure reason once the run is `Failed`.
    pub failure: Option<String>,
}

impl AutorouterRun {
    pub fn new(sample_id: impl Into<String>, autorouter_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            autorouter_id: autorouter_id.into(),
            state: RunState::Pending,
            history: vec![(RunState::Pending, Utc::now())],
            failure: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[(RunState, DateTime<Utc>)] {
        &self.history
    }

    /// Moves to `to` if the transition table allows it.
    pub fn transition(
        &mut self,
        transitions: &RunTransitions,
        to: RunState,
    ) -> Result<(), AutorouterError> {
        if !transitions.can_transition(self.state, to) {
            return Err(AutorouterError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.history.push((to, Utc::now()));
        Ok(())
    }

    /// Moves to `Failed`, recording `reason`.
    pub fn fail(
        &mut self,
        transitions: &RunTransitions,
        reason: impl Into<String>,
    ) -> Result<(), AutorouterError> {
        self.transition(transitions, RunState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        let t = RunTransitions::new();
        assert!(t.can_transition(RunState::Pending, RunState::Running));
        assert!(t.can_transition(RunState::Running, RunState::Succeeded));
        assert!(t.can_transition(RunState::Running, RunState::Failed));

        assert!(!t.can_transition(RunState::Pending, RunState::Succeeded));
        assert!(!t.can_transition(RunState::Succeeded, RunState::Running));
        assert!(!t.can_transition(RunState::Failed, RunState::Pending));
    }

    #[test]
    fn test_run_records_history() {
        let t = RunTransitions::new();
        let mut run = AutorouterRun::new("sample-1", "freerouting");
        run.transition(&t, RunState::Running).unwrap();
        run.transition(&t, RunState::Succeeded).unwrap();

        let states: Vec<RunState> = run.history().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            states,
            vec![RunState::Pending, RunState::Running, RunState::Succeeded]
        );
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let t = RunTransitions::new();
        let mut run = AutorouterRun::new("sample-1", "freerouting");
        run.transition(&t, RunState::Running).unwrap();
        run.fail(&t, "timeout").unwrap();
        assert_eq!(run.failure.as_deref(), Some("timeout"));

        let err = run.transition(&t, RunState::Running).unwrap_err();
        assert!(matches!(
            err,
            AutorouterError::InvalidTransition { ref from, ref to } if from == "failed" && to == "running"
        ));
        assert_eq!(run.history().len(), 3);
    }
}
