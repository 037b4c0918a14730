use std::fmt;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Probing,
    Generating,
    Configuring,
    Opening,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing_capabilities",
            Self::Generating => "generating",
            Self::Configuring => "configuring",
            Self::Opening => "opening_project",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn validate_transition(from: &SessionState, to: &SessionState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    // Any step may fall back to Idle on failure; only success advances
    // along the create-project chain.
    fn allowed_transitions(from: &SessionState) -> Vec<SessionState> {
        match from {
            SessionState::Idle => vec![SessionState::Probing, SessionState::Generating],
            SessionState::Probing => vec![SessionState::Idle],
            SessionState::Generating => vec![SessionState::Configuring, SessionState::Idle],
            SessionState::Configuring => vec![SessionState::Opening, SessionState::Idle],
            SessionState::Opening => vec![SessionState::Idle],
        }
    }

    pub fn can_transition(from: &SessionState, to: &SessionState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
