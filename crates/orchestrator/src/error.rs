use thiserror::Error;

use forge_core::CoreError;
use process::ProcessError;

use crate::state_machine::SessionState;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Session is busy; only one step may run at a time")]
    Busy,

    #[error("Build tool not installed or capabilities unknown")]
    ToolNotInstalled,

    #[error("No generator available to configure with")]
    NoGenerator,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Step {step} failed with exit code {code}")]
    StepFailed { step: SessionState, code: i32 },

    #[error("Invalid project: {0}")]
    InvalidSpec(#[from] CoreError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
