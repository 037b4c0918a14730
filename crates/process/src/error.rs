use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Executable not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
