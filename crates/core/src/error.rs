// Central Error Type for the Application (orchestration around SysExec)

use thiserror::Error;

use crate::domain::SysExecError;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hook `{command}` failed: {source}")]
    Hook {
        command: String,
        #[source]
        source: SysExecError<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
