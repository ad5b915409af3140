//! Error types for the GraphRAG command-line front end.

use graphrag_core::{ErrorKind, GraphRagError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] GraphRagError),

    #[error("Invalid feed {path}, line {line}: {message}")]
    InvalidFeed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(e) => match e.kind() {
                ErrorKind::Configuration => 2,
                ErrorKind::Cancelled => 130,
                _ => 1,
            },
            CliError::InvalidFeed { .. } | CliError::InvalidArgument(_) => 2,
            CliError::Json(_) | CliError::Io(_) => 1,
        }
    }
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
