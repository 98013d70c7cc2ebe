// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Which side of a sync a credentials lookup was performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecipeError {
    /// A validator rejected a value. Fatal to the task, never sanitized.
    #[error("invalid {field}: '{value}'")]
    InvalidInput { field: &'static str, value: String },

    /// No known stack markers in the working tree. Fatal to the run.
    #[error("unknown project type: cannot determine from {}", dir.display())]
    UnknownProjectType { dir: PathBuf },

    #[error("could not extract {side} database credentials")]
    CredentialsNotFound { side: Side },

    #[error("required file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("command `{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid dependency manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid inventory {}: {reason}", path.display())]
    Inventory { path: PathBuf, reason: String },

    #[error("host '{0}' is not defined in the inventory")]
    UnknownHost(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RecipeError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        RecipeError::InvalidInput {
            field,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecipeError>;
