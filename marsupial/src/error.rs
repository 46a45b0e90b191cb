//! Error types for the marsupial bridge and build orchestrator

use std::path::PathBuf;

use thiserror::Error;

use crate::native::NativeError;

/// Result type alias for the marsupial library
pub type Result<T> = std::result::Result<T, MarsupialError>;

/// Errors that can occur while dispatching native calls or building the native library
#[derive(Error, Debug)]
pub enum MarsupialError {
    /// Failure reported by the native layer, carried through untouched
    #[error("{0}")]
    Native(NativeError),

    #[error("{tool} failed with exit code {}: {stderr}", format_exit_code(.exit_code))]
    BuildFailure {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Could not launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find file {}, even though build was successful", .0.display())]
    ArtifactMissing(PathBuf),

    /// The worker dropped its completion handle without resolving it
    #[error("Background worker terminated before completing: {0}")]
    WorkerLost(String),

    #[error("Bridge not initialized")]
    NotInitialized,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl MarsupialError {
    pub fn native<E: Into<NativeError>>(err: E) -> Self {
        Self::Native(err.into())
    }

    pub fn build_failure<T: Into<String>, S: Into<String>>(
        tool: T,
        exit_code: Option<i32>,
        stderr: S,
    ) -> Self {
        Self::BuildFailure {
            tool: tool.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn worker_lost<S: Into<String>>(msg: S) -> Self {
        Self::WorkerLost(msg.into())
    }

    /// The native payload, if this error came from the native layer
    pub fn as_native(&self) -> Option<&NativeError> {
        match self {
            Self::Native(err) => Some(err),
            _ => None,
        }
    }

    /// Exit code reported by a failed build tool
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::BuildFailure { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

impl From<NativeError> for MarsupialError {
    fn from(err: NativeError) -> Self {
        Self::Native(err)
    }
}
