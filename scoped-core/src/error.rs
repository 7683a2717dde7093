use std::io;
use std::path::PathBuf;

use crate::scope::Failure;

/// Errors produced while entering or leaving a scope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("failed to acquire {}: {source}", path.display())]
    Acquisition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to release {}: {source}", path.display())]
    Release {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("execution denied: {variable} does not grant permission")]
    PolicyDenied { variable: String },

    #[error("guarded action `{command}` failed to start: {source}")]
    Action {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A failure raised by the guarded block that no scope suppressed.
    #[error("{0:#}")]
    Block(Failure),
}

impl ScopeError {
    /// The block failure carried by this error, if any.
    pub fn block_failure(&self) -> Option<&Failure> {
        match self {
            Self::Block(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn into_block_failure(self) -> Option<Failure> {
        match self {
            Self::Block(failure) => Some(failure),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScopeError>;

/// A panic caught inside a guarded block, presented to scopes as a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panicked: {message}")]
pub struct BlockPanic {
    pub message: String,
}

impl BlockPanic {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}
