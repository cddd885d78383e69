use thiserror::Error;
use tether_runtime::{ScopeError, UpdateRejected};

pub type Result<T> = std::result::Result<T, DemoError>;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("could not spawn update task: {0}")]
    Spawn(#[from] futures::task::SpawnError),

    #[error("logging setup failed: {message}")]
    Logging { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{0}")]
    Rejected(UpdateRejected),

    #[error("update task did not finish")]
    Stalled,
}

impl DemoError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 64,
            Self::Rejected(_) => 3,
            Self::Scope(_) | Self::Stalled => 70,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
