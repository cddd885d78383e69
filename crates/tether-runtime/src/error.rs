use thiserror::Error;

use crate::optimistic::RequestId;

/// Misuse of a cell: no provider in scope, or the cell is gone.
///
/// Fatal to the caller. Never swallow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("no enclosing scope provides a `{type_name}` cell")]
    NoProvider { type_name: &'static str },

    #[error("cell #{cell_id} (`{type_name}`) has been destroyed")]
    Destroyed {
        cell_id: u64,
        type_name: &'static str,
    },

    #[error("cell #{cell_id} dispatched while its value was borrowed")]
    Reentrant { cell_id: u64 },
}

/// The backend refused an update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("update {request_id} rejected: {reason}")]
pub struct UpdateRejected {
    pub request_id: RequestId,
    pub reason: String,
}

/// Failure of an in-flight optimistic update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Rejected(#[from] UpdateRejected),

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl UpdateError {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub fn as_rejected(&self) -> Option<&UpdateRejected> {
        match self {
            Self::Rejected(rejected) => Some(rejected),
            Self::Scope(_) => None,
        }
    }
}
