//! Coordination service error kinds

use ordo_common::PathError;

/// Error type for coordination service operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    #[error("connection lost")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("node '{0}' does not exist")]
    NoNode(String),

    #[error("node '{0}' has children")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("client closed")]
    Closed,
}

impl CoordinationError {
    /// Connection-level failure (as opposed to a node-level outcome)
    pub fn is_connection_problem(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss | Self::SessionExpired | Self::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
