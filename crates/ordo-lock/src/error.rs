//! Lock error types

use ordo_common::PathError;
use ordo_coordination::CoordinationError;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The coordination service failed (after its own retry policy)
    #[error("coordination error: {0}")]
    Connection(#[from] CoordinationError),

    #[error("timed out acquiring lock '{0}'")]
    Timeout(String),

    #[error("owner '{owner}' does not hold lock '{path}'")]
    NotOwner { owner: String, path: String },

    #[error("lock acquisition interrupted")]
    Interrupted,

    #[error("invalid lock path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("invalid lock configuration: {0}")]
    Config(String),

    #[error("created node '{0}' carries no sequence suffix")]
    MalformedNode(String),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_not_owner(&self) -> bool {
        matches!(self, Self::NotOwner { .. })
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
