//! Owner tokens
//!
//! An owner is the logical execution context an acquisition belongs to.
//! Reentrancy is counted per owner, so callers pass the same token for
//! nested acquisitions.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(Arc<str>);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// A unique owner (UUID v4)
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Owner derived from the current OS thread
    pub fn current_thread() -> Self {
        Self::new(format!("thread-{:?}", std::thread::current().id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
