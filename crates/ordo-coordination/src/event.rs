//! Session identity, session lifecycle events and watch outcomes

use std::fmt;

/// Identity of a coordination service session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Why a deletion watch completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched node was deleted (release or session death)
    NodeDeleted,
    /// The connection was re-established; the node may or may not still exist
    Reconnected,
    /// The session that registered the watch expired
    SessionExpired,
    /// The client was closed or the watch was dropped by the service
    Closed,
}

/// Session lifecycle notifications published by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Disconnected,
    Reconnected,
    /// The old session expired; the client continues on `new`
    Expired { old: SessionId, new: SessionId },
    Closed,
}
