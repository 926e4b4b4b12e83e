//! Coordination client facade
//!
//! The lock protocol only needs a handful of primitives from a
//! ZooKeeper-like service. Connection management, retry policies and session
//! keep-alive live behind this trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::{SessionEvent, SessionId};
use crate::watch::DeletionWatch;

#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Create an ephemeral node named `path_prefix` + a 10-digit sequence
    /// suffix, creating missing persistent parents. Returns the full path.
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String>;

    /// Delete a node. Fails with `NoNode` when it is already gone.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Names (not paths) of the children of `path`, in no particular order
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Read a node's payload
    async fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Register a one-shot watch on the deletion of `path`.
    /// Fails with `NoNode` when the node does not exist.
    async fn watch_deletion(&self, path: &str) -> Result<DeletionWatch>;

    /// Current session identity
    fn session_id(&self) -> SessionId;

    /// Subscribe to session lifecycle events
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
