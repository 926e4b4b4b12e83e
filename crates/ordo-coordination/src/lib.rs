//! Ordo Coordination - coordination service boundary
//!
//! This crate provides:
//! - `CoordinationClient`: the facade the lock protocol talks to
//! - One-shot deletion watches and session lifecycle events
//! - `NamespacedClient`: path-prefixing decorator
//! - `MemoryEnsemble`: an in-process tree with ephemeral sequential nodes,
//!   watches and session expiry

pub mod client;
pub mod error;
pub mod event;
pub mod memory;
pub mod namespace;
pub mod watch;

pub use client::CoordinationClient;
pub use error::{CoordinationError, Result};
pub use event::{SessionEvent, SessionId, WatchEvent};
pub use memory::{MemoryClient, MemoryEnsemble};
pub use namespace::NamespacedClient;
pub use watch::DeletionWatch;
