//! Ordo Lock - fair, reentrant distributed mutex
//!
//! Contenders create ephemeral sequential nodes under a lock path; the lowest
//! sequence number holds the lock and every other contender watches only its
//! immediate predecessor. This module provides:
//! - `InterProcessMutex`: acquire / release / ownership queries
//! - Per-owner reentrancy tracking
//! - A pluggable `LockDriver` deciding eligibility from a children snapshot
//! - Interruption of pending acquisitions
//! - Lock metrics

pub mod driver;
pub mod error;
pub mod interrupt;
mod internals;
pub mod metrics;
pub mod mutex;
pub mod node;
pub mod ordering;
pub mod owner;
pub mod reentrancy;

pub use driver::{LockDriver, LockStatus, StandardLockDriver};
pub use error::{LockError, Result};
pub use interrupt::InterruptHandle;
pub use mutex::{InterProcessLock, InterProcessMutex};
pub use node::ContenderNode;
pub use ordering::{ChildrenSnapshot, Eligibility};
pub use owner::OwnerId;
pub use reentrancy::{ExitOutcome, ReentrancyTracker};
