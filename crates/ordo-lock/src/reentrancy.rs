//! Reentrancy tracker
//!
//! Per mutex instance, per owner hold counts. Only the first acquisition by an
//! owner talks to the coordination service and only the last release deletes
//! the contender node. Never blocks on the service.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::node::ContenderNode;
use crate::owner::OwnerId;

#[derive(Debug)]
struct LockData {
    node: ContenderNode,
    hold_count: u32,
}

/// Outcome of [`ReentrancyTracker::exit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Nested holds remain; the lock is still held
    StillHeld { remaining: u32 },
    /// Count reached zero; the caller must delete this node
    Release(ContenderNode),
}

#[derive(Debug, Default)]
pub struct ReentrancyTracker {
    owners: Mutex<HashMap<OwnerId, LockData>>,
}

impl ReentrancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reentrant fast path: bump the count and return `true` when `owner`
    /// already holds the lock, otherwise leave state untouched
    pub fn try_enter(&self, owner: &OwnerId) -> bool {
        match self.owners.lock().get_mut(owner) {
            Some(data) => {
                data.hold_count += 1;
                true
            }
            None => false,
        }
    }

    /// Record a first-time acquisition
    pub fn enter_completed(&self, owner: &OwnerId, node: ContenderNode) {
        let previous = self.owners.lock().insert(
            owner.clone(),
            LockData {
                node,
                hold_count: 1,
            },
        );
        if let Some(previous) = previous {
            warn!(
                owner = %owner,
                node = %previous.node,
                "Owner completed a second first-time acquisition; previous node record replaced"
            );
        }
    }

    /// Drop one hold. `None` when `owner` holds nothing.
    pub fn exit(&self, owner: &OwnerId) -> Option<ExitOutcome> {
        let mut owners = self.owners.lock();
        let data = owners.get_mut(owner)?;

        data.hold_count -= 1;
        if data.hold_count > 0 {
            return Some(ExitOutcome::StillHeld {
                remaining: data.hold_count,
            });
        }

        owners
            .remove(owner)
            .map(|data| ExitOutcome::Release(data.node))
    }

    /// Put back a final hold whose node could not be deleted, so the owner
    /// still holds and can retry the release. A newer entry wins.
    pub fn restore(&self, owner: &OwnerId, node: ContenderNode) {
        self.owners
            .lock()
            .entry(owner.clone())
            .or_insert(LockData {
                node,
                hold_count: 1,
            });
    }

    pub fn hold_count(&self, owner: &OwnerId) -> u32 {
        self.owners
            .lock()
            .get(owner)
            .map(|data| data.hold_count)
            .unwrap_or(0)
    }

    pub fn node_of(&self, owner: &OwnerId) -> Option<ContenderNode> {
        self.owners.lock().get(owner).map(|data| data.node.clone())
    }

    /// Number of owners currently holding
    pub fn holders(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_any_held(&self) -> bool {
        !self.owners.lock().is_empty()
    }
}
