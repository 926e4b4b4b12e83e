//! Ordering & wait engine
//!
//! A `ChildrenSnapshot` is read fresh for every evaluation and never cached:
//! siblings come and go between reads.

use crate::driver::{LockDriver, LockStatus};

/// What a contender should do after evaluating a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Acquired,
    /// Wait for this sibling (node name) to be deleted, then re-evaluate
    Blocked { predecessor: String },
    /// Our own node is not in the snapshot (it vanished with its session)
    Missing,
}

/// Children of a lock path belonging to one lock kind, sorted by sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenSnapshot {
    sorted: Vec<String>,
}

impl ChildrenSnapshot {
    /// Filter out foreign nodes and sort the rest by sequence number
    pub fn new(children: Vec<String>, driver: &dyn LockDriver, lock_name: &str) -> Self {
        let mut keyed: Vec<(u64, String)> = children
            .into_iter()
            .filter_map(|child| driver.sequence_of(&child, lock_name).map(|seq| (seq, child)))
            .collect();
        keyed.sort();

        Self {
            sorted: keyed.into_iter().map(|(_, child)| child).collect(),
        }
    }

    pub fn sorted(&self) -> &[String] {
        &self.sorted
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn evaluate(&self, our_node: &str, driver: &dyn LockDriver, max_leases: usize) -> Eligibility {
        match driver.lock_status(&self.sorted, our_node, max_leases) {
            Some(LockStatus::Acquired) => Eligibility::Acquired,
            Some(LockStatus::Watch(predecessor)) => Eligibility::Blocked { predecessor },
            None => Eligibility::Missing,
        }
    }
}
