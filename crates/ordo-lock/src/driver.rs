//! Lock flavor strategy
//!
//! A driver decides, from a sorted children snapshot, whether a contender
//! holds the lock and which sibling it must watch otherwise. The acquisition
//! loop is the same for every flavor.

/// Result of evaluating one contender against a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Acquired,
    /// Not eligible yet; watch this sibling (node name) for deletion
    Watch(String),
}

pub trait LockDriver: Send + Sync {
    /// Sequence number carried by `node_name`, or `None` when the node does
    /// not belong to this lock kind
    fn sequence_of(&self, node_name: &str, lock_name: &str) -> Option<u64>;

    /// Evaluate `our_node` against children already sorted by sequence.
    /// Returns `None` when `our_node` is not among them.
    fn lock_status(
        &self,
        sorted_children: &[String],
        our_node: &str,
        max_leases: usize,
    ) -> Option<LockStatus>;
}

/// Plain mutex: the lowest sequence number wins, everyone else waits on the
/// node directly ahead of it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLockDriver;

impl LockDriver for StandardLockDriver {
    fn sequence_of(&self, node_name: &str, lock_name: &str) -> Option<u64> {
        let digits = node_name.strip_prefix(lock_name)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn lock_status(
        &self,
        sorted_children: &[String],
        our_node: &str,
        max_leases: usize,
    ) -> Option<LockStatus> {
        let our_index = sorted_children.iter().position(|child| child == our_node)?;
        let max_leases = max_leases.max(1);

        if our_index < max_leases {
            Some(LockStatus::Acquired)
        } else {
            Some(LockStatus::Watch(
                sorted_children[our_index - max_leases].clone(),
            ))
        }
    }
}
