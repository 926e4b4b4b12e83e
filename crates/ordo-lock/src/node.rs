//! Contender node

use std::fmt;

use ordo_common::paths::node_from_path;

use crate::driver::LockDriver;

/// The ephemeral sequential node created by one acquisition attempt.
/// Its sequence number is the contender's place in line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContenderNode {
    path: String,
    name: String,
    sequence: u64,
}

impl ContenderNode {
    /// Parse a created node path; `None` when the name has no sequence suffix
    pub fn from_path(path: &str, driver: &dyn LockDriver, lock_name: &str) -> Option<Self> {
        let name = node_from_path(path);
        let sequence = driver.sequence_of(name, lock_name)?;
        Some(Self {
            path: path.to_string(),
            name: name.to_string(),
            sequence,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for ContenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
