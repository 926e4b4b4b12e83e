//! Interruption of pending acquisitions

use std::sync::Arc;

use tokio::sync::watch;

/// Clonable handle that interrupts every acquisition waiting on it.
///
/// An interrupted acquisition deletes its contender node and returns
/// `LockError::Interrupted`. The flag stays set until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn interrupt(&self) {
        self.flag.send_replace(true);
    }

    pub fn reset(&self) {
        self.flag.send_replace(false);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the handle is interrupted
    pub async fn interrupted(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives as long as `self`, so this only ends on interrupt
        let _ = rx.wait_for(|interrupted| *interrupted).await;
    }
}
