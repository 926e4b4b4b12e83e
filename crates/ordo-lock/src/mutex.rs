//! Inter-process mutex
//!
//! A fair, reentrant mutex shared by every process that uses the same lock
//! path on the same coordination service. Reentrancy is scoped to an
//! [`OwnerId`]; a different owner on the same instance contends like any
//! other process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ordo_common::paths::{ROOT, validate_path};
use ordo_common::{LockConfig, PathError};
use ordo_coordination::CoordinationClient;

use crate::driver::{LockDriver, StandardLockDriver};
use crate::error::{LockError, Result};
use crate::internals::LockInternals;
use crate::interrupt::InterruptHandle;
use crate::metrics::{self, AcquireResult};
use crate::owner::OwnerId;
use crate::reentrancy::{ExitOutcome, ReentrancyTracker};

/// Minimal lock surface, so callers can hold any lock flavor behind one type
#[async_trait]
pub trait InterProcessLock: Send + Sync {
    /// Block until acquired
    async fn acquire(&self, owner: &OwnerId) -> Result<()>;

    /// `Ok(false)` when the lock was not acquired within `timeout`
    async fn try_acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<bool>;

    async fn release(&self, owner: &OwnerId) -> Result<()>;

    fn is_acquired_in_this_process(&self) -> bool;
}

pub struct InterProcessMutex<C: CoordinationClient + ?Sized + 'static> {
    internals: LockInternals<C>,
    tracker: ReentrancyTracker,
}

impl<C: CoordinationClient + ?Sized + 'static> InterProcessMutex<C> {
    /// Mutex on `path` with the default configuration
    pub fn new(client: Arc<C>, path: &str) -> Result<Self> {
        Self::with_config(client, path, &LockConfig::default())
    }

    pub fn with_config(client: Arc<C>, path: &str, config: &LockConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| LockError::Config(e.to_string()))?;
        Self::build(
            client,
            path,
            &config.lock_name,
            Arc::new(StandardLockDriver),
            config.node_loss_retries,
        )
    }

    /// Mutex whose eligibility rule is supplied by `driver`
    pub fn with_driver(
        client: Arc<C>,
        path: &str,
        lock_name: &str,
        driver: Arc<dyn LockDriver>,
    ) -> Result<Self> {
        let config = LockConfig::default().with_lock_name(lock_name);
        config
            .validate()
            .map_err(|e| LockError::Config(e.to_string()))?;
        Self::build(client, path, lock_name, driver, config.node_loss_retries)
    }

    fn build(
        client: Arc<C>,
        path: &str,
        lock_name: &str,
        driver: Arc<dyn LockDriver>,
        node_loss_retries: u32,
    ) -> Result<Self> {
        validate_path(path)?;
        if path == ROOT {
            return Err(PathError::Root.into());
        }

        Ok(Self {
            internals: LockInternals::new(client, path, lock_name, driver, node_loss_retries),
            tracker: ReentrancyTracker::new(),
        })
    }

    pub fn path(&self) -> &str {
        self.internals.base_path()
    }

    /// Block until `owner` holds the lock
    pub async fn acquire(&self, owner: &OwnerId) -> Result<()> {
        self.lock_internal(owner, None, None).await.map(|_| ())
    }

    /// `Ok(false)` when the lock was not acquired within `timeout`. A zero
    /// timeout makes exactly one eligibility check.
    pub async fn try_acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<bool> {
        self.lock_internal(owner, Some(timeout), None).await
    }

    /// Like [`try_acquire`](Self::try_acquire) but a missed deadline is
    /// reported as [`LockError::Timeout`]
    pub async fn acquire_timeout(&self, owner: &OwnerId, timeout: Duration) -> Result<()> {
        if self.lock_internal(owner, Some(timeout), None).await? {
            Ok(())
        } else {
            Err(LockError::Timeout(self.path().to_string()))
        }
    }

    /// Acquire until `interrupt` fires or the optional timeout passes.
    /// An interrupted attempt removes its node and returns
    /// [`LockError::Interrupted`].
    pub async fn acquire_interruptibly(
        &self,
        owner: &OwnerId,
        interrupt: &InterruptHandle,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        self.lock_internal(owner, timeout, Some(interrupt)).await
    }

    async fn lock_internal(
        &self,
        owner: &OwnerId,
        timeout: Option<Duration>,
        interrupt: Option<&InterruptHandle>,
    ) -> Result<bool> {
        let started = Instant::now();

        if self.tracker.try_enter(owner) {
            debug!(path = %self.path(), owner = %owner, hold_count = self.tracker.hold_count(owner), "Reentrant acquisition");
            metrics::record_acquire(self.path(), AcquireResult::Reentered, started.elapsed());
            return Ok(true);
        }

        // An unrepresentable deadline is as good as none
        let deadline = timeout.and_then(|timeout| started.checked_add(timeout));

        match self.internals.attempt_lock(owner, deadline, interrupt).await {
            Ok(Some(node)) => {
                info!(path = %self.path(), owner = %owner, node = %node, "Lock acquired");
                self.tracker.enter_completed(owner, node);
                metrics::record_acquire(self.path(), AcquireResult::Acquired, started.elapsed());
                metrics::increment_held(self.path());
                Ok(true)
            }
            Ok(None) => {
                debug!(path = %self.path(), owner = %owner, "Lock not acquired before deadline");
                metrics::record_acquire(self.path(), AcquireResult::Timeout, started.elapsed());
                Ok(false)
            }
            Err(e) => {
                let result = match e {
                    LockError::Interrupted => AcquireResult::Interrupted,
                    _ => AcquireResult::Error,
                };
                metrics::record_acquire(self.path(), result, started.elapsed());
                Err(e)
            }
        }
    }

    /// Drop one hold of `owner`; the last one deletes the contender node.
    ///
    /// When that delete fails (other than the node already being gone) the
    /// owner keeps holding the lock and the error is returned, so the release
    /// can be retried once the service is reachable again.
    pub async fn release(&self, owner: &OwnerId) -> Result<()> {
        let outcome = self.tracker.exit(owner).ok_or_else(|| LockError::NotOwner {
            owner: owner.to_string(),
            path: self.path().to_string(),
        })?;

        match outcome {
            ExitOutcome::StillHeld { remaining } => {
                debug!(path = %self.path(), owner = %owner, remaining, "Reentrant release");
                Ok(())
            }
            ExitOutcome::Release(node) => {
                if let Err(e) = self.internals.release_node(&node).await {
                    warn!(path = %self.path(), owner = %owner, node = %node, error = %e, "Failed to delete contender node, lock still held");
                    self.tracker.restore(owner, node);
                    return Err(e);
                }
                metrics::decrement_held(self.path());
                metrics::record_release(self.path());
                info!(path = %self.path(), owner = %owner, node = %node, "Lock released");
                Ok(())
            }
        }
    }

    /// Whether any owner in this process holds the lock. Local bookkeeping
    /// only; the service is not consulted.
    pub fn is_acquired_in_this_process(&self) -> bool {
        self.tracker.is_any_held()
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        self.tracker.hold_count(owner) > 0
    }

    pub fn hold_count(&self, owner: &OwnerId) -> u32 {
        self.tracker.hold_count(owner)
    }

    /// Path of the contender node `owner` holds the lock with
    pub fn lock_node(&self, owner: &OwnerId) -> Option<String> {
        self.tracker
            .node_of(owner)
            .map(|node| node.path().to_string())
    }

    /// Contender node paths under the lock path in acquisition order
    pub async fn participant_nodes(&self) -> Result<Vec<String>> {
        self.internals.participant_nodes().await
    }
}

#[async_trait]
impl<C: CoordinationClient + ?Sized + 'static> InterProcessLock for InterProcessMutex<C> {
    async fn acquire(&self, owner: &OwnerId) -> Result<()> {
        InterProcessMutex::acquire(self, owner).await
    }

    async fn try_acquire(&self, owner: &OwnerId, timeout: Duration) -> Result<bool> {
        InterProcessMutex::try_acquire(self, owner, timeout).await
    }

    async fn release(&self, owner: &OwnerId) -> Result<()> {
        InterProcessMutex::release(self, owner).await
    }

    fn is_acquired_in_this_process(&self) -> bool {
        InterProcessMutex::is_acquired_in_this_process(self)
    }
}
