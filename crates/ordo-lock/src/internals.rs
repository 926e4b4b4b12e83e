//! Acquisition state machine
//!
//! One attempt runs: create contender node -> poll children -> watch the
//! immediate predecessor -> re-poll on any notification, until the node is
//! eligible, the deadline passes, the caller interrupts, or the service fails.
//! Every failure path removes the contender node before returning.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use ordo_common::paths::make_path;
use ordo_coordination::{CoordinationClient, CoordinationError, SessionEvent};

use crate::driver::LockDriver;
use crate::error::{LockError, Result};
use crate::interrupt::InterruptHandle;
use crate::node::ContenderNode;
use crate::ordering::{ChildrenSnapshot, Eligibility};
use crate::owner::OwnerId;

/// States an attempt moves through, reported in trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireState {
    AwaitingTicket,
    Polling,
    Watching,
    Held,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Acquired,
    TimedOut,
    /// Our node disappeared from the service (session expired)
    NodeLost,
}

pub(crate) struct LockInternals<C: CoordinationClient + ?Sized + 'static> {
    client: Arc<C>,
    base_path: String,
    lock_name: String,
    node_prefix: String,
    driver: Arc<dyn LockDriver>,
    max_leases: usize,
    node_loss_retries: u32,
}

impl<C: CoordinationClient + ?Sized + 'static> LockInternals<C> {
    pub(crate) fn new(
        client: Arc<C>,
        base_path: &str,
        lock_name: &str,
        driver: Arc<dyn LockDriver>,
        node_loss_retries: u32,
    ) -> Self {
        Self {
            client,
            base_path: base_path.to_string(),
            lock_name: lock_name.to_string(),
            node_prefix: make_path(base_path, lock_name),
            driver,
            max_leases: 1,
            node_loss_retries,
        }
    }

    pub(crate) fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Run one acquisition. `Ok(None)` means the deadline passed; the node is
    /// gone in that case too.
    pub(crate) async fn attempt_lock(
        &self,
        owner: &OwnerId,
        deadline: Option<Instant>,
        interrupt: Option<&InterruptHandle>,
    ) -> Result<Option<ContenderNode>> {
        let mut node_losses = 0;

        loop {
            if interrupt.is_some_and(InterruptHandle::is_interrupted) {
                return Err(LockError::Interrupted);
            }

            debug!(path = %self.base_path, owner = %owner, state = ?AcquireState::AwaitingTicket, "Creating contender node");
            let mut cleanup = self.create_node(owner).await?;
            let path = cleanup.path().to_string();

            let Some(node) = ContenderNode::from_path(&path, self.driver.as_ref(), &self.lock_name)
            else {
                cleanup.disarm();
                self.delete_quietly(&path).await;
                return Err(LockError::MalformedNode(path));
            };

            let outcome = self.wait_for_turn(&node, deadline, interrupt).await;
            cleanup.disarm();

            match outcome {
                Ok(WaitOutcome::Acquired) => {
                    debug!(node = %node, owner = %owner, state = ?AcquireState::Held, "Contender is eligible");
                    return Ok(Some(node));
                }
                Ok(WaitOutcome::TimedOut) => {
                    debug!(node = %node, owner = %owner, state = ?AcquireState::Failed, "Deadline passed while waiting");
                    self.delete_quietly(node.path()).await;
                    return Ok(None);
                }
                Ok(WaitOutcome::NodeLost) if node_losses < self.node_loss_retries => {
                    node_losses += 1;
                    warn!(
                        node = %node,
                        owner = %owner,
                        attempt = node_losses,
                        "Contender node vanished, queueing again"
                    );
                    self.delete_quietly(node.path()).await;
                }
                Ok(WaitOutcome::NodeLost) => {
                    warn!(node = %node, owner = %owner, state = ?AcquireState::Failed, "Contender node vanished, giving up");
                    self.delete_quietly(node.path()).await;
                    return Err(CoordinationError::NoNode(node.path().to_string()).into());
                }
                Err(e) => {
                    debug!(node = %node, owner = %owner, error = %e, state = ?AcquireState::Failed, "Acquisition failed");
                    self.delete_quietly(node.path()).await;
                    return Err(e);
                }
            }
        }
    }

    /// Create the contender node on a separate task. The path comes back
    /// inside an armed [`NodeCleanup`], so a caller dropped while the create
    /// is in flight still gets its node deleted.
    async fn create_node(&self, owner: &OwnerId) -> Result<NodeCleanup<C>> {
        let client = self.client.clone();
        let prefix = self.node_prefix.clone();
        let data = owner.as_str().as_bytes().to_vec();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let created = client
                .create_ephemeral_sequential(&prefix, &data)
                .await
                .map(|path| NodeCleanup::arm(client.clone(), path));
            // An unreceived guard is dropped here and deletes the node
            let _ = tx.send(created);
        });

        match rx.await {
            Ok(created) => Ok(created?),
            Err(_) => Err(CoordinationError::Closed.into()),
        }
    }

    async fn wait_for_turn(
        &self,
        node: &ContenderNode,
        deadline: Option<Instant>,
        interrupt: Option<&InterruptHandle>,
    ) -> Result<WaitOutcome> {
        let mut session_events = self.client.session_events();
        let expiry = sleep_until_deadline(deadline);
        tokio::pin!(expiry);
        let interrupted = wait_for_interrupt(interrupt);
        tokio::pin!(interrupted);

        loop {
            let children = match self.client.get_children(&self.base_path).await {
                Ok(children) => children,
                Err(CoordinationError::NoNode(_)) => return Ok(WaitOutcome::NodeLost),
                Err(e) => return Err(e.into()),
            };

            let snapshot = ChildrenSnapshot::new(children, self.driver.as_ref(), &self.lock_name);
            let predecessor =
                match snapshot.evaluate(node.name(), self.driver.as_ref(), self.max_leases) {
                    // An interrupt raised while a service call was in flight wins
                    Eligibility::Acquired if interrupt.is_some_and(InterruptHandle::is_interrupted) => {
                        return Err(LockError::Interrupted);
                    }
                    Eligibility::Acquired => return Ok(WaitOutcome::Acquired),
                    Eligibility::Missing => return Ok(WaitOutcome::NodeLost),
                    Eligibility::Blocked { predecessor } => predecessor,
                };

            let predecessor_path = make_path(&self.base_path, &predecessor);
            let mut watch = match self.client.watch_deletion(&predecessor_path).await {
                Ok(watch) => watch,
                // Gone between listing and watching
                Err(CoordinationError::NoNode(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            debug!(
                node = %node,
                predecessor = %predecessor_path,
                contenders = snapshot.len(),
                state = ?AcquireState::Watching,
                "Waiting for predecessor"
            );

            loop {
                tokio::select! {
                    event = &mut watch => {
                        debug!(node = %node, ?event, state = ?AcquireState::Polling, "Predecessor watch fired");
                        break;
                    }
                    _ = &mut expiry => return Ok(WaitOutcome::TimedOut),
                    _ = &mut interrupted => return Err(LockError::Interrupted),
                    event = session_events.recv() => {
                        match event {
                            // The session survives a disconnect; keep the watch
                            Ok(SessionEvent::Disconnected) => continue,
                            Ok(SessionEvent::Closed) | Err(RecvError::Closed) => {
                                return Err(CoordinationError::Closed.into());
                            }
                            Ok(event) => {
                                debug!(node = %node, ?event, state = ?AcquireState::Polling, "Session event, re-polling");
                                break;
                            }
                            Err(RecvError::Lagged(_)) => break,
                        }
                    }
                }
            }
        }
    }

    /// Delete a released node. A node that is already gone counts as deleted.
    pub(crate) async fn release_node(&self, node: &ContenderNode) -> Result<()> {
        match self.client.delete(node.path()).await {
            Ok(()) => Ok(()),
            Err(CoordinationError::NoNode(_)) => {
                debug!(node = %node, "Contender node already gone at release");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort cleanup; the node dies with the session anyway
    async fn delete_quietly(&self, path: &str) {
        match self.client.delete(path).await {
            Ok(()) | Err(CoordinationError::NoNode(_)) => {}
            Err(e) => warn!(path = %path, error = %e, "Failed to delete contender node"),
        }
    }

    /// Contender node paths in acquisition order
    pub(crate) async fn participant_nodes(&self) -> Result<Vec<String>> {
        let children = match self.client.get_children(&self.base_path).await {
            Ok(children) => children,
            Err(CoordinationError::NoNode(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(
            ChildrenSnapshot::new(children, self.driver.as_ref(), &self.lock_name)
                .sorted()
                .iter()
                .map(|name| make_path(&self.base_path, name))
                .collect(),
        )
    }
}

/// Deletes the contender node in the background if the acquiring future is
/// dropped before the attempt settles
struct NodeCleanup<C: CoordinationClient + ?Sized + 'static> {
    client: Arc<C>,
    path: String,
    armed: bool,
}

impl<C: CoordinationClient + ?Sized + 'static> NodeCleanup<C> {
    fn arm(client: Arc<C>, path: String) -> Self {
        Self {
            client,
            path,
            armed: true,
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C: CoordinationClient + ?Sized + 'static> Drop for NodeCleanup<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    match client.delete(&path).await {
                        Ok(()) | Err(CoordinationError::NoNode(_)) => {
                            debug!(path = %path, "Removed node of abandoned acquisition");
                        }
                        Err(e) => {
                            warn!(path = %path, error = %e, "Failed to remove node of abandoned acquisition");
                        }
                    }
                });
            }
            Err(_) => {
                warn!(path = %path, "No runtime to remove node of abandoned acquisition");
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn wait_for_interrupt(interrupt: Option<&InterruptHandle>) {
    match interrupt {
        Some(handle) => handle.interrupted().await,
        None => std::future::pending::<()>().await,
    }
}
