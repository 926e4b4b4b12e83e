//! In-process coordination ensemble
//!
//! A single shared node tree with ZooKeeper-like semantics:
//! - ephemeral sequential nodes owned by the creating session
//! - one-shot deletion watches
//! - session expiry (ephemerals removed, watches fired, client moves on to a
//!   fresh session), disconnect/reconnect and close
//!
//! Every client connected to the same `MemoryEnsemble` sees the same tree, so
//! several clients stand in for several processes.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use ordo_common::PathError;
use ordo_common::paths::{ROOT, ancestors, node_from_path, parent_of, validate_path};

use crate::client::CoordinationClient;
use crate::error::{CoordinationError, Result};
use crate::event::{SessionEvent, SessionId, WatchEvent};
use crate::watch::DeletionWatch;

/// Width of the zero-padded sequence suffix
pub const SEQUENCE_WIDTH: usize = 10;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
    children: BTreeSet<String>,
    next_sequence: u64,
}

struct Watcher {
    id: u64,
    client: u64,
    session: SessionId,
    tx: oneshot::Sender<WatchEvent>,
}

struct Tree {
    nodes: HashMap<String, Node>,
    watchers: HashMap<String, Vec<Watcher>>,
    next_watch_id: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), Node::default());
        Self {
            nodes,
            watchers: HashMap::new(),
            next_watch_id: 0,
        }
    }

    fn node(&self, path: &str) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    /// Link a new node into its parent. The parent must exist.
    fn insert(&mut self, path: &str, node: Node) {
        if let Some(parent) = parent_of(path)
            && let Some(parent_node) = self.nodes.get_mut(parent)
        {
            parent_node.children.insert(node_from_path(path).to_string());
        }
        self.nodes.insert(path.to_string(), node);
    }

    /// Create every missing ancestor of `path` as a persistent node
    fn ensure_parents(&mut self, path: &str) {
        for ancestor in ancestors(path) {
            if !self.nodes.contains_key(ancestor) {
                self.insert(ancestor, Node::default());
            }
        }
    }

    fn remove(&mut self, path: &str) -> Result<Node> {
        let node = self.node(path)?;
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }

        let node = self
            .nodes
            .remove(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if let Some(parent) = parent_of(path)
            && let Some(parent_node) = self.nodes.get_mut(parent)
        {
            parent_node.children.remove(node_from_path(path));
        }

        self.fire(path, WatchEvent::NodeDeleted);
        Ok(node)
    }

    fn remove_ephemerals(&mut self, session: SessionId) -> usize {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();

        owned
            .iter()
            .filter(|path| self.remove(path).is_ok())
            .count()
    }

    fn register_watch(
        &mut self,
        path: &str,
        client: u64,
        session: SessionId,
    ) -> (u64, oneshot::Receiver<WatchEvent>) {
        let (tx, rx) = oneshot::channel();
        self.next_watch_id += 1;
        let id = self.next_watch_id;
        self.watchers.entry(path.to_string()).or_default().push(Watcher {
            id,
            client,
            session,
            tx,
        });
        (id, rx)
    }

    fn unregister_watch(&mut self, path: &str, id: u64) {
        if let Some(list) = self.watchers.get_mut(path) {
            list.retain(|w| w.id != id);
            if list.is_empty() {
                self.watchers.remove(path);
            }
        }
    }

    fn fire(&mut self, path: &str, event: WatchEvent) {
        if let Some(list) = self.watchers.remove(path) {
            for watcher in list {
                let _ = watcher.tx.send(event);
            }
        }
    }

    fn fire_where(&mut self, event: WatchEvent, matches: impl Fn(&Watcher) -> bool) -> usize {
        let mut fired = Vec::new();
        for list in self.watchers.values_mut() {
            let (hit, keep): (Vec<Watcher>, Vec<Watcher>) =
                std::mem::take(list).into_iter().partition(|w| matches(w));
            *list = keep;
            fired.extend(hit);
        }
        self.watchers.retain(|_, list| !list.is_empty());

        let count = fired.len();
        for watcher in fired {
            let _ = watcher.tx.send(event);
        }
        count
    }

    fn watch_count(&self) -> usize {
        self.watchers.values().map(Vec::len).sum()
    }
}

struct ClientState {
    id: u64,
    session: RwLock<SessionId>,
    connected: AtomicBool,
    closed: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

struct EnsembleInner {
    tree: Mutex<Tree>,
    clients: DashMap<u64, Arc<ClientState>>,
    next_session: AtomicU64,
    next_client: AtomicU64,
}

impl EnsembleInner {
    fn allocate_session(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn client_for_session(&self, session: SessionId) -> Option<Arc<ClientState>> {
        self.clients
            .iter()
            .find(|entry| *entry.value().session.read() == session)
            .map(|entry| entry.value().clone())
    }
}

/// Shared in-process node tree that clients connect to
#[derive(Clone)]
pub struct MemoryEnsemble {
    inner: Arc<EnsembleInner>,
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EnsembleInner {
                tree: Mutex::new(Tree::new()),
                clients: DashMap::new(),
                next_session: AtomicU64::new(0),
                next_client: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new client with a fresh session
    pub fn connect(&self) -> MemoryClient {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(ClientState {
            id: self.inner.next_client.fetch_add(1, Ordering::Relaxed) + 1,
            session: RwLock::new(self.inner.allocate_session()),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            events,
        });
        self.inner.clients.insert(state.id, state.clone());

        let session = *state.session.read();
        debug!(session = %session, "Client connected");
        MemoryClient {
            ensemble: self.inner.clone(),
            state,
        }
    }

    /// Expire a session as the service would after missed heartbeats.
    ///
    /// The session's ephemeral nodes are deleted, watches it registered fire
    /// with `SessionExpired`, and the owning client continues on a new session.
    /// Returns `false` for an unknown session.
    pub fn expire_session(&self, session: SessionId) -> bool {
        let Some(client) = self.inner.client_for_session(session) else {
            return false;
        };

        let new_session = self.inner.allocate_session();
        let removed = {
            let mut tree = self.inner.tree.lock();
            let removed = tree.remove_ephemerals(session);
            tree.fire_where(WatchEvent::SessionExpired, |w| w.session == session);
            *client.session.write() = new_session;
            removed
        };

        info!(
            old = %session,
            new = %new_session,
            removed,
            "Session expired"
        );
        let _ = client.events.send(SessionEvent::Expired {
            old: session,
            new: new_session,
        });
        true
    }

    /// Whether a node exists, without going through a session
    pub fn exists(&self, path: &str) -> bool {
        self.inner.tree.lock().nodes.contains_key(path)
    }

    /// Sorted child names of `path`; empty when the node is missing
    pub fn children(&self, path: &str) -> Vec<String> {
        self.inner
            .tree
            .lock()
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of registered, unfired watches
    pub fn watch_count(&self) -> usize {
        self.inner.tree.lock().watch_count()
    }
}

/// A session-bound client of a [`MemoryEnsemble`]
pub struct MemoryClient {
    ensemble: Arc<EnsembleInner>,
    state: Arc<ClientState>,
}

impl MemoryClient {
    pub fn ensemble(&self) -> MemoryEnsemble {
        MemoryEnsemble {
            inner: self.ensemble.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst) && !self.state.closed.load(Ordering::SeqCst)
    }

    /// Expire this client's current session
    pub fn expire_session(&self) -> bool {
        self.ensemble().expire_session(self.session_id())
    }

    /// Simulate losing the connection; the session survives
    pub fn disconnect(&self) {
        if self.state.connected.swap(false, Ordering::SeqCst) {
            debug!(session = %self.session_id(), "Client disconnected");
            let _ = self.state.events.send(SessionEvent::Disconnected);
        }
    }

    /// Re-establish the connection. Pending watches of this client fire with
    /// `Reconnected` because notifications may have been missed meanwhile.
    pub fn reconnect(&self) {
        if self.state.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        let fired = {
            let mut tree = self.ensemble.tree.lock();
            let client = self.state.id;
            tree.fire_where(WatchEvent::Reconnected, |w| w.client == client)
        };
        debug!(session = %self.session_id(), fired, "Client reconnected");
        let _ = self.state.events.send(SessionEvent::Reconnected);
    }

    /// Close the session: its ephemeral nodes are deleted and every further
    /// call fails with `Closed`.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.session_id();
        {
            let mut tree = self.ensemble.tree.lock();
            tree.remove_ephemerals(session);
            let client = self.state.id;
            tree.fire_where(WatchEvent::Closed, |w| w.client == client);
        }
        self.ensemble.clients.remove(&self.state.id);
        debug!(session = %session, "Client closed");
        let _ = self.state.events.send(SessionEvent::Closed);
    }

    fn check_usable(&self) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(CoordinationError::Closed);
        }
        if !self.state.connected.load(Ordering::SeqCst) {
            return Err(CoordinationError::ConnectionLoss);
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String> {
        self.check_usable()?;
        validate_path(path_prefix)?;
        let parent = parent_of(path_prefix).ok_or(PathError::Root)?;

        let mut tree = self.ensemble.tree.lock();
        tree.ensure_parents(path_prefix);
        let parent_node = tree
            .nodes
            .get_mut(parent)
            .ok_or_else(|| CoordinationError::NoNode(parent.to_string()))?;
        let sequence = parent_node.next_sequence;
        parent_node.next_sequence += 1;

        let path = format!("{path_prefix}{sequence:0width$}", width = SEQUENCE_WIDTH);
        let session = *self.state.session.read();
        tree.insert(
            &path,
            Node {
                data: data.to_vec(),
                ephemeral_owner: Some(session),
                ..Default::default()
            },
        );

        debug!(path = %path, session = %session, "Created ephemeral sequential node");
        Ok(path)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_usable()?;
        validate_path(path)?;
        if path == ROOT {
            return Err(PathError::Root.into());
        }

        self.ensemble.tree.lock().remove(path)?;
        debug!(path = %path, "Deleted node");
        Ok(())
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_usable()?;
        validate_path(path)?;

        let tree = self.ensemble.tree.lock();
        Ok(tree.node(path)?.children.iter().cloned().collect())
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.check_usable()?;
        validate_path(path)?;

        let tree = self.ensemble.tree.lock();
        Ok(tree.node(path)?.data.clone())
    }

    async fn watch_deletion(&self, path: &str) -> Result<DeletionWatch> {
        self.check_usable()?;
        validate_path(path)?;

        let (id, rx) = {
            let mut tree = self.ensemble.tree.lock();
            tree.node(path)?;
            let session = *self.state.session.read();
            tree.register_watch(path, self.state.id, session)
        };

        let ensemble: Weak<EnsembleInner> = Arc::downgrade(&self.ensemble);
        let watched = path.to_string();
        Ok(DeletionWatch::new(path, rx, move || {
            if let Some(ensemble) = ensemble.upgrade() {
                ensemble.tree.lock().unregister_watch(&watched, id);
            }
        }))
    }

    fn session_id(&self) -> SessionId {
        *self.state.session.read()
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events.subscribe()
    }
}
