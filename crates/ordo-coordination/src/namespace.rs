//! Namespacing decorator
//!
//! Roots every path of the wrapped client under `/<namespace>` so unrelated
//! applications can share one service without colliding.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use ordo_common::paths::{fix_for_namespace, strip_namespace};

use crate::client::CoordinationClient;
use crate::error::Result;
use crate::event::{SessionEvent, SessionId};
use crate::watch::DeletionWatch;

pub struct NamespacedClient<C: ?Sized> {
    inner: Arc<C>,
    namespace: String,
}

impl<C: CoordinationClient + ?Sized> NamespacedClient<C> {
    pub fn new(inner: Arc<C>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn fix(&self, path: &str) -> String {
        fix_for_namespace(Some(&self.namespace), path)
    }

    fn unfix(&self, path: &str) -> String {
        strip_namespace(Some(&self.namespace), path).to_string()
    }
}

#[async_trait]
impl<C: CoordinationClient + ?Sized> CoordinationClient for NamespacedClient<C> {
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String> {
        let created = self
            .inner
            .create_ephemeral_sequential(&self.fix(path_prefix), data)
            .await?;
        Ok(self.unfix(&created))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(&self.fix(path)).await
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.inner.get_children(&self.fix(path)).await
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.get_data(&self.fix(path)).await
    }

    async fn watch_deletion(&self, path: &str) -> Result<DeletionWatch> {
        self.inner.watch_deletion(&self.fix(path)).await
    }

    fn session_id(&self) -> SessionId {
        self.inner.session_id()
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session_events()
    }
}
