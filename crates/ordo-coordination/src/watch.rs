//! One-shot deletion watch

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::event::WatchEvent;

type Unregister = Box<dyn FnOnce() + Send + 'static>;

/// Future resolving once the watched node is deleted, or when a
/// connection-level event makes the watch meaningless.
///
/// Fires at most once. Dropping an unfired watch unregisters it from the
/// service.
pub struct DeletionWatch {
    path: String,
    rx: oneshot::Receiver<WatchEvent>,
    unregister: Option<Unregister>,
}

impl DeletionWatch {
    pub fn new(
        path: impl Into<String>,
        rx: oneshot::Receiver<WatchEvent>,
        unregister: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            rx,
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Path of the watched node
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Future for DeletionWatch {
    type Output = WatchEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let event = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(event)) => event,
            Poll::Ready(Err(_)) => WatchEvent::Closed,
            Poll::Pending => return Poll::Pending,
        };
        // Already removed by the service when it fired
        self.unregister = None;
        Poll::Ready(event)
    }
}

impl Drop for DeletionWatch {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl fmt::Debug for DeletionWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionWatch")
            .field("path", &self.path)
            .field("armed", &self.unregister.is_some())
            .finish()
    }
}
