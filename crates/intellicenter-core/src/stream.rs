// ── Reactive model stream ──
//
// Subscription type for consuming model snapshots published by the
// controller.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::PoolModel;

/// A subscription to the controller's object model.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct ModelStream {
    current: Arc<PoolModel>,
    receiver: watch::Receiver<Arc<PoolModel>>,
}

impl ModelStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<PoolModel>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Arc<PoolModel> {
        &self.current
    }

    /// Get the latest snapshot.
    pub fn latest(&self) -> Arc<PoolModel> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the controller has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<PoolModel>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> ModelWatchStream {
        ModelWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot each time the model changes.
///
/// The first item is the snapshot current at conversion time.
pub struct ModelWatchStream {
    inner: WatchStream<Arc<PoolModel>>,
}

impl Stream for ModelWatchStream {
    type Item = Arc<PoolModel>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
