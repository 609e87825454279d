use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

/// Eventual outcome of an `enqueue_thumbnail` call.
///
/// Resolves to the absolute local path, or `None` when the asset could not
/// be cached (or the request was invalidated); callers then fall back to the
/// remote url. The waiter is registered before the future is returned, so
/// it can be awaited lazily without losing the result.
///
/// Invalidating the url drops its waiters; a completion created before the
/// invalidation then resolves to `None` instead of staying pending.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Ready(Option<PathBuf>),
    Waiting(oneshot::Receiver<Option<PathBuf>>),
}

impl Completion {
    pub(crate) fn ready(path: Option<PathBuf>) -> Self {
        Self {
            inner: Inner::Ready(path),
        }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<Option<PathBuf>>) -> Self {
        Self {
            inner: Inner::Waiting(rx),
        }
    }

    /// Whether the result was known at enqueue time.
    pub fn is_immediate(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }
}

impl Future for Completion {
    type Output = Option<PathBuf>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Ready(path) => Poll::Ready(path.take()),
            // A closed channel means the waiter was discarded.
            Inner::Waiting(rx) => Pin::new(rx).poll(cx).map(|r| r.ok().flatten()),
        }
    }
}
