use std::{collections::HashMap, path::PathBuf};

use tokio::sync::oneshot;

pub(crate) type WaiterResult = Option<PathBuf>;

/// Per-url completion channels, fired in registration order.
#[derive(Debug, Default)]
pub(crate) struct WaiterRegistry {
    waiters: HashMap<String, Vec<oneshot::Sender<WaiterResult>>>,
}

impl WaiterRegistry {
    pub(crate) fn register(
        &mut self,
        url: &str,
    ) -> oneshot::Receiver<WaiterResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(url.to_string()).or_default().push(tx);
        rx
    }

    /// Deliver `result` to every waiter on `url` and forget them.
    ///
    /// Returns how many waiters were registered; unknown urls are a no-op.
    pub(crate) fn notify(&mut self, url: &str, result: WaiterResult) -> usize {
        let Some(waiters) = self.waiters.remove(url) else {
            return 0;
        };
        let count = waiters.len();
        for waiter in waiters {
            // A dropped receiver just means the caller stopped listening.
            let _ = waiter.send(result.clone());
        }
        count
    }

    /// Drop the waiters on `url` without delivering a result.
    pub(crate) fn discard(&mut self, url: &str) -> usize {
        self.waiters.remove(url).map(|w| w.len()).unwrap_or(0)
    }

    pub(crate) fn waiting_urls(&self) -> usize {
        self.waiters.len()
    }

    #[cfg(test)]
    pub(crate) fn waiting_on(&self, url: &str) -> usize {
        self.waiters.get(url).map(Vec::len).unwrap_or(0)
    }
}
