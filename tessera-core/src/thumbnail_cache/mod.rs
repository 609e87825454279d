//! Thumbnail cache engine.
//!
//! [`ThumbnailCache`] turns remote urls into files on disk. Each url is
//! fetched at most once no matter how many callers ask for it, at most
//! `max_concurrency` tasks run at a time, and failed attempts are retried
//! with exponential backoff ahead of newly queued work.
//!
//! The engine is an explicit object: build it once at startup and hand out
//! clones (they share state).

mod completion;
mod state;
mod waiters;

pub use completion::Completion;

use std::{fmt, panic::AssertUnwindSafe, path::PathBuf, sync::Arc};

use futures::FutureExt;
use parking_lot::Mutex;
use tessera_model::{
    MessagePatch, Task, TaskStatus, ThumbnailEvent, ThumbnailRequest,
};
use tokio::{
    runtime::Handle,
    sync::{Notify, broadcast},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::CacheConfig,
    error::{CacheError, Result, panic_message},
    infra::{
        cache::{CacheAddress, ContentAddresser, ThumbnailFileStore},
        fetch::{
            ContentSniffer, FetchWorker, Fetcher, HttpFetcher, HttpSniffer,
        },
    },
    messages::{MessageStore, MessageStoreError, NoopMessageStore},
};

use state::{QueuedTask, RunningTask, SchedulerState};

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Entries in the status map.
    pub tracked: usize,
    pub queued: usize,
    /// Occupied worker slots (downloading or backing off).
    pub active: usize,
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
    /// Urls with at least one caller waiting.
    pub waiting_urls: usize,
}

#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    state: Mutex<SchedulerState>,
    store: ThumbnailFileStore,
    addresser: ContentAddresser,
    fetcher: Arc<dyn Fetcher>,
    messages: Arc<dyn MessageStore>,
    events: broadcast::Sender<ThumbnailEvent>,
    idle: Notify,
    runtime: Handle,
}

impl fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("base_root", &self.inner.store.base_root())
            .field("max_concurrency", &self.inner.config.max_concurrency)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Wires collaborators into a [`ThumbnailCache`].
///
/// Anything not supplied falls back to the production adapter: a file store
/// resolved from the storage config, an HTTP fetcher behind a
/// [`FetchWorker`], an HTTP sniffer and a no-op message store.
pub struct ThumbnailCacheBuilder {
    config: CacheConfig,
    store: Option<ThumbnailFileStore>,
    fetcher: Option<Arc<dyn Fetcher>>,
    sniffer: Option<Arc<dyn ContentSniffer>>,
    messages: Option<Arc<dyn MessageStore>>,
}

impl fmt::Debug for ThumbnailCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailCacheBuilder")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("custom_fetcher", &self.fetcher.is_some())
            .field("custom_sniffer", &self.sniffer.is_some())
            .field("custom_messages", &self.messages.is_some())
            .finish()
    }
}

impl ThumbnailCacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            store: None,
            fetcher: None,
            sniffer: None,
            messages: None,
        }
    }

    pub fn store(mut self, store: ThumbnailFileStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn sniffer(mut self, sniffer: Arc<dyn ContentSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    pub fn message_store(mut self, messages: Arc<dyn MessageStore>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Build the engine. Must be called from within a Tokio runtime, which
    /// then hosts every download task.
    pub fn build(self) -> Result<ThumbnailCache> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|err| {
            CacheError::Internal(format!(
                "thumbnail cache requires a Tokio runtime: {err}"
            ))
        })?;

        let store = match self.store {
            Some(store) => store,
            None => ThumbnailFileStore::from_config(&self.config.storage)?,
        };
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let http = HttpFetcher::new(self.config.fetch_timeout())?;
                let worker = FetchWorker::spawn(
                    Arc::new(http),
                    self.config.fetch_queue_size,
                );
                Arc::new(worker) as Arc<dyn Fetcher>
            }
        };
        let sniffer = match self.sniffer {
            Some(sniffer) => sniffer,
            None => Arc::new(HttpSniffer::new(
                self.config.fetch_timeout(),
                self.config.sniff_bytes,
            )?) as Arc<dyn ContentSniffer>,
        };
        let messages = self
            .messages
            .unwrap_or_else(|| Arc::new(NoopMessageStore));

        let addresser =
            ContentAddresser::new(sniffer, self.config.default_extension.clone());
        let (events, _) = broadcast::channel(self.config.event_buffer.max(1));

        info!(
            root = %store.base_root().display(),
            user = store.user_id(),
            max_concurrency = self.config.max_concurrency,
            max_retries = self.config.max_retries,
            "thumbnail cache initialized"
        );

        Ok(ThumbnailCache {
            inner: Arc::new(Inner {
                config: self.config,
                state: Mutex::new(SchedulerState::default()),
                store,
                addresser,
                fetcher,
                messages,
                events,
                idle: Notify::new(),
                runtime,
            }),
        })
    }
}

impl ThumbnailCache {
    /// Build an engine from explicit collaborators.
    pub fn new(
        config: CacheConfig,
        store: ThumbnailFileStore,
        fetcher: Arc<dyn Fetcher>,
        sniffer: Arc<dyn ContentSniffer>,
        messages: Arc<dyn MessageStore>,
    ) -> Result<Self> {
        ThumbnailCacheBuilder::new(config)
            .store(store)
            .fetcher(fetcher)
            .sniffer(sniffer)
            .message_store(messages)
            .build()
    }

    pub fn builder(config: CacheConfig) -> ThumbnailCacheBuilder {
        ThumbnailCacheBuilder::new(config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ThumbnailFileStore {
        &self.inner.store
    }

    /// Request a local copy of `request.url`.
    ///
    /// A completed url resolves immediately. A url already pending or
    /// downloading only gains another waiter. Otherwise (unknown or failed)
    /// a fresh task is queued and dispatch is kicked.
    pub fn enqueue_thumbnail(&self, request: ThumbnailRequest) -> Completion {
        if request.url.trim().is_empty() {
            warn!("ignoring thumbnail request with an empty url");
            return Completion::ready(None);
        }

        let rx = {
            let mut state = self.inner.state.lock();
            let existing = state
                .tasks
                .get(&request.url)
                .map(|task| (task.status, task.path.clone()));
            match existing {
                Some((TaskStatus::Completed, path)) => {
                    return Completion::ready(path);
                }
                Some((status, _)) if status.is_in_flight() => {
                    debug!(
                        url = %request.url,
                        %status,
                        "joining in-flight thumbnail task"
                    );
                    return Completion::waiting(
                        state.waiters.register(&request.url),
                    );
                }
                _ => {}
            }

            let id = state.next_task_id();
            let ThumbnailRequest {
                url,
                kind,
                correlation,
            } = request;
            debug!(url = %url, %kind, %id, "queueing thumbnail task");
            let rx = state.waiters.register(&url);
            state.queue.push_back(QueuedTask {
                id,
                url: url.clone(),
            });
            state
                .tasks
                .insert(url.clone(), Task::new(id, url, kind, correlation));
            rx
        };

        self.dispatch_next();
        Completion::waiting(rx)
    }

    pub fn get_status(&self, url: &str) -> Option<Task> {
        self.inner.state.lock().tasks.get(url).cloned()
    }

    /// Forget everything known about `url`.
    ///
    /// Pending waiters are dropped without a result (their completions
    /// resolve to `None`). A download already running for the url finishes
    /// its disk write but no longer reports back.
    pub fn invalidate(&self, url: &str) {
        if url.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        let removed = state.tasks.remove(url);
        let discarded = state.waiters.discard(url);
        if removed.is_some() || discarded > 0 {
            debug!(url, discarded, "invalidated thumbnail entry");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            tracked: state.tasks.len(),
            queued: state.queue.len(),
            active: state.active,
            downloading: state.count_with_status(TaskStatus::Downloading),
            completed: state.count_with_status(TaskStatus::Completed),
            failed: state.count_with_status(TaskStatus::Failed),
            waiting_urls: state.waiters.waiting_urls(),
        }
    }

    /// Receive a [`ThumbnailEvent`] for every terminal transition.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the queue is empty and no task holds a worker slot.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.state.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cache address `url` would be stored under, relative to the store root.
    pub async fn address_for(
        &self,
        request: &ThumbnailRequest,
    ) -> (CacheAddress, PathBuf) {
        let address = self.inner.addresser.address_for(&request.url).await;
        let relative = self
            .inner
            .store
            .relative_path(request.kind, &address.file_name());
        (address, relative)
    }

    /// Fill free worker slots from the queue.
    ///
    /// Each finished task calls back into this, which keeps the pool
    /// saturated without a polling loop.
    fn dispatch_next(&self) {
        loop {
            let job = {
                let mut state = self.inner.state.lock();
                if state.active >= self.inner.config.max_concurrency {
                    return;
                }
                match state.pop_runnable() {
                    Some(job) => {
                        state.active += 1;
                        job
                    }
                    None => {
                        if state.is_idle() {
                            self.inner.idle.notify_waiters();
                        }
                        return;
                    }
                }
            };

            debug!(url = %job.url, id = %job.id, "dispatching thumbnail task");
            let this = self.clone();
            self.inner.runtime.spawn(async move {
                this.run_task(job).await;
                this.release_slot();
                this.dispatch_next();
            });
        }
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.active = state.active.saturating_sub(1);
    }

    /// A panic in a collaborator counts as a failed attempt.
    async fn run_task(&self, job: RunningTask) {
        let attempt = AssertUnwindSafe(self.materialize(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(CacheError::Internal(format!(
                    "download task panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        match attempt {
            Ok(path) => self.complete(&job, path).await,
            Err(err) => self.fail(job, err).await,
        }
    }

    /// Ensure the file for `job` exists on disk and return its absolute path.
    async fn materialize(&self, job: &RunningTask) -> Result<PathBuf> {
        let store = &self.inner.store;
        let dir = store.ensure_dir(job.kind).await?;
        let address = self.inner.addresser.address_for(&job.url).await;
        let relative = dir.join(address.file_name());

        if store.exists(&relative).await? {
            debug!(url = %job.url, path = %relative.display(), "already cached on disk");
            return Ok(store.to_absolute(&relative));
        }

        let bytes = self.inner.fetcher.fetch(&job.url).await?;
        store.write(&relative, &bytes).await?;
        Ok(store.to_absolute(&relative))
    }

    async fn complete(&self, job: &RunningTask, path: PathBuf) {
        {
            let mut state = self.inner.state.lock();
            let Some(task) = state.current_mut(&job.url, job.id) else {
                debug!(url = %job.url, id = %job.id, "detached task finished; result not published");
                return;
            };
            task.status = TaskStatus::Completed;
            task.path = Some(path.clone());
            let retries = task.retries;
            let notified = state.waiters.notify(&job.url, Some(path.clone()));
            info!(url = %job.url, kind = %job.kind, retries, waiters = notified, "thumbnail cached");
        }

        let _ = self.inner.events.send(ThumbnailEvent::Completed {
            url: job.url.clone(),
            kind: job.kind,
            path: path.clone(),
        });

        let patch = MessagePatch::new(&job.correlation, job.kind, path);
        let persisted = AssertUnwindSafe(self.inner.messages.patch_media_path(&patch))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(MessageStoreError::Unavailable(format!(
                    "message store panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        if let Err(err) = persisted {
            warn!(
                url = %job.url,
                message_id = %patch.message_id,
                error = %err,
                "failed to persist local path on message"
            );
        }
    }

    async fn fail(&self, job: RunningTask, err: CacheError) {
        let max_retries = self.inner.config.max_retries;
        let delay = {
            let mut state = self.inner.state.lock();
            let Some(task) = state.current_mut(&job.url, job.id) else {
                debug!(url = %job.url, id = %job.id, error = %err, "detached task failed; dropping");
                return;
            };
            task.retries += 1;
            task.error = Some(err.to_string());
            let retries = task.retries;

            if retries < max_retries {
                task.status = TaskStatus::Pending;
                let delay = self.inner.config.backoff_for(retries);
                warn!(
                    url = %job.url,
                    retries,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "thumbnail download failed; retrying"
                );
                delay
            } else {
                task.status = TaskStatus::Failed;
                let notified = state.waiters.notify(&job.url, None);
                error!(
                    url = %job.url,
                    retries,
                    waiters = notified,
                    error = %err,
                    "thumbnail download failed permanently"
                );
                drop(state);
                let _ = self.inner.events.send(ThumbnailEvent::Failed {
                    url: job.url,
                    kind: job.kind,
                    error: err.to_string(),
                });
                return;
            }
        };

        tokio::time::sleep(delay).await;

        let mut state = self.inner.state.lock();
        if state.is_current(&job.url, job.id) {
            // Retries go ahead of newly queued work.
            state.queue.push_front(QueuedTask {
                id: job.id,
                url: job.url,
            });
        } else {
            debug!(url = %job.url, id = %job.id, "task invalidated during backoff");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::fetch::NoSniff;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tessera_model::TaskKind;

    use crate::error::FetchError;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(format!("bytes of {url}")))
        }
    }

    fn cache_with(
        root: &std::path::Path,
        fetcher: Arc<dyn Fetcher>,
    ) -> ThumbnailCache {
        ThumbnailCache::builder(CacheConfig::default())
            .store(ThumbnailFileStore::new(root.to_path_buf(), "u1"))
            .fetcher(fetcher)
            .sniffer(Arc::new(NoSniff))
            .build()
            .expect("build cache")
    }

    #[test]
    fn build_outside_runtime_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let err = ThumbnailCache::builder(CacheConfig::default())
            .store(ThumbnailFileStore::new(tmp.path().to_path_buf(), "u1"))
            .fetcher(Arc::new(CountingFetcher::default()))
            .sniffer(Arc::new(NoSniff))
            .build()
            .expect_err("no runtime");
        assert!(matches!(err, CacheError::Internal(_)));
    }

    #[tokio::test]
    async fn completed_urls_resolve_immediately_without_new_work() {
        let tmp = tempdir().expect("tempdir");
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = cache_with(tmp.path(), fetcher.clone());

        let request = ThumbnailRequest::image("https://x/a.png", "m", "r");
        let first = cache.enqueue_thumbnail(request.clone()).await;
        assert!(first.is_some());

        let again = cache.enqueue_thumbnail(request);
        assert!(again.is_immediate());
        assert_eq!(again.await, first);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_url_resolves_to_none() {
        let tmp = tempdir().expect("tempdir");
        let cache = cache_with(tmp.path(), Arc::new(CountingFetcher::default()));
        let completion =
            cache.enqueue_thumbnail(ThumbnailRequest::image("", "m", "r"));
        assert_eq!(completion.await, None);
        assert_eq!(cache.stats().tracked, 0);
    }

    #[tokio::test]
    async fn stats_reflect_completed_work() {
        let tmp = tempdir().expect("tempdir");
        let cache = cache_with(tmp.path(), Arc::new(CountingFetcher::default()));
        let a = cache.enqueue_thumbnail(ThumbnailRequest::image(
            "https://x/a.png",
            "m",
            "r",
        ));
        let b = cache.enqueue_thumbnail(ThumbnailRequest::new(
            "https://x/b.gif",
            TaskKind::Emoji,
            Default::default(),
        ));
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_some() && b.is_some());

        cache.wait_idle().await;
        let stats = cache.stats();
        assert_eq!(stats.tracked, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.waiting_urls, 0);
    }
}
