#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tessera_core::{
    CacheConfig, FetchError, MessageStore, ThumbnailCache,
    infra::{cache::ThumbnailFileStore, fetch::NoSniff},
    messages::MessageStoreError,
    model::MessagePatch,
};
use tokio::{sync::Semaphore, time::Instant};

pub const USER: &str = "u1";

/// Scriptable in-memory fetcher.
///
/// Urls can be told to fail a number of times before succeeding, fetches can
/// be held behind a gate, and every call is recorded with its start time.
#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<Vec<(String, Instant)>>,
    failures: Mutex<HashMap<String, u32>>,
    panics: Mutex<HashSet<String>>,
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit from the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(gate.clone()),
                ..Self::default()
            },
            gate,
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_times(self, url: &str, times: u32) -> Self {
        self.failures.lock().insert(url.to_string(), times);
        self
    }

    pub fn always_fail(self, url: &str) -> Self {
        self.fail_times(url, u32::MAX)
    }

    /// Fetching `url` panics instead of returning.
    pub fn panic_on(self, url: &str) -> Self {
        self.panics.lock().insert(url.to_string());
        self
    }

    pub fn set_failures(&self, url: &str, times: u32) {
        self.failures.lock().insert(url.to_string(), times);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Poll until `n` fetches have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl tessera_core::infra::fetch::Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls.lock().push((url.to_string(), Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate semaphore open")
                .forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.lock().contains(url) {
            panic!("fake fetcher blew up on {url}");
        }

        let should_fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(url) {
                Some(0) | None => false,
                Some(remaining) => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
            }
        };
        if should_fail {
            return Err(FetchError::Remote(format!("scripted failure for {url}")));
        }
        Ok(Bytes::from(format!("payload:{url}")))
    }
}

/// Message store whose every patch fails.
#[derive(Debug, Default)]
pub struct BrokenMessageStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl MessageStore for BrokenMessageStore {
    async fn patch_media_path(
        &self,
        patch: &MessagePatch,
    ) -> Result<(), MessageStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MessageStoreError::Persist {
            message_id: patch.message_id.clone(),
            reason: "database is locked".into(),
        })
    }
}

/// Message store that panics on every patch.
#[derive(Debug, Default)]
pub struct PanickingMessageStore;

#[async_trait]
impl MessageStore for PanickingMessageStore {
    async fn patch_media_path(
        &self,
        patch: &MessagePatch,
    ) -> Result<(), MessageStoreError> {
        panic!("message store blew up on {}", patch.message_id);
    }
}

pub fn store_at(root: &Path) -> ThumbnailFileStore {
    ThumbnailFileStore::new(root.to_path_buf(), USER)
}

pub fn cache_with(
    root: &Path,
    config: CacheConfig,
    fetcher: Arc<FakeFetcher>,
) -> ThumbnailCache {
    ThumbnailCache::builder(config)
        .store(store_at(root))
        .fetcher(fetcher)
        .sniffer(Arc::new(NoSniff))
        .build()
        .expect("build cache")
}

pub fn config(max_concurrency: usize, max_retries: u32) -> CacheConfig {
    CacheConfig {
        max_concurrency,
        max_retries,
        ..CacheConfig::default()
    }
}
