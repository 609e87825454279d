use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::Fetcher;
use crate::error::{FetchError, panic_message};

/// Request sent to the fetch worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
}

/// Response published by the fetch worker, echoing the requested url.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub outcome: Result<Bytes, String>,
}

/// Runs a [`Fetcher`] behind a message-passing boundary.
///
/// Requests arrive over an mpsc queue; every response is broadcast to all
/// listeners, which keep only the one whose url matches their request.
#[derive(Debug)]
pub struct FetchWorker;

impl FetchWorker {
    /// Spawn the worker on the current Tokio runtime.
    ///
    /// The worker stops once every [`FetchWorkerHandle`] is dropped.
    pub fn spawn(
        fetcher: Arc<dyn Fetcher>,
        queue_size: usize,
    ) -> FetchWorkerHandle {
        let (requests, mut rx) = mpsc::channel::<FetchRequest>(queue_size.max(1));
        let (responses, _) =
            broadcast::channel::<FetchResponse>(queue_size.max(1) * 4);

        let publish = responses.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let fetcher = Arc::clone(&fetcher);
                let publish = publish.clone();
                // Each request runs on its own task.
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(fetcher.fetch(&request.url))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(FetchError::Remote(format!(
                                "fetcher panicked: {}",
                                panic_message(panic.as_ref())
                            )))
                        })
                        .map_err(|err| err.to_string());
                    if let Err(err) = &outcome {
                        debug!(url = %request.url, error = %err, "fetch worker request failed");
                    }
                    let _ = publish.send(FetchResponse {
                        url: request.url,
                        outcome,
                    });
                });
            }
            debug!("fetch worker stopped");
        });

        FetchWorkerHandle {
            requests,
            responses,
        }
    }
}

#[derive(Clone)]
pub struct FetchWorkerHandle {
    requests: mpsc::Sender<FetchRequest>,
    responses: broadcast::Sender<FetchResponse>,
}

impl fmt::Debug for FetchWorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchWorkerHandle")
            .field("queue_capacity", &self.requests.capacity())
            .field("listeners", &self.responses.receiver_count())
            .finish()
    }
}

impl FetchWorkerHandle {
    /// Ask the worker for `url` and wait for the matching response.
    ///
    /// Responses for other urls are ignored.
    pub async fn request(&self, url: &str) -> Result<Bytes, FetchError> {
        // Subscribe before sending so the response cannot be missed.
        let mut responses = self.responses.subscribe();
        self.requests
            .send(FetchRequest {
                url: url.to_string(),
            })
            .await
            .map_err(|_| FetchError::WorkerClosed)?;

        loop {
            match responses.recv().await {
                Ok(response) if response.url == url => {
                    return response.outcome.map_err(FetchError::Remote);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(url, skipped, "fetch responses lagged; treating as failure");
                    return Err(FetchError::Remote(format!(
                        "fetch response lost ({skipped} responses skipped)"
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(FetchError::WorkerClosed);
                }
            }
        }
    }
}

#[async_trait]
impl Fetcher for FetchWorkerHandle {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.request(url).await
    }
}
