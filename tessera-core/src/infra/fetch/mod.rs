//! Byte fetching.
//!
//! [`Fetcher`] is the transport seam used by the dispatcher. [`HttpFetcher`]
//! talks to the network directly; [`FetchWorker`] moves any fetcher behind a
//! request/response channel pair correlated by url, so slow transfers never
//! run on the scheduling path.

mod http;
mod worker;

pub use http::{HttpFetcher, HttpSniffer};
pub use worker::{FetchRequest, FetchResponse, FetchWorker, FetchWorkerHandle};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

/// Low-level byte-fetch primitive.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Remote file-type detection consulted when a url carries no extension.
#[async_trait]
pub trait ContentSniffer: Send + Sync {
    /// Best-effort; `None` means "unknown" and is never an error.
    async fn sniff_extension(&self, url: &str) -> Option<String>;
}

/// Sniffer that never recognises anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSniff;

#[async_trait]
impl ContentSniffer for NoSniff {
    async fn sniff_extension(&self, _url: &str) -> Option<String> {
        None
    }
}
