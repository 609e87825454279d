//! # Tessera Core
//!
//! Client-side cache for remote media previews (image and video thumbnails,
//! custom emojis).
//!
//! ## Overview
//!
//! - **Deduplication**: any number of requests for one url share a single
//!   download and all resolve to the same local path
//! - **Bounded concurrency**: a FIFO queue feeds a fixed number of worker
//!   slots, with failed attempts retried ahead of new work
//! - **Content addressing**: files are named `{md5(url)}.{ext}` under a
//!   per-user, per-kind folder so the cache survives restarts
//! - **Message patching**: successful downloads are written back to the
//!   owning chat message through the [`messages::MessageStore`] port
//!
//! ## Architecture
//!
//! - [`thumbnail_cache`]: the scheduling engine and its public facade
//! - [`infra::cache`]: address computation and the on-disk file store
//! - [`infra::fetch`]: HTTP fetching, remote type sniffing, fetch worker
//! - [`config`]: layered configuration (defaults, TOML file, environment)
//!
//! ## Example
//!
//! ```no_run
//! use tessera_core::{CacheConfig, ThumbnailCache};
//! use tessera_model::ThumbnailRequest;
//!
//! # async fn demo() -> tessera_core::Result<()> {
//! let cache = ThumbnailCache::builder(CacheConfig::default()).build()?;
//! let path = cache
//!     .enqueue_thumbnail(ThumbnailRequest::image(
//!         "https://cdn.example.com/a.png",
//!         "message-1",
//!         "room-1",
//!     ))
//!     .await;
//! println!("{path:?}");
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod infra;
pub mod messages;
pub mod thumbnail_cache;

pub use config::{CacheConfig, ConfigLoader, StorageConfig, StorageProfile};
pub use error::{CacheError, FetchError, Result};
pub use messages::{InMemoryMessageStore, MessageStore, NoopMessageStore};
pub use thumbnail_cache::{
    CacheStats, Completion, ThumbnailCache, ThumbnailCacheBuilder,
};

pub use tessera_model as model;
