//! On-disk cache infra.
//!
//! Cached assets are plain files named `{md5(url)}.{ext}` inside a per-user,
//! per-kind folder, which keeps the cache content-addressed across sessions.

pub mod address;
pub mod file_store;

pub use address::*;
pub use file_store::*;
