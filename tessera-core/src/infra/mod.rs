//! Infrastructure adapters: on-disk cache layout and network fetching.

pub mod cache;
pub mod fetch;
