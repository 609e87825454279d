use thiserror::Error;

use crate::config::ConfigLoadError;

/// Failure reported by a byte fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("download failed: {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("download failed: {url} returned an empty body")]
    EmptyBody { url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("fetch worker is not running")]
    WorkerClosed,

    /// Error text carried back across the fetch worker boundary.
    #[error("{0}")]
    Remote(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
