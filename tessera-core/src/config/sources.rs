use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{CacheConfig, StorageProfile};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub cache: FileCacheConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniff_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<StorageProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_data_root: Option<PathBuf>,
}

impl From<&CacheConfig> for FileConfig {
    /// Render a resolved config back into the on-disk file shape.
    fn from(config: &CacheConfig) -> Self {
        Self {
            cache: FileCacheConfig {
                max_concurrency: Some(config.max_concurrency),
                max_retries: Some(config.max_retries),
                backoff_base_ms: Some(config.backoff_base_ms),
                default_extension: Some(config.default_extension.clone()),
                sniff_bytes: Some(config.sniff_bytes),
                fetch_timeout_secs: Some(config.fetch_timeout_secs),
                fetch_queue_size: Some(config.fetch_queue_size),
                event_buffer: Some(config.event_buffer),
            },
            storage: FileStorageConfig {
                profile: Some(config.storage.profile),
                user_id: Some(config.storage.user_id.clone()),
                resource_root: config.storage.resource_root.clone(),
                app_data_root: config.storage.app_data_root.clone(),
            },
        }
    }
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub default_extension: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub user_id: Option<String>,
    pub profile: Option<StorageProfile>,
    /// Root applied to whichever profile is active.
    pub storage_root: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::gather_from(|name| std::env::var(name).ok())
    }

    /// Collect overrides through an arbitrary lookup, so callers can feed a
    /// map instead of the process environment.
    pub fn gather_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            config_path: lookup("TESSERA_CONFIG").map(PathBuf::from),
            max_concurrency: parse_var(&lookup, "TESSERA_MAX_CONCURRENCY"),
            max_retries: parse_var(&lookup, "TESSERA_MAX_RETRIES"),
            backoff_base_ms: parse_var(&lookup, "TESSERA_BACKOFF_BASE_MS"),
            default_extension: lookup("TESSERA_DEFAULT_EXTENSION"),
            fetch_timeout_secs: parse_var(&lookup, "TESSERA_FETCH_TIMEOUT_SECS"),
            user_id: lookup("TESSERA_USER_ID")
                .filter(|s| !s.trim().is_empty()),
            profile: lookup("TESSERA_PROFILE").and_then(|s| s.parse().ok()),
            storage_root: lookup("TESSERA_STORAGE_ROOT").map(PathBuf::from),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|raw| raw.trim().parse().ok())
}
