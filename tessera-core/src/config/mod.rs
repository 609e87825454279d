//! Cache engine configuration.
//!
//! [`CacheConfig`] is the resolved, validated configuration consumed by the
//! engine. [`ConfigLoader`] composes it from defaults, an optional TOML file,
//! and `TESSERA_*` environment variables (in increasing precedence).

mod loader;
mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use sources::{EnvConfig, FileCacheConfig, FileConfig, FileStorageConfig};

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_EXTENSION: &str = "jpg";
/// Prefix length requested when sniffing a remote file type.
pub const DEFAULT_SNIFF_BYTES: usize = 4100;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FETCH_QUEUE_SIZE: usize = 256;
pub const DEFAULT_EVENT_BUFFER: usize = 1024;
pub const DEFAULT_USER_ID: &str = "default";

/// Which platform storage root backs the cache.
///
/// Desktop builds keep user data next to the application resources, mobile
/// builds keep it in the per-app data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProfile {
    #[default]
    Desktop,
    Mobile,
}

impl fmt::Display for StorageProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageProfile::Desktop => f.write_str("desktop"),
            StorageProfile::Mobile => f.write_str("mobile"),
        }
    }
}

impl FromStr for StorageProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(StorageProfile::Desktop),
            "mobile" => Ok(StorageProfile::Mobile),
            other => Err(format!("unknown storage profile: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub profile: StorageProfile,
    pub user_id: String,
    /// Overrides the desktop resource root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_root: Option<PathBuf>,
    /// Overrides the mobile app-data root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_data_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            profile: StorageProfile::default(),
            user_id: DEFAULT_USER_ID.to_string(),
            resource_root: None,
            app_data_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub default_extension: String,
    pub sniff_bytes: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_queue_size: usize,
    pub event_buffer: usize,
    pub storage: StorageConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            default_extension: DEFAULT_EXTENSION.to_string(),
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            fetch_queue_size: DEFAULT_FETCH_QUEUE_SIZE,
            event_buffer: DEFAULT_EVENT_BUFFER,
            storage: StorageConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Delay before the attempt following failure number `retries` (1-based):
    /// `base * 2^(retries - 1)`.
    pub fn backoff_for(&self, retries: u32) -> Duration {
        let exp = retries.saturating_sub(1).min(16);
        self.backoff_base().saturating_mul(1u32 << exp)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_concurrency == 0 {
            return Err(ConfigLoadError::Invalid(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigLoadError::Invalid(
                "max_retries must be at least 1".into(),
            ));
        }
        let ext = self.default_extension.as_str();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigLoadError::Invalid(format!(
                "default_extension must be alphanumeric, got '{ext}'"
            )));
        }
        if self.storage.user_id.trim().is_empty()
            || self.storage.user_id.contains(['/', '\\'])
            || self.storage.user_id == ".."
        {
            return Err(ConfigLoadError::Invalid(format!(
                "user_id '{}' is not a valid directory name",
                self.storage.user_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let config = CacheConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(500));
        assert_eq!(config.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn defaults_validate() {
        CacheConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = CacheConfig {
            max_concurrency: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigLoadError::Invalid(_))));
    }

    #[test]
    fn user_id_with_separator_is_rejected() {
        let mut config = CacheConfig::default();
        config.storage.user_id = "a/b".into();
        assert!(config.validate().is_err());
    }
}
