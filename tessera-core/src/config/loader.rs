use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use thiserror::Error;

use super::{
    CacheConfig, StorageProfile,
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: LazyLock<Vec<PathBuf>> = LazyLock::new(|| {
    vec![
        PathBuf::from("tessera.toml"),
        PathBuf::from("config/tessera.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Skip the process environment and `.env` files entirely.
    pub ignore_env: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Result of a successful load, with provenance for diagnostics.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CacheConfig,
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn ignore_env(mut self) -> Self {
        self.options.ignore_env = true;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = if self.options.ignore_env {
            (EnvConfig::default(), false)
        } else {
            let loaded = self.load_env_file()?;
            (EnvConfig::gather(), loaded)
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let config = compose(file_config.unwrap_or_default(), env_config);
        config.validate()?;

        Ok(ConfigLoad {
            config,
            config_path,
            env_file_loaded,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = if let Some(path) = &self.options.config_path {
            (path.clone(), true)
        } else if let Some(path) = &env_config.config_path {
            (path.clone(), true)
        } else {
            match DEFAULT_CONFIG_LOCATIONS.iter().find(|c| c.exists()) {
                Some(path) => (path.clone(), false),
                None => return Ok((None, None)),
            }
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Layer file values then environment values over the defaults.
fn compose(file: FileConfig, env: EnvConfig) -> CacheConfig {
    let mut config = CacheConfig::default();

    let cache = file.cache;
    if let Some(v) = env.max_concurrency.or(cache.max_concurrency) {
        config.max_concurrency = v;
    }
    if let Some(v) = env.max_retries.or(cache.max_retries) {
        config.max_retries = v;
    }
    if let Some(v) = env.backoff_base_ms.or(cache.backoff_base_ms) {
        config.backoff_base_ms = v;
    }
    if let Some(v) = env.default_extension.or(cache.default_extension) {
        config.default_extension = v.trim_start_matches('.').to_ascii_lowercase();
    }
    if let Some(v) = cache.sniff_bytes {
        config.sniff_bytes = v.max(1);
    }
    if let Some(v) = env.fetch_timeout_secs.or(cache.fetch_timeout_secs) {
        config.fetch_timeout_secs = v;
    }
    if let Some(v) = cache.fetch_queue_size {
        config.fetch_queue_size = v.max(1);
    }
    if let Some(v) = cache.event_buffer {
        config.event_buffer = v.max(1);
    }

    let storage = file.storage;
    if let Some(profile) = env.profile.or(storage.profile) {
        config.storage.profile = profile;
    }
    if let Some(user_id) = env.user_id.or(storage.user_id) {
        config.storage.user_id = user_id;
    }
    config.storage.resource_root = storage.resource_root;
    config.storage.app_data_root = storage.app_data_root;
    if let Some(root) = env.storage_root {
        match config.storage.profile {
            StorageProfile::Desktop => config.storage.resource_root = Some(root),
            StorageProfile::Mobile => config.storage.app_data_root = Some(root),
        }
    }

    config
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
