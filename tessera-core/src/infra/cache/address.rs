use std::{fmt, sync::Arc, sync::LazyLock};

use md5::{Digest, Md5};
use regex::Regex;
use tracing::debug;

use crate::infra::fetch::ContentSniffer;

static URL_EXTENSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([a-zA-Z0-9]+)(?:\?|$)").expect("valid extension regex")
});

/// Stable, hex-encoded MD5 of a resource url.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_url(url: &str) -> Self {
        Self(hex::encode(Md5::digest(url.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.0).finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a url lands in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheAddress {
    pub cache_key: CacheKey,
    pub extension: String,
}

impl CacheAddress {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.cache_key, self.extension)
    }
}

/// Pull a file extension out of a url.
///
/// Path and query are inspected when the url parses, so a bare host such
/// as `https://example.com` does not yield `com` while
/// `https://x/get?name=a.png` still yields `png`. Unparseable input is
/// matched as-is, minus any fragment.
pub fn extension_from_url(url: &str) -> Option<String> {
    let candidate = match reqwest::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        },
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    };

    URL_EXTENSION_PATTERN
        .captures(&candidate)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Derives cache keys and extensions for urls.
///
/// Resolution never fails: the url itself is consulted first, then the
/// sniffer, and finally the configured default extension.
#[derive(Clone)]
pub struct ContentAddresser {
    sniffer: Arc<dyn ContentSniffer>,
    default_extension: String,
}

impl fmt::Debug for ContentAddresser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentAddresser")
            .field("default_extension", &self.default_extension)
            .finish_non_exhaustive()
    }
}

impl ContentAddresser {
    pub fn new(
        sniffer: Arc<dyn ContentSniffer>,
        default_extension: impl Into<String>,
    ) -> Self {
        Self {
            sniffer,
            default_extension: default_extension.into(),
        }
    }

    pub async fn address_for(&self, url: &str) -> CacheAddress {
        let cache_key = CacheKey::for_url(url);

        if let Some(extension) = extension_from_url(url) {
            return CacheAddress {
                cache_key,
                extension,
            };
        }

        let extension = match self.sniffer.sniff_extension(url).await {
            Some(ext) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => {
                debug!(url, "no extension resolved; using default");
                self.default_extension.clone()
            }
        };

        CacheAddress {
            cache_key,
            extension,
        }
    }
}
