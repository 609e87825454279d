use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, RANGE};
use tracing::debug;

use super::{ContentSniffer, Fetcher};
use crate::error::FetchError;

/// Extensions preferred when a mime type maps to several.
const PREFERRED_EXTENSIONS: &[&str] =
    &["jpg", "png", "gif", "webp", "avif", "bmp", "mp4", "webm", "mov", "svg"];

fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(FetchError::from)
}

/// Plain HTTP GET transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        debug!(url, len = bytes.len(), "downloaded");
        Ok(bytes)
    }
}

/// Detects a remote file's type from its leading bytes.
///
/// A HEAD request confirms the resource exists, then a ranged GET pulls the
/// first `sniff_bytes` bytes. Magic numbers are checked first, the response
/// `Content-Type` second. Only image and video types are recognised.
#[derive(Debug, Clone)]
pub struct HttpSniffer {
    client: reqwest::Client,
    sniff_bytes: usize,
}

impl HttpSniffer {
    pub fn new(timeout: Duration, sniff_bytes: usize) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
            sniff_bytes: sniff_bytes.max(1),
        })
    }

    pub fn with_client(client: reqwest::Client, sniff_bytes: usize) -> Self {
        Self {
            client,
            sniff_bytes: sniff_bytes.max(1),
        }
    }

    async fn try_sniff(&self, url: &str) -> Result<Option<String>, FetchError> {
        let head = self.client.head(url).send().await?;
        if !head.status().is_success() {
            debug!(url, status = %head.status(), "sniff HEAD rejected");
            return Ok(None);
        }

        let mut response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes=0-{}", self.sniff_bytes - 1))
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // Servers are free to ignore Range; stop reading once we have enough.
        let mut prefix = BytesMut::with_capacity(self.sniff_bytes);
        while prefix.len() < self.sniff_bytes {
            match response.chunk().await? {
                Some(chunk) => prefix.extend_from_slice(&chunk),
                None => break,
            }
        }
        prefix.truncate(self.sniff_bytes);

        if let Some(ext) = extension_from_magic(&prefix) {
            return Ok(Some(ext));
        }
        Ok(content_type.as_deref().and_then(extension_from_content_type))
    }
}

#[async_trait]
impl ContentSniffer for HttpSniffer {
    async fn sniff_extension(&self, url: &str) -> Option<String> {
        match self.try_sniff(url).await {
            Ok(ext) => ext,
            Err(err) => {
                debug!(url, error = %err, "remote file type detection failed");
                None
            }
        }
    }
}

/// Identify an image or video from its leading bytes.
pub(crate) fn extension_from_magic(prefix: &[u8]) -> Option<String> {
    let kind = infer::get(prefix)?;
    match kind.matcher_type() {
        infer::MatcherType::Image | infer::MatcherType::Video => {
            Some(kind.extension().to_string())
        }
        _ => None,
    }
}

/// Map an `image/*` or `video/*` content type to an extension. Anything
/// else yields `None` so the default extension applies.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if !(essence.starts_with("image/") || essence.starts_with("video/")) {
        return None;
    }
    let candidates = mime_guess::get_mime_extensions_str(&essence)?;
    PREFERRED_EXTENSIONS
        .iter()
        .find(|preferred| candidates.contains(*preferred))
        .or_else(|| candidates.first())
        .map(|ext| ext.to_string())
}
