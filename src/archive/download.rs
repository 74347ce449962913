//! Archive download over HTTP.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ArkError, Result};

const DOWNLOAD_USER_AGENT: &str = concat!("arkmesh/", env!("CARGO_PKG_VERSION"));

/// Fetches a remote file to a local path.
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streams the response body straight to disk.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// `connect_timeout` bounds connection setup. `read_timeout` bounds each
    /// read, so a stalled body fails while a slow but steady one completes.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| ArkError::Download(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, DOWNLOAD_USER_AGENT)
            .send()
            .await
            .map_err(|e| ArkError::Download(format!("Request for '{}' failed: {}", url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ArkError::Download(format!(
                "Download failed, status: {}",
                status.as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ArkError::Download(format!("Failed reading body of '{}': {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl AssetDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!(url, dest = %dest.display(), "Downloading archive");
        match self.fetch_to(url, dest).await {
            Ok(bytes) => {
                debug!(bytes, "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(dest).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", dest.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }
}

/// Downloader for tests: serves fixed bytes and counts calls.
#[cfg(test)]
pub struct MockDownloader {
    pub body: std::sync::Mutex<Option<Vec<u8>>>,
    pub calls: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl MockDownloader {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            body: std::sync::Mutex::new(Some(body)),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Every download fails as if the server answered 404.
    pub fn failing() -> Self {
        Self {
            body: std::sync::Mutex::new(None),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl AssetDownloader for MockDownloader {
    async fn download(&self, _url: &str, dest: &Path) -> Result<u64> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone();
        match body {
            Some(bytes) => {
                tokio::fs::write(dest, &bytes).await?;
                Ok(bytes.len() as u64)
            }
            None => Err(ArkError::Download(
                "Download failed, status: 404".to_string(),
            )),
        }
    }
}
