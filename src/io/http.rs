use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::SourceStream;
use anyhow::{Result, anyhow, bail};

/// HTTP Range backing stream for remote archives.
///
/// Seekable but never writable: the engine can list and extract entries of
/// a remote archive, while every write-family command is refused during
/// capability negotiation.
pub struct HttpRangeStream {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: u64,
    max_retry: u32,
}

impl HttpRangeStream {
    /// Create a new HTTP Range stream.
    ///
    /// This sends a HEAD request to verify Range support and get the
    /// remote file size.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // Send HEAD request to check capabilities
        let resp = client.head(&url).send().await?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        // Check if server supports Range requests
        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            bail!("Remote server does not support Range requests");
        }

        // Get file size from Content-Length
        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: 0,
            max_retry: 10,
        })
    }

    /// Get total bytes transferred from the network.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }
}

#[async_trait]
impl SourceStream for HttpRangeStream {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self
                .client
                .get(&self.url)
                .header("Range", &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes += chunk_len as u64;
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded");
                    }
                    tracing::warn!(
                        retry = retry_count,
                        max = self.max_retry,
                        error = %e,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    async fn len(&mut self) -> Result<u64> {
        Ok(self.size)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        false
    }
}
