mod file;
mod http;
mod memory;

pub use file::FileStream;
pub use http::HttpRangeStream;
pub use memory::MemoryStream;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for the backing stream a source bridge drives on behalf of the
/// archive engine.
///
/// A stream is positional: reads and writes name their offset explicitly,
/// and the bridge keeps the protocol-visible cursors itself. Write-family
/// methods have failing defaults so read-only backends only implement the
/// read side. Capability queries must stay truthful to what the backend
/// can actually do, because the bridge advertises commands based on them.
#[async_trait]
pub trait SourceStream: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// A short read is only expected at end-of-stream.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write data from the buffer at the specified offset.
    async fn write_at(&mut self, _offset: u64, _buf: &[u8]) -> Result<usize> {
        bail!("stream is not writable")
    }

    /// Truncate or extend the stream to the given length.
    async fn set_len(&mut self, _len: u64) -> Result<()> {
        bail!("stream is not writable")
    }

    /// Flush buffered data to the underlying storage.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the current total length of the stream.
    async fn len(&mut self) -> Result<u64>;

    /// Whether the read cursor can be repositioned arbitrarily.
    fn is_seekable(&self) -> bool;

    /// Whether the stream accepts writes.
    fn is_writable(&self) -> bool;
}
