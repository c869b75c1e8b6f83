use super::SourceStream;
use anyhow::{Result, bail};
use async_trait::async_trait;

/// In-memory backing stream.
///
/// Always seekable and writable. Useful for building archives entirely in
/// memory and as the staging fallback target in tests.
#[derive(Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream over existing content.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrow the current content.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the stream and return its content.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[async_trait]
impl SourceStream for MemoryStream {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset.min(self.data.len() as u64) as usize;
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        // A Vec holds at most isize::MAX bytes
        let Some(end) = usize::try_from(offset)
            .ok()
            .and_then(|offset| offset.checked_add(buf.len()))
            .filter(|&end| end <= isize::MAX as usize)
        else {
            bail!("write at offset {offset} exceeds in-memory capacity");
        };
        let offset = end - buf.len();
        // Writing past the current end zero-fills the gap
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn set_len(&mut self, len: u64) -> Result<()> {
        let Some(len) = usize::try_from(len)
            .ok()
            .filter(|&len| len <= isize::MAX as usize)
        else {
            bail!("length {len} exceeds in-memory capacity");
        };
        self.data.resize(len, 0);
        Ok(())
    }

    async fn len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }
}
