use super::SourceStream;
use anyhow::Result;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// File-backed stream.
///
/// Opened read-only with [`FileStream::open`] or read-write with
/// [`FileStream::create`]; the write capability is fixed at open time and
/// reflected in [`SourceStream::is_writable`].
pub struct FileStream {
    file: File,
    writable: bool,
}

impl FileStream {
    /// Open an existing file for reading only.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            file,
            writable: false,
        })
    }

    /// Open or create a file for reading and writing.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            writable: true,
        })
    }
}

#[async_trait]
impl SourceStream for FileStream {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(buf).await?;
        Ok(buf.len())
    }

    async fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    async fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
