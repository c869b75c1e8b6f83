//! Write-staging buffer backing one transaction.
//!
//! Between BeginWrite and CommitWrite every byte the engine produces
//! lands here, never in the backing stream. The default backing store is
//! a temp file so staging a large archive does not pin its full size in
//! memory; when temp-file creation fails, or the host disabled temp
//! files, an in-memory buffer is used instead.

use anyhow::{Result, bail};
use std::io::SeekFrom;
use tempfile::{NamedTempFile, TempPath};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub(crate) enum StagingBuffer {
    TempFile {
        file: File,
        path: TempPath,
        cursor: u64,
        len: u64,
    },
    Memory {
        data: Vec<u8>,
        cursor: u64,
    },
}

impl StagingBuffer {
    /// Allocate a staging buffer.
    ///
    /// Temp-file creation failure is not a command failure: it degrades
    /// to in-memory staging and only exhausting that, too, would surface
    /// an error.
    pub(crate) fn allocate(use_temp_file: bool) -> Self {
        if use_temp_file {
            match NamedTempFile::new() {
                Ok(temp) => {
                    let (file, path) = temp.into_parts();
                    return StagingBuffer::TempFile {
                        file: File::from_std(file),
                        path,
                        cursor: 0,
                        len: 0,
                    };
                }
                Err(err) => {
                    tracing::warn!(error = %err, "temp file creation failed, staging in memory");
                }
            }
        }
        StagingBuffer::Memory {
            data: Vec::new(),
            cursor: 0,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        match self {
            StagingBuffer::TempFile { cursor, .. } => *cursor,
            StagingBuffer::Memory { cursor, .. } => *cursor,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        match self {
            StagingBuffer::TempFile { len, .. } => *len,
            StagingBuffer::Memory { data, .. } => data.len() as u64,
        }
    }

    /// Reposition the write cursor. Seeking past the end is legal; the
    /// gap is zero-filled by the next write.
    pub(crate) fn seek(&mut self, position: u64) {
        match self {
            StagingBuffer::TempFile { cursor, .. } => *cursor = position,
            StagingBuffer::Memory { cursor, .. } => *cursor = position,
        }
    }

    /// Write at the current cursor, advancing it.
    pub(crate) async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            StagingBuffer::TempFile {
                file, cursor, len, ..
            } => {
                file.seek(SeekFrom::Start(*cursor)).await?;
                file.write_all(buf).await?;
                *cursor += buf.len() as u64;
                *len = (*len).max(*cursor);
            }
            StagingBuffer::Memory { data, cursor } => {
                // A Vec holds at most isize::MAX bytes; a write landing
                // past that cannot be staged in memory
                let Some(end) = usize::try_from(*cursor)
                    .ok()
                    .and_then(|start| start.checked_add(buf.len()))
                    .filter(|&end| end <= isize::MAX as usize)
                else {
                    bail!("staged write at offset {cursor} exceeds in-memory capacity");
                };
                let start = end - buf.len();
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(buf);
                *cursor += buf.len() as u64;
            }
        }
        Ok(buf.len())
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if let StagingBuffer::TempFile { file, .. } = self {
            file.flush().await?;
        }
        Ok(())
    }

    /// Read staged content back for the commit copy.
    pub(crate) async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match self {
            StagingBuffer::TempFile { file, len, .. } => {
                let n = buf.len().min(len.saturating_sub(offset) as usize);
                if n == 0 {
                    return Ok(0);
                }
                file.seek(SeekFrom::Start(offset)).await?;
                file.read_exact(&mut buf[..n]).await?;
                Ok(n)
            }
            StagingBuffer::Memory { data, .. } => {
                let offset = (offset as usize).min(data.len());
                let n = buf.len().min(data.len() - offset);
                buf[..n].copy_from_slice(&data[offset..offset + n]);
                Ok(n)
            }
        }
    }

    /// Drop the buffer and delete any temp file.
    ///
    /// A failed deletion is logged and ignored: by the time this runs
    /// the archive's logical state is already final, and the file will
    /// get cleaned up eventually.
    pub(crate) fn discard(self) {
        if let StagingBuffer::TempFile { path, .. } = self {
            if let Err(err) = path.close() {
                tracing::warn!(error = %err, "could not delete staging temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn contents(staging: &mut StagingBuffer) -> Vec<u8> {
        let mut buf = vec![0u8; staging.len() as usize];
        let n = staging.read_at(0, &mut buf).await.unwrap();
        assert_eq!(n, buf.len());
        buf
    }

    #[tokio::test]
    async fn memory_staging_overwrites_and_extends() {
        let mut staging = StagingBuffer::allocate(false);
        staging.write(&[1u8; 4]).await.unwrap();
        staging.seek(2);
        staging.write(&[2u8; 4]).await.unwrap();

        assert_eq!(staging.len(), 6);
        assert_eq!(staging.position(), 6);
        assert_eq!(contents(&mut staging).await, [1, 1, 2, 2, 2, 2]);
        staging.discard();
    }

    #[tokio::test]
    async fn temp_file_staging_tracks_length_past_rewinds() {
        let mut staging = StagingBuffer::allocate(true);
        staging.write(&[7u8; 100]).await.unwrap();
        staging.seek(0);
        staging.write(&[9u8; 50]).await.unwrap();

        assert_eq!(staging.len(), 100);
        let data = contents(&mut staging).await;
        assert_eq!(&data[..50], &[9u8; 50][..]);
        assert_eq!(&data[50..], &[7u8; 50][..]);
        staging.discard();
    }

    #[tokio::test]
    async fn temp_file_is_deleted_on_discard() {
        let staging = StagingBuffer::allocate(true);
        let path = match &staging {
            StagingBuffer::TempFile { path, .. } => path.to_path_buf(),
            StagingBuffer::Memory { .. } => return, // no temp dir available
        };
        assert!(path.exists());
        staging.discard();
        assert!(!path.exists());
    }
}
