//! Source I/O bridge: the command-dispatch object between the archive
//! engine and a host-supplied backing stream.
//!
//! The engine knows nothing about the host's storage. Every byte it
//! reads or writes goes through one [`SourceBridge`], which translates
//! the engine's command protocol into operations on a [`SourceStream`]
//! and keeps the transactional write state. The bridge holds no archive
//! semantics at all; it is pure I/O plumbing.
//!
//! ## Command flow
//!
//! Reading: Open resets the read cursor, Read hands back clamped chunks
//! until a zero-length read signals end-of-stream, Stat/Seek/Tell answer
//! metadata and positioning.
//!
//! Writing is transactional: BeginWrite opens a staging buffer, Write
//! and SeekWrite fill it, and only CommitWrite replaces the backing
//! stream's content with the staged bytes. RollbackWrite leaves the
//! backing stream byte-identical to its pre-transaction content.
//!
//! ## Error model
//!
//! Nothing panics or propagates `Result` across the dispatch boundary;
//! the calling convention is modeled on a plain function pointer.
//! Handlers that fail record a structured [`SourceError`] and return the
//! protocol's `-1` sentinel, and the engine retrieves the recorded error
//! through the Error command.

pub mod arena;
pub mod command;
mod staging;

pub use arena::{BridgeArena, BridgeHandle};
pub use command::{
    ErrorCode, STAT_MTIME, STAT_SIZE, SeekArgs, SourceCommand, SourceError, SourceStat, Whence,
    command_bitmask,
};

use std::time::{SystemTime, UNIX_EPOCH};

use crate::io::SourceStream;
use staging::StagingBuffer;

/// Copy granularity for the commit step.
const COMMIT_CHUNK: usize = 64 * 1024;

/// One bridge instance: exclusive owner of a backing stream for its
/// lifetime, plus the write-transaction state.
pub struct SourceBridge {
    stream: Box<dyn SourceStream>,
    read_pos: u64,
    staging: Option<StagingBuffer>,
    use_temp_file: bool,
    last_error: SourceError,
}

impl SourceBridge {
    /// Create a bridge over a backing stream, staging writes in a temp
    /// file.
    pub fn new(stream: impl SourceStream + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            read_pos: 0,
            staging: None,
            use_temp_file: true,
            last_error: SourceError::OK,
        }
    }

    /// Create a bridge that stages writes in memory instead of a temp
    /// file.
    pub fn with_memory_staging(stream: impl SourceStream + 'static) -> Self {
        Self {
            use_temp_file: false,
            ..Self::new(stream)
        }
    }

    /// The capability bitmask this bridge advertises, computed from what
    /// the backing stream can actually do.
    pub fn supports(&self) -> u64 {
        use SourceCommand::*;

        let mut mask = command_bitmask(&[Open, Read, Close, Stat, Error, Free]);
        if self.stream.is_seekable() {
            mask |= command_bitmask(&[Seek, Tell, Supports]);
        }
        if self.stream.is_writable() {
            mask |= command_bitmask(&[
                BeginWrite,
                CommitWrite,
                RollbackWrite,
                Write,
                SeekWrite,
                TellWrite,
                Remove,
            ]);
        }
        mask
    }

    /// The last error a command recorded.
    pub fn last_error(&self) -> SourceError {
        self.last_error
    }

    /// Whether a write transaction is open.
    pub fn is_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// Borrow the backing stream.
    pub fn stream_mut(&mut self) -> &mut dyn SourceStream {
        &mut *self.stream
    }

    /// Execute one engine command.
    ///
    /// `data` carries the command's argument or result record; its
    /// meaning depends on the command. The return value is a byte count
    /// or `0` on success and `-1` on failure, with the structured error
    /// retrievable through [`SourceCommand::Error`].
    pub async fn dispatch(&mut self, cmd: SourceCommand, data: &mut [u8]) -> i64 {
        tracing::debug!(?cmd, len = data.len(), "source command");
        match self.handle(cmd, data).await {
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(?cmd, code = ?err.code, system = err.system, "command failed");
                // A failed Error command (short buffer) must not clobber
                // the recorded error the engine is trying to retrieve
                if cmd != SourceCommand::Error {
                    self.last_error = err;
                }
                -1
            }
        }
    }

    async fn handle(&mut self, cmd: SourceCommand, data: &mut [u8]) -> Result<i64, SourceError> {
        use SourceCommand::*;

        // Never act on a command the stream's capabilities don't cover.
        // Supports, Error and Free are answerable regardless.
        let always = command_bitmask(&[Supports, Error, Free]);
        if cmd.bit() & (self.supports() | always) == 0 {
            return Err(SourceError::new(ErrorCode::OpNotSupp));
        }

        match cmd {
            Open => {
                self.read_pos = 0;
                Ok(0)
            }

            Read => {
                let len = self.stream_len().await?;
                let remaining = len.saturating_sub(self.read_pos);
                let want = (data.len() as u64).min(remaining) as usize;
                if want == 0 {
                    // Zero bytes at end-of-stream is the normal
                    // termination signal, not an error
                    return Ok(0);
                }
                let n = self
                    .stream
                    .read_at(self.read_pos, &mut data[..want])
                    .await
                    .map_err(|e| stream_error(ErrorCode::Read, &e))?;
                self.read_pos += n as u64;
                Ok(n as i64)
            }

            Stat => {
                let size = self.stream_len().await?;
                let stat = SourceStat {
                    valid: STAT_SIZE | STAT_MTIME,
                    size,
                    mtime: unix_now(),
                };
                let n = stat
                    .write_to(data)
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                Ok(n as i64)
            }

            Error => {
                let n = self
                    .last_error
                    .write_to(data)
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                Ok(n as i64)
            }

            Seek => {
                let args =
                    SeekArgs::from_bytes(data).ok_or(SourceError::new(ErrorCode::Inval))?;
                let len = self.stream_len().await?;
                self.read_pos = seek_target(self.read_pos, len, args, Some(len))?;
                Ok(0)
            }

            Tell => Ok(self.read_pos as i64),

            BeginWrite => {
                if self.staging.is_some() {
                    // Nested transactions are a protocol violation
                    return Err(SourceError::new(ErrorCode::Inval));
                }
                self.staging = Some(StagingBuffer::allocate(self.use_temp_file));
                Ok(0)
            }

            Write => {
                let staging = self
                    .staging
                    .as_mut()
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                let n = staging
                    .write(data)
                    .await
                    .map_err(|e| stream_error(ErrorCode::Write, &e))?;
                Ok(n as i64)
            }

            SeekWrite => {
                let args =
                    SeekArgs::from_bytes(data).ok_or(SourceError::new(ErrorCode::Inval))?;
                let staging = self
                    .staging
                    .as_mut()
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                let target = seek_target(staging.position(), staging.len(), args, None)?;
                staging.seek(target);
                Ok(0)
            }

            TellWrite => {
                let staging = self
                    .staging
                    .as_ref()
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                Ok(staging.position() as i64)
            }

            CommitWrite => {
                let mut staging = self
                    .staging
                    .take()
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                let result = self.replace_with_staged(&mut staging).await;
                staging.discard();
                result?;
                self.read_pos = 0;
                Ok(0)
            }

            RollbackWrite => {
                let staging = self
                    .staging
                    .take()
                    .ok_or(SourceError::new(ErrorCode::Inval))?;
                staging.discard();
                Ok(0)
            }

            Close => {
                self.stream
                    .flush()
                    .await
                    .map_err(|e| stream_error(ErrorCode::Write, &e))?;
                Ok(0)
            }

            Remove => {
                self.stream
                    .set_len(0)
                    .await
                    .map_err(|e| stream_error(ErrorCode::Write, &e))?;
                self.read_pos = 0;
                Ok(0)
            }

            Supports => Ok(self.supports() as i64),

            // Context release is the arena's business; at bridge level
            // there is nothing left to do
            Free => Ok(0),
        }
    }

    async fn stream_len(&mut self) -> Result<u64, SourceError> {
        self.stream
            .len()
            .await
            .map_err(|e| stream_error(ErrorCode::Read, &e))
    }

    /// The in-place replace step of CommitWrite: truncate the backing
    /// stream to the staged length and copy the staged bytes over.
    ///
    /// Best-effort atomicity: a failure before the truncate leaves the
    /// original content intact; a failure mid-copy surfaces as the
    /// command's error with the stream in its partially-written state.
    async fn replace_with_staged(
        &mut self,
        staging: &mut StagingBuffer,
    ) -> Result<(), SourceError> {
        staging
            .flush()
            .await
            .map_err(|e| stream_error(ErrorCode::Write, &e))?;

        let staged_len = staging.len();
        self.stream
            .set_len(staged_len)
            .await
            .map_err(|e| stream_error(ErrorCode::Write, &e))?;

        let mut buf = vec![0u8; COMMIT_CHUNK];
        let mut offset = 0;
        while offset < staged_len {
            let n = staging
                .read_at(offset, &mut buf)
                .await
                .map_err(|e| stream_error(ErrorCode::Read, &e))?;
            if n == 0 {
                return Err(SourceError::new(ErrorCode::Internal));
            }
            self.stream
                .write_at(offset, &buf[..n])
                .await
                .map_err(|e| stream_error(ErrorCode::Write, &e))?;
            offset += n as u64;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| stream_error(ErrorCode::Write, &e))
    }
}

/// Compute the absolute seek target for a whence-relative offset.
///
/// Cursors are unsigned 64-bit, so a target past `i64::MAX` arrives as
/// two seek commands (Set to `i64::MAX`, then a relative Cur for the
/// remainder); the widened arithmetic here makes that composition exact.
/// `clamp_end` bounds read seeks to the stream length; write seeks may
/// land past the staged end, where the gap is zero-filled on write.
fn seek_target(
    current: u64,
    end: u64,
    args: SeekArgs,
    clamp_end: Option<u64>,
) -> Result<u64, SourceError> {
    let origin = match args.whence {
        Whence::Set => 0,
        Whence::Cur => current,
        Whence::End => end,
    };

    let target = origin as i128 + args.offset as i128;
    if target < 0 || target > u64::MAX as i128 {
        return Err(SourceError::new(ErrorCode::Seek));
    }
    let target = target as u64;

    if let Some(end) = clamp_end {
        if target > end {
            return Err(SourceError::new(ErrorCode::Seek));
        }
    }
    Ok(target)
}

fn stream_error(code: ErrorCode, err: &anyhow::Error) -> SourceError {
    let system = err
        .downcast_ref::<std::io::Error>()
        .and_then(|io| io.raw_os_error())
        .unwrap_or(0);
    SourceError::with_system(code, system)
}

fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
    }
}
