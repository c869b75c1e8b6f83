//! Command table and fixed-layout argument structures of the source
//! protocol.
//!
//! The archive engine drives a source through a single callback taking a
//! command tag plus an opaque argument buffer. Commands that need
//! structured arguments (Seek, Stat, Error) encode them as fixed-layout
//! little-endian records whose field order and byte widths are part of
//! the protocol; the types here own those layouts.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Commands the archive engine may issue against a source, mirroring the
/// engine's `ZIP_SOURCE_*` table. The discriminants are protocol values:
/// the Supports bitmask is built from `1 << discriminant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceCommand {
    /// Prepare for reading
    Open = 0,
    /// Read data into the argument buffer
    Read = 1,
    /// Reading is done
    Close = 2,
    /// Get meta information
    Stat = 3,
    /// Get error information
    Error = 4,
    /// Clean up and free resources
    Free = 5,
    /// Set position for reading
    Seek = 6,
    /// Get read position
    Tell = 7,
    /// Prepare for writing
    BeginWrite = 8,
    /// Writing is done
    CommitWrite = 9,
    /// Discard written changes
    RollbackWrite = 10,
    /// Write data
    Write = 11,
    /// Set position for writing
    SeekWrite = 12,
    /// Get write position
    TellWrite = 13,
    /// Check whether the source supports a command
    Supports = 14,
    /// Remove the underlying content; issued when an archive is closed
    /// while empty
    Remove = 15,
}

impl SourceCommand {
    /// This command's bit in a Supports bitmask.
    pub fn bit(self) -> u64 {
        1 << (self as u64)
    }
}

/// Build a Supports bitmask from a set of commands.
pub fn command_bitmask(commands: &[SourceCommand]) -> u64 {
    commands.iter().fold(0, |mask, cmd| mask | cmd.bit())
}

/// Seek origin carried in [`SeekArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Whence::Set),
            1 => Some(Whence::Cur),
            2 => Some(Whence::End),
            _ => None,
        }
    }

    fn as_i32(self) -> i32 {
        match self {
            Whence::Set => 0,
            Whence::Cur => 1,
            Whence::End => 2,
        }
    }
}

/// Argument record of the Seek and SeekWrite commands.
///
/// Wire layout: signed 64-bit offset, then 32-bit whence, little-endian.
/// Positions themselves are unsigned 64-bit; a target past `i64::MAX`
/// reaches the bridge as a Set to `i64::MAX` followed by a relative Cur
/// seek for the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekArgs {
    pub offset: i64,
    pub whence: Whence,
}

impl SeekArgs {
    pub const SIZE: usize = 12;

    /// Parse the record, or `None` if the buffer is too short or the
    /// whence value is unknown.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(data);
        let offset = cursor.read_i64::<LittleEndian>().ok()?;
        let whence = Whence::from_i32(cursor.read_i32::<LittleEndian>().ok()?)?;
        Some(Self { offset, whence })
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.whence.as_i32().to_le_bytes());
        buf
    }
}

/// Validity bit: the size field of a stat record is meaningful.
pub const STAT_SIZE: u64 = 0x0004;
/// Validity bit: the mtime field of a stat record is meaningful.
pub const STAT_MTIME: u64 = 0x0010;

/// Result record of the Stat command.
///
/// Wire layout: validity bitmask (u64), stream length (u64), last
/// modification as Unix seconds (i64), little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStat {
    pub valid: u64,
    pub size: u64,
    pub mtime: i64,
}

impl SourceStat {
    pub const SIZE: usize = 24;

    /// Serialize into the argument buffer. Returns `None` if the buffer
    /// cannot hold the record.
    pub fn write_to(self, data: &mut [u8]) -> Option<usize> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut cursor = Cursor::new(data);
        cursor.write_u64::<LittleEndian>(self.valid).ok()?;
        cursor.write_u64::<LittleEndian>(self.size).ok()?;
        cursor.write_i64::<LittleEndian>(self.mtime).ok()?;
        Some(Self::SIZE)
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(data);
        Some(Self {
            valid: cursor.read_u64::<LittleEndian>().ok()?,
            size: cursor.read_u64::<LittleEndian>().ok()?,
            mtime: cursor.read_i64::<LittleEndian>().ok()?,
        })
    }
}

/// Engine error codes the bridge can raise, with the engine's numeric
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Seek = 4,
    Read = 5,
    Write = 6,
    Open = 11,
    TmpOpen = 12,
    Eof = 17,
    Inval = 18,
    Internal = 20,
    OpNotSupp = 28,
    Tell = 30,
}

/// Structured error surfaced through the Error command: an engine error
/// code plus the OS errno that caused it, when one exists.
///
/// Wire layout: two little-endian i32 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceError {
    pub code: ErrorCode,
    pub system: i32,
}

impl SourceError {
    pub const SIZE: usize = 8;
    pub const OK: SourceError = SourceError {
        code: ErrorCode::Ok,
        system: 0,
    };

    pub fn new(code: ErrorCode) -> Self {
        Self { code, system: 0 }
    }

    pub fn with_system(code: ErrorCode, system: i32) -> Self {
        Self { code, system }
    }

    /// Serialize into the argument buffer. Returns `None` if the buffer
    /// cannot hold the record.
    pub fn write_to(self, data: &mut [u8]) -> Option<usize> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut cursor = Cursor::new(data);
        cursor.write_i32::<LittleEndian>(self.code as i32).ok()?;
        cursor.write_i32::<LittleEndian>(self.system).ok()?;
        Some(Self::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_uses_protocol_discriminants() {
        assert_eq!(SourceCommand::Open.bit(), 1);
        assert_eq!(SourceCommand::Supports.bit(), 1 << 14);
        assert_eq!(
            command_bitmask(&[SourceCommand::Open, SourceCommand::Read]),
            0b11
        );
    }

    #[test]
    fn seek_args_round_trip() {
        let args = SeekArgs {
            offset: -42,
            whence: Whence::End,
        };
        let bytes = args.to_bytes();
        assert_eq!(bytes.len(), SeekArgs::SIZE);
        assert_eq!(SeekArgs::from_bytes(&bytes), Some(args));
    }

    #[test]
    fn seek_args_reject_malformed_input() {
        assert_eq!(SeekArgs::from_bytes(&[0u8; 4]), None);

        // Unknown whence value
        let mut bytes = SeekArgs {
            offset: 0,
            whence: Whence::Set,
        }
        .to_bytes();
        bytes[8] = 9;
        assert_eq!(SeekArgs::from_bytes(&bytes), None);
    }

    #[test]
    fn stat_record_layout_is_little_endian() {
        let stat = SourceStat {
            valid: STAT_SIZE | STAT_MTIME,
            size: 0x0102_0304,
            mtime: 100,
        };
        let mut buf = [0u8; SourceStat::SIZE];
        assert_eq!(stat.write_to(&mut buf), Some(SourceStat::SIZE));
        assert_eq!(&buf[0..8], &(STAT_SIZE | STAT_MTIME).to_le_bytes());
        assert_eq!(&buf[8..16], &0x0102_0304u64.to_le_bytes());
        assert_eq!(SourceStat::from_bytes(&buf), Some(stat));

        let mut short = [0u8; 8];
        assert_eq!(stat.write_to(&mut short), None);
    }

    #[test]
    fn error_record_carries_both_codes() {
        let err = SourceError::with_system(ErrorCode::Read, 5);
        let mut buf = [0u8; SourceError::SIZE];
        assert_eq!(err.write_to(&mut buf), Some(SourceError::SIZE));
        assert_eq!(&buf[0..4], &5i32.to_le_bytes());
        assert_eq!(&buf[4..8], &5i32.to_le_bytes());
    }
}
