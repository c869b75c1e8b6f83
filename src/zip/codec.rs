//! Typed extra-field variants and their decode/encode rules.
//!
//! Each variant is a decoded view over one raw record payload. Decoding
//! never fails: a malformed or truncated payload yields a view with
//! `data_valid == false` and every typed field unset, so bad vendor data
//! cannot break extraction of the rest of the archive. Encoding can fail,
//! but only for genuinely impossible requests (a half-set id pair, an
//! oversized payload) or when the post-encode self-check detects that the
//! produced byte count does not match what the flags declare.
//!
//! All multi-byte integers are little-endian and read through the
//! bounds-checked cursor helpers in [`fields`](super::fields); running past
//! the end of the payload is a decode failure, not a panic.

use anyhow::{Result, bail};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;

use super::fields::{self, HeaderLocation, MAX_FIELD_DATA, ids};

/// Extended timestamp field (0x5455, "UT").
///
/// Layout: one flags byte (bit 0 mtime, bit 1 atime, bit 2 ctime), then
/// the present timestamps as 32-bit Unix times in bit order. The central
/// copy carries at most the modification time; its flags still describe
/// the local record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedTimestamp {
    pub mtime: Option<u32>,
    pub atime: Option<u32>,
    pub ctime: Option<u32>,
}

/// Info-ZIP UNIX original field (0x5855, "UX").
///
/// Layout: access time then modification time as 32-bit Unix times,
/// optionally followed by 16-bit UID and GID in local headers only. A
/// zero timestamp is the unset sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnixOriginal {
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
    pub uid: Option<u16>,
    pub gid: Option<u16>,
}

/// Info-ZIP UNIX type 2 field (0x7855, "Ux").
///
/// Local layout: 16-bit UID then 16-bit GID. The central copy has a
/// zero-length payload and serves purely as a flag that the ids are
/// present in the local header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnixType2 {
    pub uid: Option<u16>,
    pub gid: Option<u16>,
}

/// Info-ZIP UNIX 3rd generation field (0x7875, "ux").
///
/// Layout: a version byte (must be 0 or 1), then a size-prefixed UID of
/// 1, 2, 4 or 8 bytes, then a GID in the same encoding. Encoding always
/// writes version 1 and the narrowest width each id fits in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unix3rdGeneration {
    pub uid: Option<u64>,
    pub gid: Option<u64>,
}

/// A typed view over one extra-field payload, keyed by the 16-bit
/// extension id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    ExtendedTimestamp(ExtendedTimestamp),
    UnixOriginal(UnixOriginal),
    UnixType2(UnixType2),
    Unix3rdGeneration(Unix3rdGeneration),
    /// Any other id; the payload is carried through untouched.
    Opaque { id: u16, data: Vec<u8> },
}

/// Result of decoding one raw record.
///
/// `data_valid` is false whenever the payload was malformed; consumers
/// drop such records silently instead of raising errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub field: ExtraField,
    pub data_valid: bool,
}

impl ExtraField {
    /// The extension id this variant encodes under.
    pub fn id(&self) -> u16 {
        match self {
            ExtraField::ExtendedTimestamp(_) => ids::EXTENDED_TIMESTAMP,
            ExtraField::UnixOriginal(_) => ids::INFOZIP_UNIX_ORIGINAL,
            ExtraField::UnixType2(_) => ids::INFOZIP_UNIX_TYPE2,
            ExtraField::Unix3rdGeneration(_) => ids::INFOZIP_UNIX_3RD_GENERATION,
            ExtraField::Opaque { id, .. } => *id,
        }
    }

    /// Decode a raw payload into a typed, validity-flagged view.
    ///
    /// Never fails; malformed input is reported through
    /// [`DecodedField::data_valid`].
    pub fn decode(id: u16, location: HeaderLocation, data: &[u8]) -> DecodedField {
        let (field, data_valid) = match id {
            ids::EXTENDED_TIMESTAMP => {
                let (ts, valid) = decode_extended_timestamp(location, data);
                (ExtraField::ExtendedTimestamp(ts), valid)
            }
            ids::INFOZIP_UNIX_ORIGINAL => {
                let (unix, valid) = decode_unix_original(location, data);
                (ExtraField::UnixOriginal(unix), valid)
            }
            ids::INFOZIP_UNIX_TYPE2 => {
                let (unix, valid) = decode_unix_type2(location, data);
                (ExtraField::UnixType2(unix), valid)
            }
            ids::INFOZIP_UNIX_3RD_GENERATION => {
                let (unix, valid) = decode_unix_3rd_generation(data);
                (ExtraField::Unix3rdGeneration(unix), valid)
            }
            _ => (
                ExtraField::Opaque {
                    id,
                    data: data.to_vec(),
                },
                data.len() <= MAX_FIELD_DATA,
            ),
        };
        DecodedField { field, data_valid }
    }

    /// Encode this view into the raw payload for the given header.
    ///
    /// Unset fields are omitted from the flags and contribute no bytes.
    pub fn encode(&self, location: HeaderLocation) -> Result<Vec<u8>> {
        match self {
            ExtraField::ExtendedTimestamp(ts) => encode_extended_timestamp(ts, location),
            ExtraField::UnixOriginal(unix) => encode_unix_original(unix, location),
            ExtraField::UnixType2(unix) => encode_unix_type2(unix, location),
            ExtraField::Unix3rdGeneration(unix) => encode_unix_3rd_generation(unix),
            ExtraField::Opaque { data, .. } => {
                if data.len() > MAX_FIELD_DATA {
                    bail!("extra field payload exceeds {} bytes", MAX_FIELD_DATA);
                }
                Ok(data.clone())
            }
        }
    }
}

const FLAG_MTIME: u8 = 0x01;
const FLAG_ATIME: u8 = 0x02;
const FLAG_CTIME: u8 = 0x04;

fn decode_extended_timestamp(
    location: HeaderLocation,
    data: &[u8],
) -> (ExtendedTimestamp, bool) {
    let mut ts = ExtendedTimestamp::default();
    let mut cursor = Cursor::new(data);

    let Some(flags) = fields::read_u8(&mut cursor) else {
        return (ts, false);
    };

    let mtime_present = flags & FLAG_MTIME != 0;
    let atime_present = flags & FLAG_ATIME != 0;
    let ctime_present = flags & FLAG_CTIME != 0;

    // The flags always describe the local record; the central copy carries
    // at most the modification time regardless of what else is flagged.
    let mut expected = 1;
    if mtime_present {
        expected += 4;
    }
    if location.is_local() {
        if atime_present {
            expected += 4;
        }
        if ctime_present {
            expected += 4;
        }
    }

    if data.len() != expected {
        return (ts, false);
    }

    if mtime_present {
        ts.mtime = fields::read_u32(&mut cursor);
    }
    if location.is_local() {
        if atime_present {
            ts.atime = fields::read_u32(&mut cursor);
        }
        if ctime_present {
            ts.ctime = fields::read_u32(&mut cursor);
        }
    }

    (ts, true)
}

fn encode_extended_timestamp(
    ts: &ExtendedTimestamp,
    location: HeaderLocation,
) -> Result<Vec<u8>> {
    let mut flags = 0u8;
    let mut expected = 1;

    if ts.mtime.is_some() {
        flags |= FLAG_MTIME;
        expected += 4;
    }
    if ts.atime.is_some() && location.is_local() {
        flags |= FLAG_ATIME;
        expected += 4;
    }
    if ts.ctime.is_some() && location.is_local() {
        flags |= FLAG_CTIME;
        expected += 4;
    }

    let mut data = Vec::with_capacity(expected);
    data.push(flags);
    if let Some(mtime) = ts.mtime {
        data.write_u32::<LittleEndian>(mtime)?;
    }
    if location.is_local() {
        if let Some(atime) = ts.atime {
            data.write_u32::<LittleEndian>(atime)?;
        }
        if let Some(ctime) = ts.ctime {
            data.write_u32::<LittleEndian>(ctime)?;
        }
    }

    if data.len() != expected {
        bail!(
            "extended timestamp encoded to {} bytes, flags declare {}",
            data.len(),
            expected
        );
    }
    Ok(data)
}

fn decode_unix_original(location: HeaderLocation, data: &[u8]) -> (UnixOriginal, bool) {
    let mut unix = UnixOriginal::default();

    let valid_len = match location {
        HeaderLocation::Local => data.len() == 8 || data.len() == 12,
        HeaderLocation::Central => data.len() == 8,
    };
    if !valid_len {
        return (unix, false);
    }

    let mut cursor = Cursor::new(data);
    // A zero timestamp means "not recorded"
    unix.atime = fields::read_u32(&mut cursor).filter(|&t| t != 0);
    unix.mtime = fields::read_u32(&mut cursor).filter(|&t| t != 0);

    if location.is_local() && data.len() == 12 {
        unix.uid = fields::read_u16(&mut cursor);
        unix.gid = fields::read_u16(&mut cursor);
    }

    (unix, true)
}

fn encode_unix_original(unix: &UnixOriginal, location: HeaderLocation) -> Result<Vec<u8>> {
    let with_ids = location.is_local() && (unix.uid.is_some() || unix.gid.is_some());
    if with_ids && (unix.uid.is_none() || unix.gid.is_none()) {
        bail!("UNIX original field requires uid and gid to be set together");
    }

    let expected = if with_ids { 12 } else { 8 };
    let mut data = Vec::with_capacity(expected);
    data.write_u32::<LittleEndian>(unix.atime.unwrap_or(0))?;
    data.write_u32::<LittleEndian>(unix.mtime.unwrap_or(0))?;
    if with_ids {
        data.write_u16::<LittleEndian>(unix.uid.unwrap_or(0))?;
        data.write_u16::<LittleEndian>(unix.gid.unwrap_or(0))?;
    }

    if data.len() != expected {
        bail!(
            "UNIX original field encoded to {} bytes, expected {}",
            data.len(),
            expected
        );
    }
    Ok(data)
}

fn decode_unix_type2(location: HeaderLocation, data: &[u8]) -> (UnixType2, bool) {
    let mut unix = UnixType2::default();

    match location {
        // The zero-length central copy is valid purely as a presence flag
        HeaderLocation::Central => (unix, data.is_empty()),
        HeaderLocation::Local => {
            if data.len() != 4 {
                return (unix, false);
            }
            let mut cursor = Cursor::new(data);
            unix.uid = fields::read_u16(&mut cursor);
            unix.gid = fields::read_u16(&mut cursor);
            (unix, true)
        }
    }
}

fn encode_unix_type2(unix: &UnixType2, location: HeaderLocation) -> Result<Vec<u8>> {
    match location {
        HeaderLocation::Central => Ok(Vec::new()),
        HeaderLocation::Local => {
            let (Some(uid), Some(gid)) = (unix.uid, unix.gid) else {
                bail!("local UNIX type 2 field requires both uid and gid");
            };
            let mut data = Vec::with_capacity(4);
            data.write_u16::<LittleEndian>(uid)?;
            data.write_u16::<LittleEndian>(gid)?;
            Ok(data)
        }
    }
}

fn decode_unix_3rd_generation(data: &[u8]) -> (Unix3rdGeneration, bool) {
    let unix = Unix3rdGeneration::default();
    let mut cursor = Cursor::new(data);

    let Some(version) = fields::read_u8(&mut cursor) else {
        return (unix, false);
    };
    if version > 1 {
        // Unsupported version, regardless of payload content
        return (unix, false);
    }

    let Some(uid) = read_sized_id(&mut cursor) else {
        return (unix, false);
    };
    let Some(gid) = read_sized_id(&mut cursor) else {
        return (unix, false);
    };

    // Trailing bytes mean the sizes and the payload length disagree
    if cursor.position() != data.len() as u64 {
        return (unix, false);
    }

    (
        Unix3rdGeneration {
            uid: Some(uid),
            gid: Some(gid),
        },
        true,
    )
}

fn read_sized_id(cursor: &mut Cursor<&[u8]>) -> Option<u64> {
    let size = fields::read_u8(cursor)?;
    match size {
        1 => fields::read_u8(cursor).map(u64::from),
        2 => fields::read_u16(cursor).map(u64::from),
        4 => fields::read_u32(cursor).map(u64::from),
        8 => fields::read_u64(cursor),
        _ => None,
    }
}

fn encode_unix_3rd_generation(unix: &Unix3rdGeneration) -> Result<Vec<u8>> {
    let (Some(uid), Some(gid)) = (unix.uid, unix.gid) else {
        bail!("UNIX 3rd generation field requires both uid and gid");
    };

    let uid_width = id_width(uid);
    let gid_width = id_width(gid);
    let expected = 1 + (1 + uid_width as usize) + (1 + gid_width as usize);

    let mut data = Vec::with_capacity(expected);
    data.push(1); // version
    write_sized_id(&mut data, uid, uid_width)?;
    write_sized_id(&mut data, gid, gid_width)?;

    if data.len() != expected {
        bail!(
            "UNIX 3rd generation field encoded to {} bytes, expected {}",
            data.len(),
            expected
        );
    }
    Ok(data)
}

/// Narrowest of the permitted widths (1/2/4/8) the id fits in.
fn id_width(id: u64) -> u8 {
    if id <= u64::from(u8::MAX) {
        1
    } else if id <= u64::from(u16::MAX) {
        2
    } else if id <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

fn write_sized_id(data: &mut Vec<u8>, id: u64, width: u8) -> Result<()> {
    data.push(width);
    match width {
        1 => data.write_u8(id as u8)?,
        2 => data.write_u16::<LittleEndian>(id as u16)?,
        4 => data.write_u32::<LittleEndian>(id as u32)?,
        8 => data.write_u64::<LittleEndian>(id)?,
        _ => bail!("invalid id width {}", width),
    }
    Ok(())
}
