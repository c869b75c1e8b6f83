use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Maximum payload size of a single extra field (the length prefix in the
/// entry header is 16 bits).
pub const MAX_FIELD_DATA: usize = 65535;

/// Well-known extension ids registered in the ZIP APPNOTE and by Info-ZIP.
///
/// Only the ids this crate decodes get dedicated types; everything else is
/// carried opaquely.
pub mod ids {
    /// ZIP64 extended information
    pub const ZIP64_EXTENDED_INFORMATION: u16 = 0x0001;
    /// Extended timestamp ("UT")
    pub const EXTENDED_TIMESTAMP: u16 = 0x5455;
    /// Info-ZIP UNIX, original ("UX")
    pub const INFOZIP_UNIX_ORIGINAL: u16 = 0x5855;
    /// Info-ZIP UNIX, 16-bit UID/GID ("Ux")
    pub const INFOZIP_UNIX_TYPE2: u16 = 0x7855;
    /// Info-ZIP UNIX 3rd generation, variable-width UID/GID ("ux")
    pub const INFOZIP_UNIX_3RD_GENERATION: u16 = 0x7875;
}

/// Which of an entry's two headers a field was read from or is destined
/// for.
///
/// Local headers are the richer of the pair; central headers deliberately
/// carry terser copies of the same logical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLocation {
    Local,
    Central,
}

impl HeaderLocation {
    pub fn is_local(self) -> bool {
        self == HeaderLocation::Local
    }
}

/// One raw extension record attached to an archive entry, exclusive of the
/// id/length prefix the container format wraps around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtraField {
    /// Extension type tag
    pub id: u16,
    /// Header the record came from or is destined for
    pub location: HeaderLocation,
    /// Index of the owning entry within the archive
    pub entry_index: u64,
    /// Index within the list of same-typed records on this entry
    pub field_index: u16,
    /// Record payload
    pub data: Vec<u8>,
}

impl RawExtraField {
    pub fn new(id: u16, location: HeaderLocation, data: Vec<u8>) -> Self {
        Self {
            id,
            location,
            entry_index: 0,
            field_index: 0,
            data,
        }
    }
}

/// Read a u16 from the cursor, or `None` past the end of the buffer.
pub(crate) fn read_u16(cursor: &mut Cursor<&[u8]>) -> Option<u16> {
    cursor.read_u16::<LittleEndian>().ok()
}

/// Read a u32 from the cursor, or `None` past the end of the buffer.
pub(crate) fn read_u32(cursor: &mut Cursor<&[u8]>) -> Option<u32> {
    cursor.read_u32::<LittleEndian>().ok()
}

/// Read a u64 from the cursor, or `None` past the end of the buffer.
pub(crate) fn read_u64(cursor: &mut Cursor<&[u8]>) -> Option<u64> {
    cursor.read_u64::<LittleEndian>().ok()
}

/// Read a single byte from the cursor, or `None` past the end.
pub(crate) fn read_u8(cursor: &mut Cursor<&[u8]>) -> Option<u8> {
    ReadBytesExt::read_u8(cursor).ok()
}
