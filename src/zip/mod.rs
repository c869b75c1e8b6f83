//! Extra-field codec for ZIP entry metadata extensions.
//!
//! Archive entries carry tagged, variable-length metadata blocks ("extra
//! fields") in both their local and central headers. This module decodes
//! and encodes the payload bytes of those blocks independently of any
//! I/O; the archive engine hands over already-located byte slices keyed
//! by a 16-bit extension id and a header location.
//!
//! ## Components
//!
//! - [`fields`]: raw records, well-known ids, bounds-checked byte helpers
//! - [`codec`]: typed variants with decode/encode per extension id
//! - [`resolve`]: merge policy when several records describe one entry
//!
//! ## Validity model
//!
//! Decoding never fails. A malformed payload produces a view flagged
//! `data_valid = false`, which consumers drop silently; a broken vendor
//! extension must not break extraction of the rest of the archive.

pub mod codec;
pub mod fields;
pub mod resolve;

pub use codec::{
    DecodedField, ExtendedTimestamp, ExtraField, Unix3rdGeneration, UnixOriginal, UnixType2,
};
pub use fields::{HeaderLocation, MAX_FIELD_DATA, RawExtraField, ids};
pub use resolve::{EntryMetadata, resolve_entry_metadata};
