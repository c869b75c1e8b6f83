//! # zipsource
//!
//! A stream-backed source I/O bridge and extra-field codec for
//! libzip-style archive engines.
//!
//! The archive engine owns the container format, compression and central
//! directory, but it never touches storage itself: every byte it reads
//! or writes passes through a caller-supplied source answering a small
//! command protocol (open, read, write, seek, stat, commit, rollback,
//! ...). This crate provides the two pieces that protocol needs on the
//! host side:
//!
//! - [`SourceBridge`]: adapts any [`SourceStream`] backend (local file,
//!   in-memory buffer, HTTP Range endpoint) to the engine's command set,
//!   including transactional write staging with atomic commit.
//! - [`zip`]: a codec for the binary metadata extensions ("extra
//!   fields") carried in each entry's local and central headers -
//!   extended timestamps and Unix ownership ids - plus the merge policy
//!   for entries carrying several records of the same type.
//!
//! ## Features
//!
//! - Capability negotiation: the bridge only advertises the commands its
//!   backing stream can honor
//! - Write transactions staged in a temp file (or memory) and committed
//!   atomically onto the backing stream
//! - Stable integer handles for bridges crossing the callback boundary,
//!   with freed-handle guards instead of pinned pointers
//! - Malformed vendor extension data degrades to "invalid record", never
//!   to a failed extraction
//!
//! ## Example
//!
//! ```no_run
//! use zipsource::{BridgeArena, MemoryStream, SourceBridge, SourceCommand};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut arena = BridgeArena::new();
//!     let handle = arena.allocate(SourceBridge::new(MemoryStream::new()));
//!
//!     // The engine negotiates capabilities, then drives the source
//!     let supports = arena
//!         .dispatch(handle, SourceCommand::Supports, &mut [])
//!         .await;
//!     assert!(supports as u64 & SourceCommand::BeginWrite.bit() != 0);
//!
//!     arena.dispatch(handle, SourceCommand::Free, &mut []).await;
//! }
//! ```

pub mod bridge;
pub mod io;
pub mod platform;
pub mod zip;

pub use bridge::{
    BridgeArena, BridgeHandle, ErrorCode, SeekArgs, SourceBridge, SourceCommand, SourceError,
    SourceStat, Whence,
};
pub use io::{FileStream, HttpRangeStream, MemoryStream, SourceStream};
pub use platform::{PlatformServices, host_platform};
pub use zip::{
    DecodedField, EntryMetadata, ExtraField, HeaderLocation, RawExtraField,
    resolve_entry_metadata,
};
