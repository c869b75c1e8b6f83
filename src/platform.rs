//! Platform strategy for applying extracted entry metadata to restored
//! files.
//!
//! The archive layer never talks to the OS directly: it is handed one
//! [`PlatformServices`] strategy object at construction time, selected
//! once by the host for the target platform. The implementations here
//! are deliberately thin; anything beyond timestamps and ownership is
//! the host's business.

use anyhow::Result;
use std::fs::{File, FileTimes};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use crate::zip::EntryMetadata;

/// Strategy interface between the entry layer and the host OS.
pub trait PlatformServices: Send + Sync {
    /// Apply timestamps and ownership carried in extension records to a
    /// restored file. Fields the archive did not carry are left alone.
    fn apply_metadata(&self, path: &Path, metadata: &EntryMetadata) -> Result<()>;

    /// Collect the metadata of an existing file for archiving.
    fn filesystem_metadata(&self, path: &Path) -> Result<EntryMetadata>;
}

/// The strategy matching the platform this host was built for.
pub fn host_platform() -> Box<dyn PlatformServices> {
    #[cfg(unix)]
    {
        Box::new(UnixPlatform)
    }
    #[cfg(not(unix))]
    {
        Box::new(PortablePlatform)
    }
}

fn file_times(metadata: &EntryMetadata) -> FileTimes {
    let mut times = FileTimes::new();
    if let Some(mtime) = metadata.mtime {
        times = times.set_modified(UNIX_EPOCH + Duration::from_secs(u64::from(mtime)));
    }
    if let Some(atime) = metadata.atime {
        times = times.set_accessed(UNIX_EPOCH + Duration::from_secs(u64::from(atime)));
    }
    times
}

/// Unix strategy: timestamps plus uid/gid ownership.
#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl PlatformServices for UnixPlatform {
    fn apply_metadata(&self, path: &Path, metadata: &EntryMetadata) -> Result<()> {
        if metadata.mtime.is_some() || metadata.atime.is_some() {
            File::open(path)?.set_times(file_times(metadata))?;
        }
        if metadata.uid.is_some() || metadata.gid.is_some() {
            let narrow = |id: Option<u64>| id.and_then(|v| u32::try_from(v).ok());
            std::os::unix::fs::chown(path, narrow(metadata.uid), narrow(metadata.gid))?;
        }
        Ok(())
    }

    fn filesystem_metadata(&self, path: &Path) -> Result<EntryMetadata> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path)?;
        Ok(EntryMetadata {
            mtime: u32::try_from(meta.mtime()).ok(),
            atime: u32::try_from(meta.atime()).ok(),
            ctime: u32::try_from(meta.ctime()).ok(),
            uid: Some(u64::from(meta.uid())),
            gid: Some(u64::from(meta.gid())),
        })
    }
}

/// Fallback strategy: timestamps only, ownership has no portable
/// representation.
pub struct PortablePlatform;

impl PlatformServices for PortablePlatform {
    fn apply_metadata(&self, path: &Path, metadata: &EntryMetadata) -> Result<()> {
        if metadata.mtime.is_some() || metadata.atime.is_some() {
            File::options()
                .write(true)
                .open(path)?
                .set_times(file_times(metadata))?;
        }
        Ok(())
    }

    fn filesystem_metadata(&self, path: &Path) -> Result<EntryMetadata> {
        let meta = std::fs::metadata(path)?;
        let unix_secs = |time: std::io::Result<std::time::SystemTime>| {
            time.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| u32::try_from(d.as_secs()).ok())
        };
        Ok(EntryMetadata {
            mtime: unix_secs(meta.modified()),
            atime: unix_secs(meta.accessed()),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_mtime_survives_a_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restored.txt");
        std::fs::write(&path, b"content").unwrap();

        let platform = host_platform();
        let metadata = EntryMetadata {
            mtime: Some(715_355_974),
            ..Default::default()
        };
        platform.apply_metadata(&path, &metadata).unwrap();

        let observed = platform.filesystem_metadata(&path).unwrap();
        assert_eq!(observed.mtime, Some(715_355_974));
    }
}
