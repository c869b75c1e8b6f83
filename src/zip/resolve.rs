//! Merge policy for entries carrying several metadata records.
//!
//! One entry routinely carries the same logical data more than once: a
//! local and a central copy of a field, or both a legacy and a modern
//! Unix id record. Resolution walks the records in a fixed priority
//! order and only ever fills fields that are still unset, so the most
//! specific record wins and terser central copies merely fill gaps.

use super::codec::ExtraField;
use super::fields::{HeaderLocation, RawExtraField, ids};

/// Metadata accumulated from an entry's extension records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub mtime: Option<u32>,
    pub atime: Option<u32>,
    pub ctime: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
}

impl EntryMetadata {
    fn merge(&mut self, field: &ExtraField) {
        match field {
            ExtraField::Unix3rdGeneration(unix) => {
                fill(&mut self.uid, unix.uid);
                fill(&mut self.gid, unix.gid);
            }
            ExtraField::UnixType2(unix) => {
                fill(&mut self.uid, unix.uid.map(u64::from));
                fill(&mut self.gid, unix.gid.map(u64::from));
            }
            ExtraField::ExtendedTimestamp(ts) => {
                fill(&mut self.mtime, ts.mtime);
                fill(&mut self.atime, ts.atime);
                fill(&mut self.ctime, ts.ctime);
            }
            ExtraField::UnixOriginal(unix) => {
                fill(&mut self.mtime, unix.mtime);
                fill(&mut self.atime, unix.atime);
                fill(&mut self.uid, unix.uid.map(u64::from));
                fill(&mut self.gid, unix.gid.map(u64::from));
            }
            ExtraField::Opaque { .. } => {}
        }
    }
}

/// Never overwrite a field a higher-priority record already populated.
fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Ids in decreasing order of specificity. The 3rd-generation record
/// carries full-width ids, the type 2 record 16-bit ids; the extended
/// timestamp is richer than the original Unix field's fixed pair.
const PRIORITY: [u16; 4] = [
    ids::INFOZIP_UNIX_3RD_GENERATION,
    ids::INFOZIP_UNIX_TYPE2,
    ids::EXTENDED_TIMESTAMP,
    ids::INFOZIP_UNIX_ORIGINAL,
];

/// Resolve an entry's records into a single metadata view.
///
/// Local-header records are consulted before central-header records of
/// the same id, so the central copy only contributes fields the local
/// one left unset (notably the lone central modification time). Records
/// that failed to decode are skipped silently.
pub fn resolve_entry_metadata(records: &[RawExtraField]) -> EntryMetadata {
    let mut metadata = EntryMetadata::default();

    for id in PRIORITY {
        for location in [HeaderLocation::Local, HeaderLocation::Central] {
            for record in records
                .iter()
                .filter(|r| r.id == id && r.location == location)
            {
                let decoded = ExtraField::decode(record.id, record.location, &record.data);
                if !decoded.data_valid {
                    continue;
                }
                metadata.merge(&decoded.field);
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::codec::{ExtendedTimestamp, Unix3rdGeneration, UnixType2};
    use HeaderLocation::{Central, Local};

    fn raw(id: u16, location: HeaderLocation, field: &ExtraField) -> RawExtraField {
        let data = field.encode(location).unwrap();
        assert_eq!(id, field.id());
        RawExtraField::new(id, location, data)
    }

    #[test]
    fn third_generation_ids_win_over_type2() {
        let records = vec![
            raw(
                ids::INFOZIP_UNIX_TYPE2,
                Local,
                &ExtraField::UnixType2(UnixType2 {
                    uid: Some(1),
                    gid: Some(2),
                }),
            ),
            raw(
                ids::INFOZIP_UNIX_3RD_GENERATION,
                Local,
                &ExtraField::Unix3rdGeneration(Unix3rdGeneration {
                    uid: Some(70_000),
                    gid: Some(70_001),
                }),
            ),
        ];

        let metadata = resolve_entry_metadata(&records);
        assert_eq!(metadata.uid, Some(70_000));
        assert_eq!(metadata.gid, Some(70_001));
    }

    #[test]
    fn local_record_preferred_over_central() {
        let records = vec![
            raw(
                ids::EXTENDED_TIMESTAMP,
                Central,
                &ExtraField::ExtendedTimestamp(ExtendedTimestamp {
                    mtime: Some(111),
                    ..Default::default()
                }),
            ),
            raw(
                ids::EXTENDED_TIMESTAMP,
                Local,
                &ExtraField::ExtendedTimestamp(ExtendedTimestamp {
                    mtime: Some(222),
                    atime: Some(333),
                    ..Default::default()
                }),
            ),
        ];

        let metadata = resolve_entry_metadata(&records);
        assert_eq!(metadata.mtime, Some(222));
        assert_eq!(metadata.atime, Some(333));
    }

    #[test]
    fn central_fills_fields_local_left_unset() {
        // Local record carries only an access time; the central copy is
        // the only place the modification time survives.
        let local = RawExtraField::new(
            ids::EXTENDED_TIMESTAMP,
            Local,
            ExtraField::ExtendedTimestamp(ExtendedTimestamp {
                atime: Some(333),
                ..Default::default()
            })
            .encode(Local)
            .unwrap(),
        );
        let central = RawExtraField::new(
            ids::EXTENDED_TIMESTAMP,
            Central,
            ExtraField::ExtendedTimestamp(ExtendedTimestamp {
                mtime: Some(111),
                ..Default::default()
            })
            .encode(Central)
            .unwrap(),
        );

        let metadata = resolve_entry_metadata(&[local, central]);
        assert_eq!(metadata.atime, Some(333));
        assert_eq!(metadata.mtime, Some(111));
    }

    #[test]
    fn invalid_records_are_skipped() {
        let records = vec![
            // Truncated 3rd-generation payload
            RawExtraField::new(ids::INFOZIP_UNIX_3RD_GENERATION, Local, vec![1, 4, 0]),
            raw(
                ids::INFOZIP_UNIX_TYPE2,
                Local,
                &ExtraField::UnixType2(UnixType2 {
                    uid: Some(7),
                    gid: Some(8),
                }),
            ),
        ];

        let metadata = resolve_entry_metadata(&records);
        assert_eq!(metadata.uid, Some(7));
        assert_eq!(metadata.gid, Some(8));
    }

    #[test]
    fn unix_original_is_the_timestamp_fallback() {
        let records = vec![raw(
            ids::INFOZIP_UNIX_ORIGINAL,
            Local,
            &ExtraField::UnixOriginal(crate::zip::codec::UnixOriginal {
                atime: Some(10),
                mtime: Some(20),
                uid: Some(3),
                gid: Some(4),
            }),
        )];

        let metadata = resolve_entry_metadata(&records);
        assert_eq!(metadata.mtime, Some(20));
        assert_eq!(metadata.atime, Some(10));
        assert_eq!(metadata.uid, Some(3));
        assert_eq!(metadata.gid, Some(4));
        assert_eq!(metadata.ctime, None);
    }
}
