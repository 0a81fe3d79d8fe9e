//! Index entry codec — one fixed 64-byte record, eight logical shapes.
//!
//! On disk an entry is a discriminator byte followed by a 63-byte payload.
//! The payload layout depends entirely on the discriminator, so decoded
//! entries are an explicit sum type: no payload field is reachable without
//! having matched the variant first.
//!
//! Names are NUL-padded in their field.  A name that exactly fills the
//! field carries no terminator; anything longer is rejected with
//! [`EntryError::NameTooLong`], never truncated.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Every index entry occupies exactly this many bytes, for every variant.
pub const ENTRY_SIZE: usize = 64;

/// Maximum file name length in bytes.
pub const FILE_NAME_MAX: usize = 30;
/// Maximum directory name length in bytes.
pub const DIR_NAME_MAX: usize = 54;
/// Maximum volume label length in bytes.
pub const VOLUME_NAME_MAX: usize = 52;

// Discriminator bytes.
const KIND_VOLUME_ID: u8 = 0x01;
const KIND_STARTING_MARKER: u8 = 0x02;
const KIND_UNUSED: u8 = 0x10;
const KIND_DIRECTORY: u8 = 0x11;
const KIND_FILE: u8 = 0x12;
const KIND_UNUSABLE: u8 = 0x18;
const KIND_DELETED_DIRECTORY: u8 = 0x19;
const KIND_DELETED_FILE: u8 = 0x1A;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("unknown entry discriminator {0:#04x}")]
    UnknownKind(u8),
    #[error("entry record truncated: {0} bytes")]
    Truncated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeIdRecord {
    /// Volume creation time, milliseconds since the epoch.
    pub timestamp: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    /// Continuation entries following this one.  Always 0 in this
    /// implementation; names longer than the in-entry field are rejected.
    pub continuations: u8,
    pub timestamp: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub continuations: u8,
    pub timestamp: i64,
    /// First data block, relative to the data region.
    pub start_block: u64,
    /// One past the last allocated data block.
    pub end_block: u64,
    /// Content length in bytes; at most the allocated capacity.
    pub length: u64,
    pub name: String,
}

impl FileRecord {
    /// Bytes the allocated block range can hold.  Saturating, so a corrupt
    /// record with an inverted or oversized range reads as a capacity the
    /// write path will reject rather than as a panic.
    pub fn capacity(&self, bytes_per_block: u64) -> u64 {
        self.end_block
            .saturating_sub(self.start_block)
            .saturating_mul(bytes_per_block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusableRecord {
    pub start_block: u64,
    pub end_block: u64,
}

/// A decoded 64-byte index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEntry {
    /// The allocation sentinel: always the lowest-addressed entry, carrying
    /// the next free data block cursor.
    StartingMarker { next_free_block: u64 },
    /// Volume label + creation time; the first entry ever appended, hence
    /// the highest-addressed one.
    VolumeId(VolumeIdRecord),
    Directory(DirRecord),
    File(FileRecord),
    /// A damaged or reserved block extent.
    Unusable(UnusableRecord),
    DeletedDirectory(DirRecord),
    DeletedFile(FileRecord),
    Unused,
}

fn write_name(field: &mut [u8], name: &str) -> Result<(), EntryError> {
    let bytes = name.as_bytes();
    if bytes.len() > field.len() {
        return Err(EntryError::NameTooLong {
            len: bytes.len(),
            max: field.len(),
        });
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_dir(buf: &mut [u8; ENTRY_SIZE], kind: u8, rec: &DirRecord) -> Result<(), EntryError> {
    buf[0] = kind;
    buf[1] = rec.continuations;
    LittleEndian::write_i64(&mut buf[2..10], rec.timestamp);
    write_name(&mut buf[10..64], &rec.name)
}

fn write_file(buf: &mut [u8; ENTRY_SIZE], kind: u8, rec: &FileRecord) -> Result<(), EntryError> {
    buf[0] = kind;
    buf[1] = rec.continuations;
    LittleEndian::write_i64(&mut buf[2..10], rec.timestamp);
    LittleEndian::write_u64(&mut buf[10..18], rec.start_block);
    LittleEndian::write_u64(&mut buf[18..26], rec.end_block);
    LittleEndian::write_u64(&mut buf[26..34], rec.length);
    write_name(&mut buf[34..64], &rec.name)
}

fn read_dir(raw: &[u8]) -> DirRecord {
    DirRecord {
        continuations: raw[1],
        timestamp: LittleEndian::read_i64(&raw[2..10]),
        name: read_name(&raw[10..64]),
    }
}

fn read_file(raw: &[u8]) -> FileRecord {
    FileRecord {
        continuations: raw[1],
        timestamp: LittleEndian::read_i64(&raw[2..10]),
        start_block: LittleEndian::read_u64(&raw[10..18]),
        end_block: LittleEndian::read_u64(&raw[18..26]),
        length: LittleEndian::read_u64(&raw[26..34]),
        name: read_name(&raw[34..64]),
    }
}

impl IndexEntry {
    pub fn encode(&self) -> Result<[u8; ENTRY_SIZE], EntryError> {
        let mut buf = [0u8; ENTRY_SIZE];
        match self {
            IndexEntry::StartingMarker { next_free_block } => {
                buf[0] = KIND_STARTING_MARKER;
                LittleEndian::write_u64(&mut buf[1..9], *next_free_block);
            }
            IndexEntry::VolumeId(rec) => {
                buf[0] = KIND_VOLUME_ID;
                LittleEndian::write_i64(&mut buf[4..12], rec.timestamp);
                write_name(&mut buf[12..64], &rec.name)?;
            }
            IndexEntry::Directory(rec) => write_dir(&mut buf, KIND_DIRECTORY, rec)?,
            IndexEntry::DeletedDirectory(rec) => write_dir(&mut buf, KIND_DELETED_DIRECTORY, rec)?,
            IndexEntry::File(rec) => write_file(&mut buf, KIND_FILE, rec)?,
            IndexEntry::DeletedFile(rec) => write_file(&mut buf, KIND_DELETED_FILE, rec)?,
            IndexEntry::Unusable(rec) => {
                buf[0] = KIND_UNUSABLE;
                LittleEndian::write_u64(&mut buf[10..18], rec.start_block);
                LittleEndian::write_u64(&mut buf[18..26], rec.end_block);
            }
            IndexEntry::Unused => buf[0] = KIND_UNUSED,
        }
        Ok(buf)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, EntryError> {
        if raw.len() < ENTRY_SIZE {
            return Err(EntryError::Truncated(raw.len()));
        }
        match raw[0] {
            KIND_STARTING_MARKER => Ok(IndexEntry::StartingMarker {
                next_free_block: LittleEndian::read_u64(&raw[1..9]),
            }),
            KIND_VOLUME_ID => Ok(IndexEntry::VolumeId(VolumeIdRecord {
                timestamp: LittleEndian::read_i64(&raw[4..12]),
                name: read_name(&raw[12..64]),
            })),
            KIND_DIRECTORY => Ok(IndexEntry::Directory(read_dir(raw))),
            KIND_DELETED_DIRECTORY => Ok(IndexEntry::DeletedDirectory(read_dir(raw))),
            KIND_FILE => Ok(IndexEntry::File(read_file(raw))),
            KIND_DELETED_FILE => Ok(IndexEntry::DeletedFile(read_file(raw))),
            KIND_UNUSABLE => Ok(IndexEntry::Unusable(UnusableRecord {
                start_block: LittleEndian::read_u64(&raw[10..18]),
                end_block: LittleEndian::read_u64(&raw[18..26]),
            })),
            KIND_UNUSED => Ok(IndexEntry::Unused),
            other => Err(EntryError::UnknownKind(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(entry: IndexEntry) {
        let raw = entry.encode().unwrap();
        assert_eq!(IndexEntry::decode(&raw).unwrap(), entry);
    }

    #[test]
    fn marker_roundtrip() {
        roundtrip(IndexEntry::StartingMarker { next_free_block: 42 });
    }

    #[test]
    fn volume_id_roundtrip() {
        roundtrip(IndexEntry::VolumeId(VolumeIdRecord {
            timestamp: 1_450_742_400_000,
            name: "The Header".into(),
        }));
    }

    #[test]
    fn directory_roundtrip() {
        roundtrip(IndexEntry::Directory(DirRecord {
            continuations: 0,
            timestamp: 7,
            name: "first_directory".into(),
        }));
    }

    #[test]
    fn file_roundtrip() {
        roundtrip(IndexEntry::File(FileRecord {
            continuations: 0,
            timestamp: 9,
            start_block: 3,
            end_block: 5,
            length: 700,
            name: "first_file".into(),
        }));
    }

    #[test]
    fn deleted_variants_keep_their_payload() {
        roundtrip(IndexEntry::DeletedFile(FileRecord {
            continuations: 0,
            timestamp: 9,
            start_block: 0,
            end_block: 1,
            length: 12,
            name: "gone".into(),
        }));
        roundtrip(IndexEntry::DeletedDirectory(DirRecord {
            continuations: 0,
            timestamp: 1,
            name: "gone_dir".into(),
        }));
    }

    #[test]
    fn unusable_and_unused_roundtrip() {
        roundtrip(IndexEntry::Unusable(UnusableRecord {
            start_block: 10,
            end_block: 12,
        }));
        roundtrip(IndexEntry::Unused);
    }

    #[test]
    fn unicode_names_roundtrip() {
        roundtrip(IndexEntry::Directory(DirRecord {
            continuations: 0,
            timestamp: 0,
            name: "¡Hola, Mundo!".into(),
        }));
    }

    #[test]
    fn max_length_names_roundtrip_exactly() {
        roundtrip(IndexEntry::File(FileRecord {
            continuations: 0,
            timestamp: 0,
            start_block: 0,
            end_block: 1,
            length: 0,
            name: "f".repeat(FILE_NAME_MAX),
        }));
        roundtrip(IndexEntry::Directory(DirRecord {
            continuations: 0,
            timestamp: 0,
            name: "d".repeat(DIR_NAME_MAX),
        }));
        roundtrip(IndexEntry::VolumeId(VolumeIdRecord {
            timestamp: 0,
            name: "v".repeat(VOLUME_NAME_MAX),
        }));
    }

    #[test]
    fn one_byte_over_is_rejected() {
        let file = IndexEntry::File(FileRecord {
            continuations: 0,
            timestamp: 0,
            start_block: 0,
            end_block: 1,
            length: 0,
            name: "f".repeat(FILE_NAME_MAX + 1),
        });
        assert!(matches!(
            file.encode(),
            Err(EntryError::NameTooLong { len, max })
                if len == FILE_NAME_MAX + 1 && max == FILE_NAME_MAX
        ));

        let dir = IndexEntry::Directory(DirRecord {
            continuations: 0,
            timestamp: 0,
            name: "d".repeat(DIR_NAME_MAX + 1),
        });
        assert!(matches!(dir.encode(), Err(EntryError::NameTooLong { .. })));

        let label = IndexEntry::VolumeId(VolumeIdRecord {
            timestamp: 0,
            name: "v".repeat(VOLUME_NAME_MAX + 1),
        });
        assert!(matches!(label.encode(), Err(EntryError::NameTooLong { .. })));
    }

    #[test]
    fn unknown_discriminator_fails() {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[0] = 0x7f;
        assert!(matches!(
            IndexEntry::decode(&raw),
            Err(EntryError::UnknownKind(0x7f))
        ));
    }

    proptest! {
        #[test]
        fn file_entries_roundtrip(
            name in "[a-zA-Z0-9_.]{0,30}",
            start in 0u64..1 << 32,
            blocks in 0u64..1 << 16,
            length in 0u64..1 << 40,
            timestamp in 0i64..=i64::MAX / 2,
        ) {
            let entry = IndexEntry::File(FileRecord {
                continuations: 0,
                timestamp,
                start_block: start,
                end_block: start + blocks,
                length,
                name,
            });
            let raw = entry.encode().unwrap();
            prop_assert_eq!(IndexEntry::decode(&raw).unwrap(), entry);
        }
    }
}
