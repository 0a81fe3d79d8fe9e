//! File content I/O against the data region.
//!
//! Content lives at `data_start + start_block * bytes_per_block` and never
//! outgrows the allocated block range.  Reads are clamped to the recorded
//! length; asking for more than a file holds yields fewer bytes, never an
//! error.

use crate::entry::FileRecord;
use crate::error::{Result, VolumeError};
use crate::geometry::Geometry;
use crate::medium::Medium;
use crate::superblock::Superblock;

fn content_offset(geo: &Geometry, rec: &FileRecord, len: u64) -> Result<u64> {
    // start_block comes off the medium; a corrupt entry can put the sums
    // past u64, so the bound check must not wrap.
    let offset = geo.checked_data_offset(rec.start_block);
    match offset.and_then(|offset| offset.checked_add(len)) {
        Some(end) if end <= geo.index_start => Ok(geo.data_offset(rec.start_block)),
        _ => Err(VolumeError::CorruptIndex(
            "file data range crosses into the index region",
        )),
    }
}

/// Copy `data` into the file's allocated blocks.  The whole write is
/// rejected when `data` exceeds the allocation; there is no partial copy.
pub fn write_file(
    medium: &mut dyn Medium,
    sb: &Superblock,
    rec: &FileRecord,
    data: &[u8],
) -> Result<()> {
    let geo = Geometry::of(sb);
    let capacity = rec.capacity(geo.bytes_per_block);
    if data.len() as u64 > capacity {
        return Err(VolumeError::SizeExceedsAllocation {
            requested: data.len() as u64,
            capacity,
        });
    }
    let offset = content_offset(&geo, rec, data.len() as u64)?;
    medium.write_at(offset, data)?;
    Ok(())
}

/// Read up to `max` bytes of content, clamped to the recorded length.
pub fn read_file(
    medium: &mut dyn Medium,
    sb: &Superblock,
    rec: &FileRecord,
    max: u64,
) -> Result<Vec<u8>> {
    let geo = Geometry::of(sb);
    let len = rec.length.min(max);
    let offset = content_offset(&geo, rec, len)?;
    let mut buf = vec![0u8; len as usize];
    medium.read_at(offset, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MappedMedium;
    use tempfile::NamedTempFile;

    fn record(start: u64, end: u64, length: u64) -> FileRecord {
        FileRecord {
            continuations: 0,
            timestamp: 0,
            start_block: start,
            end_block: end,
            length,
            name: "f".into(),
        }
    }

    fn volume() -> (NamedTempFile, MappedMedium, Superblock) {
        let tmp = NamedTempFile::new().unwrap();
        let mut sb = Superblock::new(2, 100);
        sb.index_bytes = 128;
        let medium = MappedMedium::create(tmp.path(), Geometry::of(&sb).media_size).unwrap();
        (tmp, medium, sb)
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(0, 1, 12);
        write_file(&mut medium, &sb, &rec, b"Hello world!").unwrap();
        assert_eq!(read_file(&mut medium, &sb, &rec, u64::MAX).unwrap(), b"Hello world!");
    }

    #[test]
    fn read_is_clamped_to_length() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(0, 1, 5);
        write_file(&mut medium, &sb, &rec, b"hello").unwrap();
        assert_eq!(read_file(&mut medium, &sb, &rec, 2).unwrap(), b"he");
        assert_eq!(read_file(&mut medium, &sb, &rec, 100).unwrap(), b"hello");
    }

    #[test]
    fn zero_length_read_is_not_an_error() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(0, 0, 0);
        assert!(read_file(&mut medium, &sb, &rec, 100).unwrap().is_empty());
    }

    #[test]
    fn oversized_write_is_rejected_whole() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(0, 1, 0);
        let data = vec![0xAB; 513];
        assert!(matches!(
            write_file(&mut medium, &sb, &rec, &data),
            Err(VolumeError::SizeExceedsAllocation { requested: 513, capacity: 512 })
        ));
        // Nothing was copied.
        let before = read_file(&mut medium, &sb, &record(0, 1, 512), 512).unwrap();
        assert!(before.iter().all(|&b| b == 0));
    }

    #[test]
    fn huge_start_block_cannot_wrap_the_bound_check() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(u64::MAX / 2, u64::MAX / 2 + 1, 512);
        assert!(matches!(
            read_file(&mut medium, &sb, &rec, u64::MAX),
            Err(VolumeError::CorruptIndex(_))
        ));
    }

    #[test]
    fn inverted_block_range_reads_as_zero_capacity() {
        let (_tmp, mut medium, sb) = volume();
        let rec = record(5, 3, 0);
        assert!(matches!(
            write_file(&mut medium, &sb, &rec, b"x"),
            Err(VolumeError::SizeExceedsAllocation { capacity: 0, .. })
        ));
    }

    #[test]
    fn range_into_index_region_is_refused() {
        let (_tmp, mut medium, sb) = volume();
        // Block 98 ends past the index boundary of a 100-block volume.
        let rec = record(98, 100, 512);
        assert!(matches!(
            write_file(&mut medium, &sb, &rec, &[0u8; 512]),
            Err(VolumeError::CorruptIndex(_))
        ));
    }
}
