//! Medium accessors — a flat byte-addressable view of the storage.
//!
//! The core never touches the OS directly; everything goes through the
//! [`Medium`] trait, which behaves like one contiguous byte array with an
//! explicit flush.  Two access models are provided:
//!
//! - [`MappedMedium`] maps the backing file into memory, so the in-memory
//!   and on-disk representations are the same bytes (the mkfs tool's model).
//! - [`BlockMedium`] goes through buffered file I/O at block granularity:
//!   each underlying read request fetches exactly one block, and a read
//!   spanning block boundaries issues one request per block (the
//!   block-cache model of the read-only driver).
//!
//! Every access is bounds-checked against the medium size before any I/O
//! is issued.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediumError {
    #[error("medium unavailable: {0}")]
    Io(#[from] io::Error),
    #[error("range {offset}+{len} is outside the {size}-byte medium")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
}

/// Byte-addressable storage with "read at", "write at" and "flush"
/// semantics identical to a flat byte array.
pub trait Medium {
    fn len(&self) -> u64;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), MediumError>;
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), MediumError>;
    fn flush(&mut self) -> Result<(), MediumError>;
}

fn check_range(offset: u64, len: usize, size: u64) -> Result<(), MediumError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(MediumError::OutOfBounds {
            offset,
            len: len as u64,
            size,
        }),
    }
}

// ── MappedMedium ─────────────────────────────────────────────────────────────

/// Shared memory mapping of the image file.  Writes land in the mapping
/// immediately; `flush` asks the OS to write dirty pages back.
pub struct MappedMedium {
    map: MmapMut,
}

impl MappedMedium {
    /// Create (or truncate) an image file of exactly `size` bytes and map it.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self, MediumError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Self { map })
    }

    /// Map an existing image file at its current size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MediumError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Self { map })
    }
}

impl Medium for MappedMedium {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), MediumError> {
        check_range(offset, buf.len(), self.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.map[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), MediumError> {
        check_range(offset, data.len(), self.len())?;
        let start = offset as usize;
        self.map[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MediumError> {
        self.map.flush()?;
        Ok(())
    }
}

// ── BlockMedium ──────────────────────────────────────────────────────────────

/// Block-granularity accessor over buffered file I/O.  One underlying read
/// request fetches at most one block's worth of bytes; `read_at` loops to
/// cover ranges spanning block boundaries.
pub struct BlockMedium {
    file: File,
    block_bytes: u64,
    size: u64,
    scratch: Vec<u8>,
}

impl BlockMedium {
    pub fn open<P: AsRef<Path>>(path: P, block_bytes: u64) -> Result<Self, MediumError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            block_bytes,
            size,
            scratch: vec![0u8; block_bytes as usize],
        })
    }

    /// Fetch the single block containing `offset` into the scratch buffer.
    fn fetch_block(&mut self, block: u64) -> Result<usize, MediumError> {
        let start = block * self.block_bytes;
        let avail = (self.size - start).min(self.block_bytes) as usize;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut self.scratch[..avail])?;
        Ok(avail)
    }
}

impl Medium for BlockMedium {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), MediumError> {
        check_range(offset, buf.len(), self.size)?;
        let mut pos = offset;
        let mut filled = 0usize;
        while filled < buf.len() {
            let block = pos / self.block_bytes;
            let in_block = (pos % self.block_bytes) as usize;
            let avail = self.fetch_block(block)?;
            let take = (buf.len() - filled).min(avail - in_block);
            buf[filled..filled + take].copy_from_slice(&self.scratch[in_block..in_block + take]);
            filled += take;
            pos += take as u64;
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), MediumError> {
        check_range(offset, data.len(), self.size)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MediumError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn mapped_roundtrip_and_bounds() {
        let tmp = NamedTempFile::new().unwrap();
        let mut m = MappedMedium::create(tmp.path(), 1024).unwrap();
        assert_eq!(m.len(), 1024);

        m.write_at(100, b"hello").unwrap();
        let mut buf = [0u8; 5];
        m.read_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        assert!(matches!(
            m.write_at(1022, b"xyz"),
            Err(MediumError::OutOfBounds { .. })
        ));
        assert!(matches!(
            m.read_at(2048, &mut buf),
            Err(MediumError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn mapped_writes_visible_to_block_accessor() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut m = MappedMedium::create(tmp.path(), 2048).unwrap();
            m.write_at(500, b"shared bytes").unwrap();
            m.flush().unwrap();
        }
        let mut b = BlockMedium::open(tmp.path(), 512).unwrap();
        let mut buf = [0u8; 12];
        b.read_at(500, &mut buf).unwrap();
        assert_eq!(&buf, b"shared bytes");
    }

    #[test]
    fn block_read_spans_block_boundaries() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut m = MappedMedium::create(tmp.path(), 2048).unwrap();
            let pattern: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
            m.write_at(0, &pattern).unwrap();
            m.flush().unwrap();
        }

        let mut b = BlockMedium::open(tmp.path(), 512).unwrap();
        // 700 bytes starting mid-block crosses two boundaries.
        let mut buf = vec![0u8; 700];
        b.read_at(300, &mut buf).unwrap();
        for (i, &byte) in buf.iter().enumerate() {
            assert_eq!(byte, ((i + 300) % 251) as u8);
        }
    }
}
