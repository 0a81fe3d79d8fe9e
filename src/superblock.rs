//! Superblock codec — the fixed 48-byte record at [`SUPERBLOCK_OFFSET`].
//!
//! # Layout
//! All integers are little-endian.  The field order (and the two runs of
//! alignment padding) is fixed by the on-disk format:
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 8    | alteration_time |
//! | 8      | 8    | data_blocks     |
//! | 16     | 8    | index_bytes     |
//! | 24     | 4    | magic tag       |
//! | 28     | 4    | padding         |
//! | 32     | 8    | total_blocks    |
//! | 40     | 4    | reserved_blocks |
//! | 44     | 1    | block_size      |
//! | 45     | 1    | checksum        |
//! | 46     | 2    | padding         |
//!
//! # Checksum
//! One byte chosen so that `magic + total_blocks + reserved_blocks +
//! block_size + checksum ≡ 0 (mod 256)`.  `index_bytes` and the timestamps
//! are deliberately outside the sum: they mutate on every index append and
//! the checksum must stay valid without being rewritten.

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use thiserror::Error;

use crate::entry::ENTRY_SIZE;
use crate::geometry::bytes_per_block;

/// `"SFS\x10"` read as one little-endian u32 — three ASCII bytes plus the
/// format version byte.
pub const MAGIC: u32 = 0x1053_4653;

/// Byte offset of the superblock from the start of the medium
/// (11 boot bytes + 21 BIOS bytes + 372 more boot bytes).
pub const SUPERBLOCK_OFFSET: u64 = 0x194;

/// Size of the encoded superblock record.
pub const SUPERBLOCK_SIZE: usize = 48;

/// Largest accepted block-size exponent (2 GiB blocks).
pub const MAX_BLOCK_SIZE_EXP: u8 = 24;

#[derive(Error, Debug)]
pub enum SuperblockError {
    #[error("bad magic tag {0:#010x}")]
    BadMagic(u32),
    #[error("bad checksum: stored {stored:#04x}, computed {computed:#04x}")]
    BadChecksum { stored: u8, computed: u8 },
    #[error("unsupported block size exponent {0}")]
    BadBlockSize(u8),
    #[error("{0} blocks exceed the addressable media size")]
    BadTotalBlocks(u64),
    #[error("index size {0} does not fit the medium in whole entries")]
    BadIndexSize(u64),
    #[error("superblock record truncated: {0} bytes")]
    Truncated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Last-modification marker, milliseconds since the epoch.  Advisory.
    pub alteration_time: i64,
    /// Advisory size of the data region in blocks; not authoritative.
    pub data_blocks: u64,
    /// Current size of the index region in bytes.  Always a multiple of
    /// [`ENTRY_SIZE`]; mutated on every index append.
    pub index_bytes: u64,
    /// Total blocks on the medium; `total_blocks * bytes_per_block` is the
    /// media size.
    pub total_blocks: u64,
    /// Blocks before the data region (boot area + superblock).
    pub reserved_blocks: u32,
    /// Bytes per block = `1 << (block_size + 7)`.
    pub block_size: u8,
}

impl Superblock {
    /// Fresh superblock for a volume being formatted.  One reserved block
    /// holds the boot area and this record.
    pub fn new(block_size: u8, total_blocks: u64) -> Self {
        Self {
            alteration_time: Utc::now().timestamp_millis(),
            data_blocks: total_blocks.saturating_sub(1),
            index_bytes: 0,
            total_blocks,
            reserved_blocks: 1,
            block_size,
        }
    }

    /// The single checksum byte.  Wrapping u8 arithmetic over the low bytes
    /// of the covered fields, negated.
    pub fn checksum(&self) -> u8 {
        let sum = (MAGIC as u8)
            .wrapping_add(self.total_blocks as u8)
            .wrapping_add(self.reserved_blocks as u8)
            .wrapping_add(self.block_size);
        0u8.wrapping_sub(sum)
    }

    /// Check the geometry fields against what a medium can actually carry.
    /// `index_bytes` sits outside the checksum, so this is the only guard
    /// against an index region claiming more bytes than the medium holds.
    pub fn validate(&self) -> Result<(), SuperblockError> {
        if self.block_size > MAX_BLOCK_SIZE_EXP {
            return Err(SuperblockError::BadBlockSize(self.block_size));
        }
        let media_size = self
            .total_blocks
            .checked_mul(bytes_per_block(self.block_size))
            .ok_or(SuperblockError::BadTotalBlocks(self.total_blocks))?;
        if self.index_bytes % ENTRY_SIZE as u64 != 0 || self.index_bytes > media_size {
            return Err(SuperblockError::BadIndexSize(self.index_bytes));
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        LittleEndian::write_i64(&mut buf[0..8], self.alteration_time);
        LittleEndian::write_u64(&mut buf[8..16], self.data_blocks);
        LittleEndian::write_u64(&mut buf[16..24], self.index_bytes);
        LittleEndian::write_u32(&mut buf[24..28], MAGIC);
        LittleEndian::write_u64(&mut buf[32..40], self.total_blocks);
        LittleEndian::write_u32(&mut buf[40..44], self.reserved_blocks);
        buf[44] = self.block_size;
        buf[45] = self.checksum();
        buf
    }

    /// Decode and validate a superblock record.  Fails on a bad magic tag,
    /// a checksum mismatch, or geometry fields no volume can legally carry.
    pub fn decode(raw: &[u8]) -> Result<Self, SuperblockError> {
        if raw.len() < SUPERBLOCK_SIZE {
            return Err(SuperblockError::Truncated(raw.len()));
        }

        let magic = LittleEndian::read_u32(&raw[24..28]);
        if magic != MAGIC {
            return Err(SuperblockError::BadMagic(magic));
        }

        let sb = Self {
            alteration_time: LittleEndian::read_i64(&raw[0..8]),
            data_blocks: LittleEndian::read_u64(&raw[8..16]),
            index_bytes: LittleEndian::read_u64(&raw[16..24]),
            total_blocks: LittleEndian::read_u64(&raw[32..40]),
            reserved_blocks: LittleEndian::read_u32(&raw[40..44]),
            block_size: raw[44],
        };

        let stored = raw[45];
        let computed = sb.checksum();
        if stored != computed {
            return Err(SuperblockError::BadChecksum { stored, computed });
        }
        sb.validate()?;

        Ok(sb)
    }
}
