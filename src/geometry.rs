//! Media geometry — pure derivations from superblock fields.
//!
//! Nothing here is ever stored on disk.  The medium is carved as
//! `[reserved blocks][data region][index region]`, where the index region
//! occupies the last `index_bytes` bytes and grows toward lower addresses.
//! Region boundaries follow from the superblock alone, so they must be
//! re-derived after any mutation of `index_bytes` or `total_blocks` —
//! callers hold a [`Geometry`] only for the duration of one operation.

use crate::superblock::Superblock;

/// Bytes per block for a given block-size exponent.
pub fn bytes_per_block(block_size: u8) -> u64 {
    1u64 << (u32::from(block_size) + 7)
}

/// Snapshot of the region boundaries implied by one superblock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_block: u64,
    pub media_size: u64,
    /// First byte of the data region.
    pub data_start: u64,
    /// First byte of the index region; also one past the end of the data
    /// region.
    pub index_start: u64,
}

impl Geometry {
    pub fn of(sb: &Superblock) -> Self {
        let bpb = bytes_per_block(sb.block_size);
        let media_size = sb.total_blocks * bpb;
        Self {
            bytes_per_block: bpb,
            media_size,
            data_start: u64::from(sb.reserved_blocks) * bpb,
            index_start: media_size - sb.index_bytes,
        }
    }

    /// Medium offset of a data-region-relative block number.
    pub fn data_offset(&self, block: u64) -> u64 {
        self.data_start + block * self.bytes_per_block
    }

    /// [`Geometry::data_offset`] for block numbers read off the medium,
    /// which may not be in range at all.
    pub fn checked_data_offset(&self, block: u64) -> Option<u64> {
        block
            .checked_mul(self.bytes_per_block)
            .and_then(|rel| self.data_start.checked_add(rel))
    }

    /// Whole blocks needed to hold `size` bytes.
    pub fn blocks_for(&self, size: u64) -> u64 {
        size.div_ceil(self.bytes_per_block)
    }

    /// Data blocks available before the index region, given the current
    /// index size.
    pub fn data_capacity_blocks(&self) -> u64 {
        (self.index_start.saturating_sub(self.data_start)) / self.bytes_per_block
    }
}
