//! Block allocator — a bump cursor persisted in the StartingMarker.
//!
//! There is no free list and no reclamation: the cursor only ever moves
//! forward, and freed extents stay dead.  The advanced cursor is written
//! back to the marker slot before `allocate` returns; handing out a range
//! without persisting the cursor would let two files share blocks, so the
//! rewrite is part of the allocation, not an optimization.

use crate::error::{Result, VolumeError};
use crate::geometry::Geometry;
use crate::index::IndexStore;
use crate::medium::Medium;
use crate::superblock::Superblock;

/// Allocate data blocks for `size_bytes` of content.  Returns the
/// half-open block range `(start, end)`, relative to the data region.
pub fn allocate(
    index: &mut IndexStore,
    medium: &mut dyn Medium,
    sb: &Superblock,
    size_bytes: u64,
) -> Result<(u64, u64)> {
    let geo = Geometry::of(sb);
    let start = index.marker()?;
    let blocks = geo.blocks_for(size_bytes);
    // The cursor comes off the medium; a corrupt marker must not wrap the
    // range end past zero.
    let end = start
        .checked_add(blocks)
        .ok_or(VolumeError::CorruptIndex("allocation cursor out of range"))?;

    let capacity = geo.data_capacity_blocks();
    if end > capacity {
        return Err(VolumeError::NoSpace {
            needed: blocks,
            available: capacity.saturating_sub(start),
        });
    }

    index.set_marker(medium, sb, end)?;
    Ok((start, end))
}
