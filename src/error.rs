//! Crate-wide error taxonomy.
//!
//! Accessor failures and codec failures keep their own module-level error
//! types and are wrapped here unchanged; nothing in the core retries or
//! repairs.  Lookup misses are represented as `Option`, not as errors —
//! [`VolumeError::NotFound`] only appears when an operation was handed a
//! name or handle that must resolve.

use thiserror::Error;

use crate::entry::EntryError;
use crate::medium::MediumError;
use crate::superblock::SuperblockError;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error(transparent)]
    Medium(#[from] MediumError),
    #[error("invalid superblock: {0}")]
    Superblock(#[from] SuperblockError),
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error("an entry named {0:?} already exists")]
    DuplicateName(String),
    #[error("no entry named {0:?}")]
    NotFound(String),
    #[error("{requested} bytes exceed the {capacity}-byte allocation")]
    SizeExceedsAllocation { requested: u64, capacity: u64 },
    #[error("no space: {needed} more data blocks needed, {available} available")]
    NoSpace { needed: u64, available: u64 },
    #[error("corrupt index: {0}")]
    CorruptIndex(&'static str),
    #[error("unusable geometry: {0}")]
    BadGeometry(&'static str),
}

pub type Result<T> = std::result::Result<T, VolumeError>;
