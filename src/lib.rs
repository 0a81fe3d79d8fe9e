//! SFS — a minimal on-disk filesystem with a flat namespace.
//!
//! The medium is carved into `[reserved blocks][data region][index region]`.
//! A 48-byte superblock at a fixed offset describes the whole layout; the
//! index region holds fixed 64-byte metadata entries and grows toward lower
//! addresses, anchored by a StartingMarker sentinel that doubles as the
//! data-block allocation cursor.  Two access models share every algorithm:
//! a direct memory mapping (the mkfs tool) and a block-granularity cached
//! accessor (the read-only driver model).
//!
//! ```no_run
//! use sfs::{CreateOptions, Volume};
//!
//! let mut vol = Volume::create("disk.img", &CreateOptions::default())?;
//! vol.add_directory("first_directory")?;
//! let file = vol.add_file("first_file", 12)?;
//! vol.write_file(&file, b"Hello world!")?;
//! vol.close()?;
//!
//! let mut vol = Volume::open("disk.img")?;
//! let file = vol.find_file("first_file")?.unwrap();
//! assert_eq!(vol.read_file(&file, u64::MAX)?, b"Hello world!");
//! # Ok::<(), sfs::VolumeError>(())
//! ```

pub mod alloc;
pub mod data;
pub mod dir;
pub mod entry;
pub mod error;
pub mod geometry;
pub mod index;
pub mod medium;
pub mod superblock;
pub mod volume;

pub use dir::{DirEntry, DirEntryKind, DirectoryView};
pub use entry::{IndexEntry, ENTRY_SIZE};
pub use error::{Result, VolumeError};
pub use geometry::Geometry;
pub use medium::{BlockMedium, MappedMedium, Medium};
pub use superblock::{Superblock, MAGIC, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
pub use volume::{CreateOptions, FileHandle, Volume, VolumeStats};
