//! Volume session — open / create / close plus the operations front ends
//! call.
//!
//! A [`Volume`] composes a medium accessor, the validated superblock and
//! the session-scoped index cache.  The session state machine
//! (Unopened → Open → Closed, no way back) is encoded in ownership: the
//! constructors perform the only opening transition, every method needs
//! the live value, and [`Volume::close`] consumes it.
//!
//! Geometry is re-derived from the superblock on every operation rather
//! than cached, so region boundaries always reflect the current
//! `index_bytes`.
//!
//! Mutation is single-writer with no lock and no journal; two sessions
//! over the same medium must be serialized externally.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::Utc;

use crate::alloc;
use crate::data;
use crate::dir::{DirEntry, DirectoryView, Entries};
use crate::entry::{
    DirRecord, FileRecord, IndexEntry, VolumeIdRecord, DIR_NAME_MAX, ENTRY_SIZE, FILE_NAME_MAX,
};
use crate::error::{Result, VolumeError};
use crate::geometry::{bytes_per_block, Geometry};
use crate::index::IndexStore;
use crate::medium::{BlockMedium, MappedMedium, Medium, MediumError};
use crate::superblock::{Superblock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};

// ── CreateOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Volume::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Block-size exponent; bytes per block = `1 << (n + 7)`.
    pub block_size: u8,
    pub total_blocks: u64,
    pub label: String,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            block_size: 2,
            total_blocks: 100,
            label: "SFS".into(),
        }
    }
}

// ── FileHandle ───────────────────────────────────────────────────────────────

/// Handle to a live file entry.  Keyed by name — names are unique among
/// live entries and entry slots shift as the index grows, so the name is
/// the stable identity.
#[derive(Debug, Clone)]
pub struct FileHandle {
    name: String,
}

impl FileHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ── VolumeStats ──────────────────────────────────────────────────────────────

/// Filesystem-statistics report (the statfs view of a mounted volume).
#[derive(Debug, Clone, Copy)]
pub struct VolumeStats {
    pub block_size: u64,
    pub total_blocks: u64,
    pub reserved_blocks: u32,
    /// Data blocks consumed by the bump allocator.
    pub used_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
    pub max_name_len: u32,
    pub index_entries: u64,
}

// ── Volume ───────────────────────────────────────────────────────────────────

pub struct Volume {
    medium: Box<dyn Medium>,
    superblock: Superblock,
    index: IndexStore,
}

impl Volume {
    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Format a new volume image: size the medium, write the superblock,
    /// bootstrap the StartingMarker and the VolumeId, and return the open
    /// session.
    pub fn create<P: AsRef<Path>>(path: P, opts: &CreateOptions) -> Result<Self> {
        let mut sb = Superblock::new(opts.block_size, opts.total_blocks);
        sb.validate()?;
        let geo = Geometry::of(&sb);
        if geo.data_start < SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE as u64 {
            return Err(VolumeError::BadGeometry(
                "reserved area too small to hold the superblock",
            ));
        }
        if geo.media_size < geo.data_start + 2 * ENTRY_SIZE as u64 {
            return Err(VolumeError::BadGeometry(
                "medium too small for the bootstrap index",
            ));
        }

        let mut medium: Box<dyn Medium> = Box::new(MappedMedium::create(path, geo.media_size)?);
        medium.write_at(SUPERBLOCK_OFFSET, &sb.encode())?;

        let mut index = IndexStore::empty();
        index.append(
            medium.as_mut(),
            &mut sb,
            &IndexEntry::StartingMarker { next_free_block: 0 },
        )?;
        index.append(
            medium.as_mut(),
            &mut sb,
            &IndexEntry::VolumeId(VolumeIdRecord {
                timestamp: Utc::now().timestamp_millis(),
                name: opts.label.clone(),
            }),
        )?;
        medium.flush()?;

        Ok(Self {
            medium,
            superblock: sb,
            index,
        })
    }

    /// Open an existing image through the direct-mapped accessor.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::finish_open(Box::new(MappedMedium::open(path)?))
    }

    /// Open an existing image through the block-cache accessor.  The
    /// superblock is recovered with one bootstrap read before the block
    /// size is known.
    pub fn open_cached<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut head = vec![0u8; (SUPERBLOCK_OFFSET as usize) + SUPERBLOCK_SIZE];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut head))
            .map_err(MediumError::from)?;
        let sb = Superblock::decode(&head[SUPERBLOCK_OFFSET as usize..])?;

        let medium = BlockMedium::open(path, bytes_per_block(sb.block_size))?;
        Self::finish_open(Box::new(medium))
    }

    fn finish_open(mut medium: Box<dyn Medium>) -> Result<Self> {
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        medium.read_at(SUPERBLOCK_OFFSET, &mut raw)?;
        let sb = Superblock::decode(&raw)?;

        if Geometry::of(&sb).media_size > medium.len() {
            return Err(VolumeError::BadGeometry(
                "superblock claims more blocks than the medium holds",
            ));
        }

        let index = IndexStore::load(medium.as_mut(), &sb)?;
        if index.entry_count() > 0 {
            // A formatted volume always carries the marker at the lowest
            // address; anything else is not worth navigating.
            index.marker()?;
        }

        Ok(Self {
            medium,
            superblock: sb,
            index,
        })
    }

    /// Flush and release the session.  Consuming `self` makes the
    /// transition terminal; dropping an unclosed volume flushes
    /// best-effort.
    pub fn close(mut self) -> Result<()> {
        self.medium.flush()?;
        Ok(())
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Add a directory entry.  Fails with [`VolumeError::DuplicateName`]
    /// when a live directory of that name exists; the index is untouched in
    /// that case.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        check_name(name, DIR_NAME_MAX)?;
        if self.index.find_directory(name)?.is_some() {
            return Err(VolumeError::DuplicateName(name.into()));
        }
        self.index.append(
            self.medium.as_mut(),
            &mut self.superblock,
            &IndexEntry::Directory(DirRecord {
                continuations: 0,
                timestamp: Utc::now().timestamp_millis(),
                name: name.into(),
            }),
        )
    }

    /// Add a file entry with `size_bytes` of allocated capacity.  The
    /// allocation cursor is advanced and persisted before the entry is
    /// appended; content arrives later via [`Volume::write_file`].
    pub fn add_file(&mut self, name: &str, size_bytes: u64) -> Result<FileHandle> {
        check_name(name, FILE_NAME_MAX)?;
        if self.index.find_file(name)?.is_some() {
            return Err(VolumeError::DuplicateName(name.into()));
        }

        let (start_block, end_block) = alloc::allocate(
            &mut self.index,
            self.medium.as_mut(),
            &self.superblock,
            size_bytes,
        )?;
        self.index.append(
            self.medium.as_mut(),
            &mut self.superblock,
            &IndexEntry::File(FileRecord {
                continuations: 0,
                timestamp: Utc::now().timestamp_millis(),
                start_block,
                end_block,
                length: 0,
                name: name.into(),
            }),
        )?;
        Ok(FileHandle { name: name.into() })
    }

    /// Copy `data` into the file's blocks and record the new length.
    pub fn write_file(&mut self, handle: &FileHandle, data: &[u8]) -> Result<()> {
        let (slot, mut rec) = self.resolve(handle)?;
        data::write_file(self.medium.as_mut(), &self.superblock, &rec, data)?;

        rec.length = data.len() as u64;
        rec.timestamp = Utc::now().timestamp_millis();
        self.index
            .rewrite(self.medium.as_mut(), &self.superblock, slot, &IndexEntry::File(rec))?;
        self.touch()
    }

    /// Rewrite a live file entry as deleted.  The slot stays allocated and
    /// its data blocks are never reclaimed.
    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        let (slot, rec) = self
            .index
            .find_file(name)?
            .ok_or_else(|| VolumeError::NotFound(name.into()))?;
        self.index.rewrite(
            self.medium.as_mut(),
            &self.superblock,
            slot,
            &IndexEntry::DeletedFile(rec),
        )?;
        self.touch()
    }

    /// Rewrite a live directory entry as deleted.
    pub fn remove_directory(&mut self, name: &str) -> Result<()> {
        let (slot, rec) = self
            .index
            .find_directory(name)?
            .ok_or_else(|| VolumeError::NotFound(name.into()))?;
        self.index.rewrite(
            self.medium.as_mut(),
            &self.superblock,
            slot,
            &IndexEntry::DeletedDirectory(rec),
        )?;
        self.touch()
    }

    // ── Lookup and reads ─────────────────────────────────────────────────────

    /// Handle to a live file, or `None` — a miss is absence, not an error.
    pub fn find_file(&self, name: &str) -> Result<Option<FileHandle>> {
        Ok(self
            .index
            .find_file(name)?
            .map(|_| FileHandle { name: name.into() }))
    }

    pub fn find_directory(&self, name: &str) -> Result<Option<String>> {
        Ok(self.index.find_directory(name)?.map(|(_, rec)| rec.name))
    }

    /// Read up to `max` bytes of the file's content.
    pub fn read_file(&mut self, handle: &FileHandle, max: u64) -> Result<Vec<u8>> {
        let (_, rec) = self.resolve(handle)?;
        data::read_file(self.medium.as_mut(), &self.superblock, &rec, max)
    }

    /// File metadata as currently recorded in the index.
    pub fn stat_file(&self, handle: &FileHandle) -> Result<FileRecord> {
        Ok(self.resolve(handle)?.1)
    }

    /// The root directory view.
    pub fn root(&self) -> DirectoryView<'_> {
        DirectoryView::new(&self.index)
    }

    /// Lazy listing of user-visible entries.
    pub fn entries(&self) -> Entries<'_> {
        self.root().entries()
    }

    /// Eager listing, for callers that want the whole table.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        self.entries().collect()
    }

    /// The VolumeId record: label and creation time.
    pub fn volume_id(&self) -> Result<Option<VolumeIdRecord>> {
        for item in self.index.scan() {
            if let (_, IndexEntry::VolumeId(rec)) = item? {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    /// The statfs report.
    pub fn stats(&self) -> Result<VolumeStats> {
        let geo = Geometry::of(&self.superblock);
        let used = if self.index.entry_count() == 0 {
            0
        } else {
            self.index.marker()?
        };
        let free = geo.data_capacity_blocks().saturating_sub(used);
        Ok(VolumeStats {
            block_size: geo.bytes_per_block,
            total_blocks: self.superblock.total_blocks,
            reserved_blocks: self.superblock.reserved_blocks,
            used_blocks: used,
            free_blocks: free,
            available_blocks: free,
            max_name_len: DIR_NAME_MAX as u32,
            index_entries: self.index.entry_count() as u64,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn resolve(&self, handle: &FileHandle) -> Result<(usize, FileRecord)> {
        self.index
            .find_file(&handle.name)?
            .ok_or_else(|| VolumeError::NotFound(handle.name.clone()))
    }

    fn touch(&mut self) -> Result<()> {
        self.superblock.alteration_time = Utc::now().timestamp_millis();
        self.medium
            .write_at(SUPERBLOCK_OFFSET, &self.superblock.encode())?;
        Ok(())
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        let _ = self.medium.flush();
    }
}

fn check_name(name: &str, max: usize) -> Result<()> {
    if name.len() > max {
        return Err(crate::entry::EntryError::NameTooLong {
            len: name.len(),
            max,
        }
        .into());
    }
    Ok(())
}
