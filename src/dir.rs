//! Directory view — flat-namespace enumeration over the index.
//!
//! SFS directories are labels, not containers: there is exactly one
//! implicit root, and every directory and file entry is a direct child of
//! it no matter which directory a consumer navigates into.  Enumeration
//! follows readdir conventions: positions 0 and 1 are the synthesized
//! `.`/`..` pair, position n maps to index slot n − 2, deleted entries are
//! skipped but keep their position slot, and the VolumeId terminates the
//! listing.

use crate::entry::{DirRecord, FileRecord, IndexEntry};
use crate::error::Result;
use crate::index::{IndexStore, Scan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    Directory,
    File,
}

/// One user-visible listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: DirEntryKind,
    pub timestamp: i64,
    /// Content length for files; `None` for directories.
    pub size: Option<u64>,
}

impl DirEntry {
    fn directory(rec: DirRecord) -> Self {
        Self {
            name: rec.name,
            kind: DirEntryKind::Directory,
            timestamp: rec.timestamp,
            size: None,
        }
    }

    fn file(rec: FileRecord) -> Self {
        Self {
            name: rec.name,
            kind: DirEntryKind::File,
            timestamp: rec.timestamp,
            size: Some(rec.length),
        }
    }

    fn dot(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::Directory,
            timestamp: 0,
            size: None,
        }
    }
}

#[derive(Clone, Copy)]
pub struct DirectoryView<'a> {
    index: &'a IndexStore,
}

impl<'a> DirectoryView<'a> {
    pub fn new(index: &'a IndexStore) -> Self {
        Self { index }
    }

    /// Lazy listing of user-visible entries: live directories and files
    /// only, in scan order, ending at the VolumeId.  The marker and the
    /// VolumeId are never emitted; an empty volume lists nothing.
    pub fn entries(self) -> Entries<'a> {
        Entries {
            scan: self.index.scan(),
            done: false,
        }
    }

    /// Positional enumeration for readdir-style consumers.  Returns the
    /// entry at the first viable position at or after `pos`, together with
    /// the position after it, or `None` when the listing is exhausted.
    pub fn next_from(self, pos: u64) -> Result<Option<(u64, DirEntry)>> {
        if pos == 0 {
            return Ok(Some((1, DirEntry::dot("."))));
        }
        if pos == 1 {
            return Ok(Some((2, DirEntry::dot(".."))));
        }

        let mut slot = (pos - 2) as usize;
        while slot < self.index.entry_count() {
            match self.index.entry(slot)? {
                IndexEntry::VolumeId(_) => return Ok(None),
                IndexEntry::Directory(rec) => {
                    return Ok(Some((slot as u64 + 3, DirEntry::directory(rec))));
                }
                IndexEntry::File(rec) => {
                    return Ok(Some((slot as u64 + 3, DirEntry::file(rec))));
                }
                // Deleted and internal entries keep their position slot.
                _ => slot += 1,
            }
        }
        Ok(None)
    }
}

pub struct Entries<'a> {
    scan: Scan<'a>,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for item in self.scan.by_ref() {
            let (_, entry) = match item {
                Ok(pair) => pair,
                Err(e) => return Some(Err(e)),
            };
            match entry {
                IndexEntry::VolumeId(_) => {
                    self.done = true;
                    return None;
                }
                IndexEntry::Directory(rec) => return Some(Ok(DirEntry::directory(rec))),
                IndexEntry::File(rec) => return Some(Ok(DirEntry::file(rec))),
                _ => continue,
            }
        }
        None
    }
}
