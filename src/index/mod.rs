//! Index store — the sentinel-anchored LIFO metadata log.
//!
//! The index region holds fixed-size entries and grows toward lower
//! addresses.  Three invariants define the append protocol and the code
//! below is written from them directly:
//!
//! 1. The StartingMarker is always the entry at the lowest address.
//! 2. The most recently appended entry sits directly above the marker.
//! 3. The first entry ever appended after the marker (the VolumeId) sits
//!    at the highest address, so a low-to-high scan meets it last.
//!
//! Appending therefore grows the region by one slot, sinks the marker into
//! the new lowest slot, and writes the new entry where the marker was.
//!
//! The store owns a session-scoped copy of the index region: loaded once
//! at open, mutated in step with the medium, dropped at close.  It is
//! never shared between sessions, so a stale copy cannot outlive its
//! mount.  There is no lock and no journal — a crash between the entry
//! write and the superblock update leaves `index_bytes` out of step with
//! the entries on disk, which is documented format behavior.

use chrono::Utc;

use crate::entry::{DirRecord, FileRecord, IndexEntry, ENTRY_SIZE};
use crate::error::{Result, VolumeError};
use crate::geometry::Geometry;
use crate::medium::Medium;
use crate::superblock::{Superblock, SUPERBLOCK_OFFSET};

pub struct IndexStore {
    cache: Vec<u8>,
}

impl IndexStore {
    /// Store for a volume with no index yet (mid-format).
    pub fn empty() -> Self {
        Self { cache: Vec::new() }
    }

    /// Read the whole index region into the session cache.
    pub fn load(medium: &mut dyn Medium, sb: &Superblock) -> Result<Self> {
        let geo = Geometry::of(sb);
        let mut cache = vec![0u8; sb.index_bytes as usize];
        medium.read_at(geo.index_start, &mut cache)?;
        Ok(Self { cache })
    }

    pub fn entry_count(&self) -> usize {
        self.cache.len() / ENTRY_SIZE
    }

    /// Decode the entry in `slot` (0 = lowest address).
    pub fn entry(&self, slot: usize) -> Result<IndexEntry> {
        let start = slot * ENTRY_SIZE;
        let raw = self
            .cache
            .get(start..start + ENTRY_SIZE)
            .ok_or(VolumeError::CorruptIndex("entry slot out of range"))?;
        Ok(IndexEntry::decode(raw)?)
    }

    /// Finite, restartable scan over all slots in ascending address order.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            store: self,
            slot: 0,
        }
    }

    /// First live directory entry with this exact name.  Scan order is
    /// most-recent-first, so among (illegal) duplicates the newest wins.
    pub fn find_directory(&self, name: &str) -> Result<Option<(usize, DirRecord)>> {
        for item in self.scan() {
            let (slot, entry) = item?;
            if let IndexEntry::Directory(rec) = entry {
                if rec.name == name {
                    return Ok(Some((slot, rec)));
                }
            }
        }
        Ok(None)
    }

    /// First live file entry with this exact name.
    pub fn find_file(&self, name: &str) -> Result<Option<(usize, FileRecord)>> {
        for item in self.scan() {
            let (slot, entry) = item?;
            if let IndexEntry::File(rec) = entry {
                if rec.name == name {
                    return Ok(Some((slot, rec)));
                }
            }
        }
        Ok(None)
    }

    /// The allocation cursor carried by the StartingMarker.
    pub fn marker(&self) -> Result<u64> {
        match self.entry(0)? {
            IndexEntry::StartingMarker { next_free_block } => Ok(next_free_block),
            _ => Err(VolumeError::CorruptIndex("starting marker is not the lowest entry")),
        }
    }

    /// Rewrite the marker with an advanced allocation cursor.
    pub fn set_marker(
        &mut self,
        medium: &mut dyn Medium,
        sb: &Superblock,
        next_free_block: u64,
    ) -> Result<()> {
        self.marker()?;
        self.rewrite(medium, sb, 0, &IndexEntry::StartingMarker { next_free_block })
    }

    /// Append one entry.  Grows the region by a slot, keeps the marker at
    /// the lowest address, places `entry` directly above it, and persists
    /// the grown `index_bytes` (plus a fresh alteration time).
    ///
    /// The very first append must be the StartingMarker itself; volume
    /// creation bootstraps marker-then-VolumeId in that order.
    pub fn append(
        &mut self,
        medium: &mut dyn Medium,
        sb: &mut Superblock,
        entry: &IndexEntry,
    ) -> Result<()> {
        let encoded = entry.encode()?;
        let bootstrap = self.cache.is_empty();
        if bootstrap && !matches!(entry, IndexEntry::StartingMarker { .. }) {
            return Err(VolumeError::CorruptIndex(
                "first index entry must be the starting marker",
            ));
        }

        // The grown region must not reach into allocated data blocks.
        let mut grown = sb.clone();
        grown.index_bytes += ENTRY_SIZE as u64;
        let geo = Geometry::of(&grown);
        let used_blocks = if bootstrap { 0 } else { self.marker()? };
        let used_end = geo
            .checked_data_offset(used_blocks)
            .ok_or(VolumeError::CorruptIndex("allocation cursor out of range"))?;
        if geo.index_start < used_end {
            return Err(VolumeError::NoSpace {
                needed: 1,
                available: 0,
            });
        }

        let dirty = if bootstrap {
            self.cache.extend_from_slice(&encoded);
            ENTRY_SIZE
        } else {
            // Marker sinks one slot; the new entry takes its old place.
            let mut tail = self.cache.split_off(ENTRY_SIZE);
            self.cache.extend_from_slice(&encoded);
            self.cache.append(&mut tail);
            2 * ENTRY_SIZE
        };

        medium.write_at(geo.index_start, &self.cache[..dirty])?;

        sb.index_bytes = grown.index_bytes;
        sb.alteration_time = Utc::now().timestamp_millis();
        medium.write_at(SUPERBLOCK_OFFSET, &sb.encode())?;
        Ok(())
    }

    /// Rewrite one existing slot in place (cursor advance, length update,
    /// delete-variant rewrite).  The region size does not change.
    pub fn rewrite(
        &mut self,
        medium: &mut dyn Medium,
        sb: &Superblock,
        slot: usize,
        entry: &IndexEntry,
    ) -> Result<()> {
        let start = slot * ENTRY_SIZE;
        if start + ENTRY_SIZE > self.cache.len() {
            return Err(VolumeError::CorruptIndex("entry slot out of range"));
        }
        let encoded = entry.encode()?;
        self.cache[start..start + ENTRY_SIZE].copy_from_slice(&encoded);

        let geo = Geometry::of(sb);
        medium.write_at(geo.index_start + start as u64, &encoded)?;
        Ok(())
    }
}

pub struct Scan<'a> {
    store: &'a IndexStore,
    slot: usize,
}

impl Iterator for Scan<'_> {
    type Item = Result<(usize, IndexEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.slot >= self.store.entry_count() {
            return None;
        }
        let slot = self.slot;
        self.slot += 1;
        Some(self.store.entry(slot).map(|entry| (slot, entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::VolumeIdRecord;
    use crate::medium::MappedMedium;
    use tempfile::NamedTempFile;

    fn fresh_volume() -> (NamedTempFile, MappedMedium, Superblock, IndexStore) {
        let tmp = NamedTempFile::new().unwrap();
        let sb = Superblock::new(2, 100);
        let geo = Geometry::of(&sb);
        let mut medium = MappedMedium::create(tmp.path(), geo.media_size).unwrap();
        let mut store = IndexStore::empty();
        let mut sb = sb;
        store
            .append(&mut medium, &mut sb, &IndexEntry::StartingMarker { next_free_block: 0 })
            .unwrap();
        store
            .append(
                &mut medium,
                &mut sb,
                &IndexEntry::VolumeId(VolumeIdRecord {
                    timestamp: 1,
                    name: "vol".into(),
                }),
            )
            .unwrap();
        (tmp, medium, sb, store)
    }

    fn dir(name: &str) -> IndexEntry {
        IndexEntry::Directory(DirRecord {
            continuations: 0,
            timestamp: 0,
            name: name.into(),
        })
    }

    #[test]
    fn bootstrap_orders_marker_then_volume_id() {
        let (_tmp, _medium, sb, store) = fresh_volume();
        assert_eq!(sb.index_bytes, 2 * ENTRY_SIZE as u64);
        assert!(matches!(store.entry(0).unwrap(), IndexEntry::StartingMarker { .. }));
        assert!(matches!(store.entry(1).unwrap(), IndexEntry::VolumeId(_)));
    }

    #[test]
    fn first_append_must_be_the_marker() {
        let tmp = NamedTempFile::new().unwrap();
        let mut sb = Superblock::new(2, 100);
        let mut medium = MappedMedium::create(tmp.path(), Geometry::of(&sb).media_size).unwrap();
        let mut store = IndexStore::empty();
        assert!(matches!(
            store.append(&mut medium, &mut sb, &dir("early")),
            Err(VolumeError::CorruptIndex(_))
        ));
    }

    #[test]
    fn appends_keep_marker_lowest_and_volume_id_highest() {
        let (_tmp, mut medium, mut sb, mut store) = fresh_volume();
        for name in ["a", "b", "c"] {
            store.append(&mut medium, &mut sb, &dir(name)).unwrap();
        }

        assert!(matches!(store.entry(0).unwrap(), IndexEntry::StartingMarker { .. }));
        // Most recent append sits directly above the marker.
        match store.entry(1).unwrap() {
            IndexEntry::Directory(rec) => assert_eq!(rec.name, "c"),
            other => panic!("unexpected entry: {other:?}"),
        }
        // The first real entry is the last one a scan encounters.
        let last = store.entry(store.entry_count() - 1).unwrap();
        assert!(matches!(last, IndexEntry::VolumeId(_)));
    }

    #[test]
    fn reload_sees_appended_entries() {
        let (_tmp, mut medium, mut sb, mut store) = fresh_volume();
        store.append(&mut medium, &mut sb, &dir("persisted")).unwrap();

        let reloaded = IndexStore::load(&mut medium, &sb).unwrap();
        assert_eq!(reloaded.entry_count(), 3);
        assert!(reloaded.find_directory("persisted").unwrap().is_some());
    }

    #[test]
    fn find_matches_type_and_exact_name() {
        let (_tmp, mut medium, mut sb, mut store) = fresh_volume();
        store.append(&mut medium, &mut sb, &dir("docs")).unwrap();

        assert!(store.find_directory("docs").unwrap().is_some());
        assert!(store.find_directory("doc").unwrap().is_none());
        assert!(store.find_file("docs").unwrap().is_none());
    }

    #[test]
    fn marker_cursor_rewrite_persists() {
        let (_tmp, mut medium, mut sb, mut store) = fresh_volume();
        assert_eq!(store.marker().unwrap(), 0);
        store.set_marker(&mut medium, &sb, 7).unwrap();
        assert_eq!(store.marker().unwrap(), 7);

        let reloaded = IndexStore::load(&mut medium, &sb).unwrap();
        assert_eq!(reloaded.marker().unwrap(), 7);
    }

    #[test]
    fn append_with_a_corrupt_cursor_fails_cleanly() {
        let (_tmp, mut medium, mut sb, mut store) = fresh_volume();
        store.set_marker(&mut medium, &sb, u64::MAX).unwrap();
        assert!(matches!(
            store.append(&mut medium, &mut sb, &dir("late")),
            Err(VolumeError::CorruptIndex(_))
        ));
    }

    #[test]
    fn append_refuses_to_grow_into_allocated_data() {
        // 3 total blocks: 1 reserved + 2 data.  Claim both data blocks via
        // the cursor, then fill the remaining slack with entries.
        let tmp = NamedTempFile::new().unwrap();
        let mut sb = Superblock::new(2, 3);
        let mut medium = MappedMedium::create(tmp.path(), Geometry::of(&sb).media_size).unwrap();
        let mut store = IndexStore::empty();
        store
            .append(&mut medium, &mut sb, &IndexEntry::StartingMarker { next_free_block: 0 })
            .unwrap();
        store.set_marker(&mut medium, &sb, 2).unwrap();

        let mut hit_no_space = false;
        for i in 0..20 {
            match store.append(&mut medium, &mut sb, &dir(&format!("d{i}"))) {
                Ok(()) => {}
                Err(VolumeError::NoSpace { .. }) => {
                    hit_no_space = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(hit_no_space);
    }
}
