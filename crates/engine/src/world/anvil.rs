//! Anvil (`.mca`) region header codec.
//!
//! Only the 8 KiB header is ever touched: 1024 big-endian chunk pointers
//! followed by 1024 big-endian last-modified timestamps. Orphaning a chunk
//! zeroes its pointer; the sectors it pointed at are left for the game to
//! reclaim the next time it rewrites the region. A region whose pointers
//! are all zero is deleted outright.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::position::{RegionPos, SLOT_COUNT, SlotIndex};
use super::region::{RegionInfo, WorldInfo, WriteOutcome};
use crate::error::RegionError;

/// Bytes per chunk pointer.
pub const POINTER_LENGTH: usize = 4;
/// Bytes of the pointer table.
pub const HEADER_POINTER_LENGTH: usize = POINTER_LENGTH * SLOT_COUNT;
/// Bytes per last-modified timestamp.
pub const LAST_MODIFIED_LENGTH: usize = 4;
/// Bytes of the timestamp table.
pub const HEADER_LAST_MODIFIED_LENGTH: usize = LAST_MODIFIED_LENGTH * SLOT_COUNT;
/// Full header: pointers, then timestamps.
pub const HEADER_LENGTH: usize = HEADER_POINTER_LENGTH + HEADER_LAST_MODIFIED_LENGTH;

/// One region file, read and written through its header only.
pub struct AnvilRegion {
    world: String,
    pos: RegionPos,
    path: PathBuf,
    header: Box<[u8; HEADER_LENGTH]>,
    pending_orphans: Box<[bool; SLOT_COUNT]>,
}

impl AnvilRegion {
    pub fn new(world: impl Into<String>, pos: RegionPos, path: impl Into<PathBuf>) -> Self {
        Self {
            world: world.into(),
            pos,
            path: path.into(),
            // Until read, every slot looks occupied so nothing is eligible.
            header: Box::new([1; HEADER_LENGTH]),
            pending_orphans: Box::new([false; SLOT_COUNT]),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The header as last read (or as last written).
    pub fn header(&self) -> &[u8] {
        &self.header[..]
    }
}

impl RegionInfo for AnvilRegion {
    fn pos(&self) -> RegionPos {
        self.pos
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read(&mut self) -> Result<(), RegionError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.header.fill(0);
                return Ok(());
            }
            Err(e) => return Err(RegionError::io(&self.path, e)),
        };
        read_header(&mut file, &mut self.header[..]).map_err(|e| RegionError::io(&self.path, e))
    }

    fn write(&mut self) -> Result<WriteOutcome, RegionError> {
        if !self.path.exists() {
            tracing::trace!("Skipped nonexistent region {}:{}", self.world, self.pos);
            return Ok(WriteOutcome::Missing);
        }

        ensure_writable(&self.path)?;

        let mut file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WriteOutcome::Missing),
            Err(e) => return Err(RegionError::io(&self.path, e)),
        };

        // The server may have saved chunks since the scan read this header.
        read_header(&mut file, &mut self.header[..]).map_err(|e| RegionError::io(&self.path, e))?;

        for slot in SlotIndex::all().filter(|slot| self.pending_orphans[slot.index()]) {
            let start = slot.pointer_offset();
            self.header[start..start + POINTER_LENGTH].fill(0);
        }

        let first_live = self.header[..HEADER_POINTER_LENGTH]
            .iter()
            .position(|byte| *byte != 0);

        if let Some(offset) = first_live {
            // Timestamps are left alone; the game refreshes them on save.
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&self.header[..HEADER_POINTER_LENGTH]))
                .and_then(|_| file.sync_data())
                .map_err(|e| RegionError::io(&self.path, e))?;
            self.pending_orphans.fill(false);

            if tracing::enabled!(tracing::Level::DEBUG) {
                if let Some(slot) = SlotIndex::from_index(offset / POINTER_LENGTH) {
                    let chunk = self.pos.chunk_at(slot);
                    tracing::debug!(
                        "Rewrote header of region {} due to non-zero index of chunk {}_{}_{}",
                        self.pos,
                        self.world,
                        chunk.x,
                        chunk.z,
                    );
                }
            }
            return Ok(WriteOutcome::Rewritten);
        }

        drop(file);
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RegionError::io(&self.path, e)),
        }
        self.pending_orphans.fill(false);
        tracing::debug!("Deleted region {}:{} with empty header", self.world, self.pos);
        Ok(WriteOutcome::Deleted)
    }

    fn is_orphaned(&self, slot: SlotIndex) -> bool {
        if self.pending_orphans[slot.index()] {
            return true;
        }
        let start = slot.pointer_offset();
        self.header[start..start + POINTER_LENGTH]
            .iter()
            .all(|byte| *byte == 0)
    }

    fn set_orphaned(&mut self, slot: SlotIndex) {
        self.pending_orphans[slot.index()] = true;
    }

    fn last_modified(&self, slot: SlotIndex) -> i64 {
        let start = slot.timestamp_offset();
        let mut bytes = [0u8; LAST_MODIFIED_LENGTH];
        bytes.copy_from_slice(&self.header[start..start + LAST_MODIFIED_LENGTH]);
        // Unsigned: a high top byte must not turn into a negative time.
        i64::from(u32::from_be_bytes(bytes)) * 1000
    }
}

/// Fill `header` from the start of `file`, leaving zeros past EOF.
fn read_header(file: &mut File, header: &mut [u8]) -> io::Result<()> {
    header.fill(0);
    file.seek(SeekFrom::Start(0))?;
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn ensure_writable(path: &Path) -> Result<(), RegionError> {
    let metadata = fs::metadata(path).map_err(|e| RegionError::io(path, e))?;
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return Ok(());
    }

    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    if fs::set_permissions(path, permissions).is_err() {
        return Err(RegionError::NotWritable {
            path: path.to_path_buf(),
        });
    }
    match fs::metadata(path) {
        Ok(metadata) if !metadata.permissions().readonly() => Ok(()),
        _ => Err(RegionError::NotWritable {
            path: path.to_path_buf(),
        }),
    }
}

/// Directory layouts a world's regions may live under: overworld, then the
/// nether and end layouts used by split-dimension servers.
const REGION_DIR_CANDIDATES: [&str; 3] = ["region", "DIM-1/region", "DIM1/region"];

/// A world stored as a directory of Anvil region files.
pub struct AnvilWorld {
    name: String,
    region_dir: PathBuf,
}

impl AnvilWorld {
    pub fn new(name: impl Into<String>, region_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            region_dir: region_dir.into(),
        }
    }

    /// Find the region directory under a world folder, if it has one.
    pub fn locate(name: impl Into<String>, world_root: &Path) -> Option<Self> {
        REGION_DIR_CANDIDATES
            .iter()
            .map(|candidate| world_root.join(candidate))
            .find(|dir| dir.is_dir())
            .map(|dir| Self::new(name, dir))
    }

    pub fn region_dir(&self) -> &Path {
        &self.region_dir
    }

    pub fn region_path(&self, pos: RegionPos) -> PathBuf {
        self.region_dir.join(pos.file_name())
    }
}

impl WorldInfo for AnvilWorld {
    fn name(&self) -> &str {
        &self.name
    }

    fn region_positions(&self) -> Result<Vec<RegionPos>, RegionError> {
        let entries = match fs::read_dir(&self.region_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegionError::Listing {
                    path: self.region_dir.clone(),
                    source,
                });
            }
        };

        let mut positions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RegionError::Listing {
                path: self.region_dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".mca") {
                continue;
            }
            match RegionPos::parse_file_name(name) {
                Some(pos) => positions.push(pos),
                None => tracing::warn!("Skipping unexpected file in region dir: {}", name),
            }
        }
        Ok(positions)
    }

    fn region(&self, pos: RegionPos) -> Box<dyn RegionInfo> {
        Box::new(AnvilRegion::new(self.name.clone(), pos, self.region_path(pos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header with the given pointers and timestamps, plus one data sector.
    fn header_bytes(pointers: &[(SlotIndex, u32)], timestamps: &[(SlotIndex, u32)]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LENGTH + 4096];
        for (slot, value) in pointers {
            let at = slot.pointer_offset();
            bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
        }
        for (slot, value) in timestamps {
            let at = slot.timestamp_offset();
            bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
        }
        bytes
    }

    fn region_in(dir: &Path, bytes: &[u8]) -> AnvilRegion {
        let pos = RegionPos::new(0, 0);
        let path = dir.join(pos.file_name());
        fs::write(&path, bytes).unwrap();
        AnvilRegion::new("world", pos, path)
    }

    #[test]
    fn test_unread_region_has_no_orphans() {
        let region = AnvilRegion::new("world", RegionPos::new(0, 0), "/nonexistent/r.0.0.mca");
        assert!(SlotIndex::all().all(|slot| !region.is_orphaned(slot)));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = AnvilRegion::new("world", RegionPos::new(1, 1), dir.path().join("r.1.1.mca"));
        region.read().unwrap();
        assert!(!region.exists());
        assert!(region.header().iter().all(|b| *b == 0));
        assert!(SlotIndex::all().all(|slot| region.is_orphaned(slot)));
    }

    #[test]
    fn test_short_file_reads_trailing_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let full = header_bytes(&[(SlotIndex::new(1, 0), 0x0000_0201), (SlotIndex::new(0, 20), 0x0000_0301)], &[]);
        // Truncated in the middle of the pointer table.
        let mut region = region_in(dir.path(), &full[..100]);
        region.read().unwrap();
        assert_eq!(region.header().len(), HEADER_LENGTH);
        assert!(!region.is_orphaned(SlotIndex::new(1, 0)));
        assert!(region.is_orphaned(SlotIndex::new(0, 20)));
    }

    #[test]
    fn test_last_modified_is_unsigned_millis() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SlotIndex::new(3, 4);
        let high = SlotIndex::new(4, 4);
        let bytes = header_bytes(&[], &[(slot, 1_700_000_000), (high, 0xF000_0000)]);
        let mut region = region_in(dir.path(), &bytes);
        region.read().unwrap();
        assert_eq!(region.last_modified(slot), 1_700_000_000_000);
        assert_eq!(region.last_modified(high), 0xF000_0000_i64 * 1000);
        assert_eq!(region.last_modified(SlotIndex::new(0, 0)), 0);
    }

    #[test]
    fn test_set_orphaned_is_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SlotIndex::new(7, 7);
        let mut region = region_in(dir.path(), &header_bytes(&[(slot, 0x0000_0201)], &[]));
        region.read().unwrap();
        assert!(!region.is_orphaned(slot));

        region.set_orphaned(slot);
        assert!(region.is_orphaned(slot));
        // The parsed header is untouched until write.
        let at = slot.pointer_offset();
        assert_eq!(&region.header()[at..at + 4], &[0, 0, 2, 1]);
    }

    #[test]
    fn test_write_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = AnvilRegion::new("world", RegionPos::new(2, 2), dir.path().join("r.2.2.mca"));
        region.read().unwrap();
        region.set_orphaned(SlotIndex::new(0, 0));
        assert_eq!(region.write().unwrap(), WriteOutcome::Missing);
        assert!(!region.exists());
    }

    #[test]
    fn test_write_empty_header_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = region_in(dir.path(), &header_bytes(&[], &[(SlotIndex::new(0, 0), 5)]));
        region.read().unwrap();
        assert_eq!(region.write().unwrap(), WriteOutcome::Deleted);
        assert!(!region.path().exists());
    }

    #[test]
    fn test_orphaning_last_chunk_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let slot = SlotIndex::new(31, 31);
        let mut region = region_in(dir.path(), &header_bytes(&[(slot, 0x0000_0201)], &[]));
        region.read().unwrap();
        region.set_orphaned(slot);
        assert_eq!(region.write().unwrap(), WriteOutcome::Deleted);
        assert!(!region.path().exists());
    }

    #[test]
    fn test_partial_write_rewrites_pointers_only() {
        let dir = tempfile::tempdir().unwrap();
        let keep = SlotIndex::new(0, 0);
        let drop = SlotIndex::new(1, 0);
        let bytes = header_bytes(
            &[(keep, 0x0000_0201), (drop, 0x0000_0301)],
            &[(keep, 1_000), (drop, 2_000)],
        );
        let mut region = region_in(dir.path(), &bytes);
        region.read().unwrap();
        region.set_orphaned(drop);
        assert_eq!(region.write().unwrap(), WriteOutcome::Rewritten);

        let on_disk = fs::read(region.path()).unwrap();
        assert_eq!(on_disk.len(), bytes.len());
        assert_eq!(&on_disk[keep.pointer_offset()..keep.pointer_offset() + 4], &[0, 0, 2, 1]);
        assert_eq!(&on_disk[drop.pointer_offset()..drop.pointer_offset() + 4], &[0, 0, 0, 0]);
        // Timestamp table and chunk sectors are byte-for-byte unchanged.
        assert_eq!(&on_disk[HEADER_POINTER_LENGTH..], &bytes[HEADER_POINTER_LENGTH..]);
    }

    #[test]
    fn test_write_rereads_header_before_orphaning() {
        let dir = tempfile::tempdir().unwrap();
        let doomed = SlotIndex::new(2, 0);
        let mut region = region_in(dir.path(), &header_bytes(&[(doomed, 0x0000_0201)], &[]));
        region.read().unwrap();
        region.set_orphaned(doomed);

        // The server saves a new chunk between the scan and the commit.
        let regenerated = SlotIndex::new(9, 9);
        let updated = header_bytes(&[(doomed, 0x0000_0201), (regenerated, 0x0000_0301)], &[(regenerated, 77)]);
        fs::write(region.path(), &updated).unwrap();

        assert_eq!(region.write().unwrap(), WriteOutcome::Rewritten);
        let on_disk = fs::read(region.path()).unwrap();
        let at = regenerated.pointer_offset();
        assert_eq!(&on_disk[at..at + 4], &[0, 0, 3, 1]);
        let at = doomed.pointer_offset();
        assert_eq!(&on_disk[at..at + 4], &[0, 0, 0, 0]);
        // The timestamp the server wrote survives too.
        let at = regenerated.timestamp_offset();
        assert_eq!(&on_disk[at..at + 4], &77u32.to_be_bytes());
    }

    #[test]
    fn test_write_clears_read_only_flag() {
        let dir = tempfile::tempdir().unwrap();
        let keep = SlotIndex::new(0, 0);
        let drop = SlotIndex::new(0, 1);
        let mut region = region_in(dir.path(), &header_bytes(&[(keep, 0x0000_0201), (drop, 0x0000_0301)], &[]));
        let mut permissions = fs::metadata(region.path()).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(region.path(), permissions).unwrap();

        region.read().unwrap();
        region.set_orphaned(drop);
        assert_eq!(region.write().unwrap(), WriteOutcome::Rewritten);
        assert!(!fs::metadata(region.path()).unwrap().permissions().readonly());
    }

    #[test]
    fn test_world_lists_region_files() {
        let dir = tempfile::tempdir().unwrap();
        let region_dir = dir.path().join("region");
        fs::create_dir_all(&region_dir).unwrap();
        fs::write(region_dir.join("r.0.0.mca"), b"").unwrap();
        fs::write(region_dir.join("r.-1.5.mca"), b"").unwrap();
        fs::write(region_dir.join("r.bad.mca"), b"").unwrap();
        fs::write(region_dir.join("level.dat"), b"").unwrap();

        let world = AnvilWorld::locate("world", dir.path()).expect("region dir");
        let mut positions = world.region_positions().unwrap();
        positions.sort();
        assert_eq!(positions, vec![RegionPos::new(-1, 5), RegionPos::new(0, 0)]);
    }

    #[test]
    fn test_locate_nether_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("DIM-1/region")).unwrap();
        let world = AnvilWorld::locate("world_nether", dir.path()).expect("nether region dir");
        assert!(world.region_dir().ends_with("DIM-1/region"));
        assert!(AnvilWorld::locate("empty", &dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_missing_region_dir_is_empty_world() {
        let dir = tempfile::tempdir().unwrap();
        let world = AnvilWorld::new("world", dir.path().join("region"));
        assert!(world.region_positions().unwrap().is_empty());
    }
}
