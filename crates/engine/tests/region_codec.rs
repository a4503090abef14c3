//! Region codec against files produced by an independent Anvil writer.

use std::fs;
use std::io::{Cursor, Seek};
use std::path::Path;

use regionerator_engine::world::anvil::{AnvilRegion, HEADER_POINTER_LENGTH};
use regionerator_engine::world::{RegionInfo, RegionPos, SlotIndex, WriteOutcome};
use serde::Serialize;

#[derive(Serialize)]
struct ChunkNbt {
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "zPos")]
    z_pos: i32,
    #[serde(rename = "Status")]
    status: String,
}

fn chunk_bytes(x: i32, z: i32) -> Vec<u8> {
    fastnbt::to_bytes(&ChunkNbt {
        x_pos: x,
        z_pos: z,
        status: "minecraft:full".to_string(),
    })
    .unwrap()
}

/// Write a region with one chunk per listed slot using fastanvil.
fn write_region(path: &Path, pos: RegionPos, slots: &[SlotIndex]) {
    let mut region = fastanvil::Region::new(Cursor::new(Vec::new())).unwrap();
    for slot in slots {
        let chunk = pos.chunk_at(*slot);
        region
            .write_chunk(slot.local_x() as usize, slot.local_z() as usize, &chunk_bytes(chunk.x, chunk.z))
            .unwrap();
    }
    let mut cursor = region.into_inner().unwrap();
    let len = cursor.stream_position().unwrap();
    let data = cursor.into_inner();
    fs::write(path, &data[..len as usize]).unwrap();
}

fn read_back(path: &Path, slot: SlotIndex) -> Option<Vec<u8>> {
    let file = fs::File::open(path).unwrap();
    let mut region = fastanvil::Region::from_stream(file).unwrap();
    region
        .read_chunk(slot.local_x() as usize, slot.local_z() as usize)
        .unwrap()
}

#[test]
fn test_rewritten_region_stays_readable() {
    let dir = tempfile::tempdir().unwrap();
    let pos = RegionPos::new(-1, 2);
    let path = dir.path().join(pos.file_name());
    let slots = [SlotIndex::new(0, 0), SlotIndex::new(5, 7), SlotIndex::new(31, 31)];
    write_region(&path, pos, &slots);

    let mut region = AnvilRegion::new("world", pos, &path);
    region.read().unwrap();
    assert!(!region.is_orphaned(slots[0]));
    assert!(!region.is_orphaned(slots[1]));
    assert!(region.is_orphaned(SlotIndex::new(1, 0)));

    region.set_orphaned(slots[1]);
    assert_eq!(region.write().unwrap(), WriteOutcome::Rewritten);

    assert!(read_back(&path, slots[1]).is_none());
    for slot in [slots[0], slots[2]] {
        let chunk = pos.chunk_at(slot);
        assert_eq!(read_back(&path, slot), Some(chunk_bytes(chunk.x, chunk.z)));
    }
}

#[test]
fn test_orphaning_every_chunk_deletes_region() {
    let dir = tempfile::tempdir().unwrap();
    let pos = RegionPos::new(0, 0);
    let path = dir.path().join(pos.file_name());
    let slots = [SlotIndex::new(3, 3), SlotIndex::new(4, 3)];
    write_region(&path, pos, &slots);

    let mut region = AnvilRegion::new("world", pos, &path);
    region.read().unwrap();
    for slot in SlotIndex::all() {
        region.set_orphaned(slot);
    }
    assert_eq!(region.write().unwrap(), WriteOutcome::Deleted);
    assert!(!path.exists());
    assert!(!region.exists());

    // Writing again once the file is gone is a no-op.
    assert_eq!(region.write().unwrap(), WriteOutcome::Missing);
}

#[test]
fn test_timestamps_survive_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let pos = RegionPos::new(3, -3);
    let path = dir.path().join(pos.file_name());
    let slots = [SlotIndex::new(0, 0), SlotIndex::new(1, 0)];
    write_region(&path, pos, &slots);
    let before = fs::read(&path).unwrap();

    let mut region = AnvilRegion::new("world", pos, &path);
    region.read().unwrap();
    region.set_orphaned(slots[0]);
    region.write().unwrap();

    let after = fs::read(&path).unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(&after[HEADER_POINTER_LENGTH..], &before[HEADER_POINTER_LENGTH..]);
    assert_eq!(&after[4..HEADER_POINTER_LENGTH], &before[4..HEADER_POINTER_LENGTH]);
    assert_eq!(&after[..4], &[0, 0, 0, 0]);
}

#[test]
fn test_chunk_saved_after_scan_survives_commit() {
    let dir = tempfile::tempdir().unwrap();
    let pos = RegionPos::new(0, 0);
    let path = dir.path().join(pos.file_name());
    let doomed = SlotIndex::new(10, 10);
    write_region(&path, pos, &[doomed]);

    let mut region = AnvilRegion::new("world", pos, &path);
    region.read().unwrap();
    region.set_orphaned(doomed);

    // The game regenerates a neighbour before the scanner commits.
    let regenerated = SlotIndex::new(11, 10);
    write_region(&path, pos, &[doomed, regenerated]);

    assert_eq!(region.write().unwrap(), WriteOutcome::Rewritten);
    assert!(path.exists());
    assert!(read_back(&path, doomed).is_none());
    let chunk = pos.chunk_at(regenerated);
    assert_eq!(read_back(&path, regenerated), Some(chunk_bytes(chunk.x, chunk.z)));
}
