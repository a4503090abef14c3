use super::position::{ChunkPos, RegionPos, SlotIndex};
use crate::error::RegionError;

/// What `RegionInfo::write` ended up doing to the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist; there was nothing left to remove.
    Missing,
    /// Some chunks remain; only the pointer table was rewritten.
    Rewritten,
    /// No chunk pointer survived, so the file was deleted.
    Deleted,
}

/// One region of a world, as seen by the deletion scanner.
///
/// A region is read, its slots are classified and marked, and it is written
/// back. Marking a slot orphaned only records intent: nothing touches the
/// backing store until `write`, which re-reads the current state first so
/// chunks saved in the meantime are never lost.
pub trait RegionInfo: Send {
    fn pos(&self) -> RegionPos;

    /// Identifier used in logs (`r.X.Z`).
    fn identifier(&self) -> String {
        self.pos().to_string()
    }

    /// Whether the backing file exists right now. Never cached.
    fn exists(&self) -> bool;

    /// Load the header. A missing backing file reads as an empty region.
    fn read(&mut self) -> Result<(), RegionError>;

    /// Apply pending orphan marks to the stored region.
    fn write(&mut self) -> Result<WriteOutcome, RegionError>;

    /// True if the slot holds no data or is marked for removal.
    fn is_orphaned(&self, slot: SlotIndex) -> bool;

    /// Mark a slot to be cleared on the next `write`.
    fn set_orphaned(&mut self, slot: SlotIndex);

    /// Last modification of the slot's chunk, in epoch milliseconds.
    fn last_modified(&self, slot: SlotIndex) -> i64;

    /// Absolute position of the chunk stored in a slot.
    fn chunk(&self, slot: SlotIndex) -> ChunkPos {
        self.pos().chunk_at(slot)
    }
}

/// A named collection of regions backed by some save format.
pub trait WorldInfo: Send + Sync {
    fn name(&self) -> &str;

    /// Regions currently present, in the order the backing store lists them.
    fn region_positions(&self) -> Result<Vec<RegionPos>, RegionError>;

    /// A fresh, unread view of one region.
    fn region(&self, pos: RegionPos) -> Box<dyn RegionInfo>;
}
