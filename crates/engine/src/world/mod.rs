//! Worlds and their region files.
//!
//! The deletion scanner only sees the `WorldInfo` / `RegionInfo` traits;
//! `anvil` provides the on-disk implementation.

pub mod anvil;
pub mod position;
pub mod region;

pub use anvil::{AnvilRegion, AnvilWorld};
pub use position::{ChunkPos, REGION_CHUNKS, RegionPos, SLOT_COUNT, SlotIndex};
pub use region::{RegionInfo, WorldInfo, WriteOutcome};
