//! Visit flags: how long each chunk is kept alive by recent activity.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::visit::{FLAG_ETERNAL, FLAG_GENERATED, FLAG_OH_NO};
use crate::world::ChunkPos;

/// Store of "visited until" timestamps, shared by the flagging task and
/// every deletion worker.
pub trait FlagCache: Send + Sync {
    /// Epoch millis the chunk stays visited until, or `None` if never flagged.
    fn visit_until(&self, world: &str, chunk: ChunkPos) -> Option<i64>;

    /// Record a visit flag, merging with any existing one.
    fn flag(&self, world: &str, chunk: ChunkPos, until: i64);

    /// Record a generation flag unless the chunk already has a flag.
    fn flag_generated(&self, world: &str, chunk: ChunkPos, until: i64);

    fn unflag(&self, world: &str, chunk: ChunkPos);

    /// Flag the `(2r+1)²` square of chunks centred on `center`.
    fn flag_radius(&self, world: &str, center: ChunkPos, radius: i32, until: i64) {
        let radius = radius.max(0);
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                self.flag(world, ChunkPos::new(center.x + dx, center.z + dz), until);
            }
        }
    }
}

/// Flag value to keep when `incoming` is recorded over `existing`.
fn merge_flag(existing: i64, incoming: i64) -> i64 {
    match existing {
        FLAG_ETERNAL => FLAG_ETERNAL,
        FLAG_GENERATED | FLAG_OH_NO => incoming,
        _ => existing.max(incoming),
    }
}

/// In-memory flag cache, sharded per world and per chunk.
#[derive(Debug, Default)]
pub struct MemoryFlagCache {
    worlds: DashMap<String, DashMap<ChunkPos, i64>>,
}

impl MemoryFlagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total flags across all worlds.
    pub fn len(&self) -> usize {
        self.worlds.iter().map(|world| world.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_world<R>(&self, world: &str, f: impl FnOnce(&DashMap<ChunkPos, i64>) -> R) -> R {
        if let Some(flags) = self.worlds.get(world) {
            return f(&flags);
        }
        let flags = self.worlds.entry(world.to_string()).or_default();
        f(&flags)
    }

    /// Every flag, grouped by world, both levels sorted.
    pub fn snapshot(&self) -> Vec<(String, Vec<(ChunkPos, i64)>)> {
        let mut worlds: Vec<(String, Vec<(ChunkPos, i64)>)> = self
            .worlds
            .iter()
            .map(|world| {
                let mut flags: Vec<(ChunkPos, i64)> =
                    world.iter().map(|flag| (*flag.key(), *flag.value())).collect();
                flags.sort_unstable();
                (world.key().clone(), flags)
            })
            .filter(|(_, flags)| !flags.is_empty())
            .collect();
        worlds.sort_by(|a, b| a.0.cmp(&b.0));
        worlds
    }

    /// Load persisted flags verbatim, replacing any existing values.
    pub fn restore(&self, world: &str, flags: impl IntoIterator<Item = (ChunkPos, i64)>) {
        self.with_world(world, |map| {
            for (chunk, until) in flags {
                map.insert(chunk, until);
            }
        });
    }
}

impl FlagCache for MemoryFlagCache {
    fn visit_until(&self, world: &str, chunk: ChunkPos) -> Option<i64> {
        let flags = self.worlds.get(world)?;
        flags.get(&chunk).map(|until| *until)
    }

    fn flag(&self, world: &str, chunk: ChunkPos, until: i64) {
        self.with_world(world, |flags| match flags.entry(chunk) {
            Entry::Occupied(mut entry) => {
                let merged = merge_flag(*entry.get(), until);
                entry.insert(merged);
            }
            Entry::Vacant(entry) => {
                entry.insert(until);
            }
        });
    }

    fn flag_generated(&self, world: &str, chunk: ChunkPos, until: i64) {
        self.with_world(world, |flags| {
            flags.entry(chunk).or_insert(until);
        });
    }

    fn unflag(&self, world: &str, chunk: ChunkPos) {
        if let Some(flags) = self.worlds.get(world) {
            flags.remove(&chunk);
        }
    }
}
