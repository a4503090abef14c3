//! Latest reported player positions.
//!
//! The host pushes the full online list through the operator API; the
//! flagging task reads it once per tick.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use regionerator_engine::world::ChunkPos;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub world: String,
    /// Block coordinates.
    pub x: f64,
    pub z: f64,
    /// Spectators fly through terrain without loading it, so they never flag.
    #[serde(default)]
    pub spectator: bool,
}

impl PlayerInfo {
    /// Chunk column the player stands in.
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new((self.x.floor() as i32) >> 4, (self.z.floor() as i32) >> 4)
    }
}

/// Thread-safe registry keyed by player name.
///
/// Uses `std::sync::RwLock` because every operation is brief and the
/// access pattern is read-heavy.
#[derive(Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<String, PlayerInfo>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a complete online list; players absent from it have left.
    pub fn replace_all(&self, players: impl IntoIterator<Item = PlayerInfo>) {
        let players = players
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
        *self.players.write().unwrap_or_else(PoisonError::into_inner) = players;
    }

    pub fn snapshot(&self) -> Vec<PlayerInfo> {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
