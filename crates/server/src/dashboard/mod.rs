//! Operator API: run statistics, player reports, manual flags, reloads.
//!
//! Handlers only touch shared state through the flag cache, the player
//! registry and atomics; anything that hits the disk runs on the blocking
//! pool so the runtime never stalls behind a config read.

pub mod metrics;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use regionerator_engine::config::SharedConfig;
use regionerator_engine::deletion::RunSnapshot;
use regionerator_engine::flag::FlagCache;
use serde::{Deserialize, Serialize};

use crate::manager::CycleManager;
use crate::player_registry::PlayerRegistry;

pub use metrics::{Metrics, MetricsSnapshot};
pub use server::{router, start};

/// Largest square radius one flag request may cover.
pub const MAX_FLAG_RADIUS: i32 = 32;

/// Central state shared via `Arc<DashboardState>`.
pub struct DashboardState {
    pub metrics: Metrics,
    pub manager: Arc<CycleManager>,
    pub players: Arc<PlayerRegistry>,
    pub flags: Arc<dyn FlagCache>,
    pub config: Arc<SharedConfig>,
    /// Config file re-read by `POST /api/reload`.
    pub settings_path: PathBuf,
}

impl DashboardState {
    pub fn new(
        manager: Arc<CycleManager>,
        players: Arc<PlayerRegistry>,
        flags: Arc<dyn FlagCache>,
        config: Arc<SharedConfig>,
        settings_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            metrics: Metrics::new(),
            manager,
            players,
            flags,
            config,
            settings_path: settings_path.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatsResponse {
    pub service: MetricsSnapshot,
    pub worlds: Vec<RunSnapshot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagAction {
    /// Keep the chunks for the world's flag duration from now.
    Visit,
    /// Mark as freshly generated unless already flagged.
    Generated,
    /// Never delete.
    Eternal,
    Unflag,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlagRequest {
    pub world: String,
    /// Chunk coordinates of the square's centre.
    pub x: i32,
    pub z: i32,
    pub action: FlagAction,
    #[serde(default)]
    pub radius: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlagResponse {
    pub chunks: u64,
}
