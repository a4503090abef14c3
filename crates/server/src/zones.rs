//! Protection zones declared in the config file.
//!
//! A zone is a rectangle of chunks in one world. Like claim plugins, a chunk
//! counts as protected when any zone comes within `padding-chunks` of it, so
//! terrain bordering a claim is kept as well.

use regionerator_engine::hooks::ProtectionHook;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProtectionSettings {
    pub async_capable: bool,
    pub padding_chunks: i32,
    pub zones: Vec<Zone>,
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            async_capable: true,
            padding_chunks: 4,
            zones: Vec::new(),
        }
    }
}

/// Inclusive chunk rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Zone {
    pub world: String,
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl Zone {
    /// Whether the square of `padding` chunks around `(x, z)` overlaps.
    fn near(&self, x: i32, z: i32, padding: i32) -> bool {
        let (min_x, max_x) = (self.min_x.min(self.max_x), self.min_x.max(self.max_x));
        let (min_z, max_z) = (self.min_z.min(self.max_z), self.min_z.max(self.max_z));
        x.saturating_add(padding) >= min_x
            && x.saturating_sub(padding) <= max_x
            && z.saturating_add(padding) >= min_z
            && z.saturating_sub(padding) <= max_z
    }
}

pub struct ZoneHook {
    zones: Vec<Zone>,
    padding: i32,
    async_capable: bool,
}

impl ZoneHook {
    /// `None` when no zones are configured.
    pub fn from_settings(settings: &ProtectionSettings) -> Option<Self> {
        if settings.zones.is_empty() {
            return None;
        }
        Some(Self {
            zones: settings.zones.clone(),
            padding: settings.padding_chunks.max(0),
            async_capable: settings.async_capable,
        })
    }
}

impl ProtectionHook for ZoneHook {
    fn name(&self) -> &str {
        "zones"
    }

    fn is_chunk_protected(&self, world: &str, chunk_x: i32, chunk_z: i32) -> anyhow::Result<bool> {
        Ok(self
            .zones
            .iter()
            .any(|zone| zone.world == world && zone.near(chunk_x, chunk_z, self.padding)))
    }

    fn is_async_capable(&self) -> bool {
        self.async_capable
    }
}
