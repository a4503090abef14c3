//! Runtime configuration and the values derived from it.
//!
//! The raw fields mirror the config file one-to-one; every consumer goes
//! through the derived accessors, which apply the clamping rules. A
//! `SharedConfig` hands out whole `Arc<Config>` snapshots so a reload can
//! never be observed half-applied.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::visit::FLAG_GENERATED;

/// Version written by this build. Older files are migrated on load.
pub const CURRENT_CONFIG_VERSION: i64 = 1;

/// World entry consulted when a world has no entry of its own.
pub const DEFAULT_WORLD: &str = "default";

const MILLIS_PER_DAY: i64 = 86_400_000;
const MILLIS_PER_HOUR: u64 = 3_600_000;
/// Used when `seconds-per-flag` is below one.
const FALLBACK_FLAG_INTERVAL: Duration = Duration::from_millis(500);

/// Verbosity tiers for scan diagnostics, layered over the tracing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub config_version: i64,
    pub debug_level: DebugLevel,
    pub flagging: FlaggingSettings,
    pub deletion: DeletionSettings,
    pub worlds: IndexMap<String, WorldSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FlaggingSettings {
    pub flag_generated_chunks_until_visited: bool,
    pub chunk_flag_radius: i32,
    pub seconds_per_flag: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeletionSettings {
    /// Milliseconds slept after each region and every N expensive checks.
    pub recovery_time: i64,
    pub expensive_checks_between_recovery: i64,
    pub hours_between_cycles: i64,
    pub remember_next_cycle_time: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorldSettings {
    /// `None` falls back to the `default` world entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_till_flag_expires: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        let mut worlds = IndexMap::new();
        worlds.insert(
            DEFAULT_WORLD.to_string(),
            WorldSettings {
                days_till_flag_expires: Some(-1),
            },
        );
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            debug_level: DebugLevel::Off,
            flagging: FlaggingSettings::default(),
            deletion: DeletionSettings::default(),
            worlds,
        }
    }
}

impl Default for FlaggingSettings {
    fn default() -> Self {
        Self {
            flag_generated_chunks_until_visited: true,
            chunk_flag_radius: 4,
            seconds_per_flag: 10,
        }
    }
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self {
            recovery_time: 2000,
            expensive_checks_between_recovery: 250,
            hours_between_cycles: 168,
            remember_next_cycle_time: true,
        }
    }
}

impl Config {
    pub fn debug(&self, level: DebugLevel) -> bool {
        self.debug_level >= level
    }

    fn world_days(&self, world: &str) -> Option<i64> {
        let entry = self.worlds.get(world).or_else(|| {
            self.worlds
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(world))
                .map(|(_, settings)| settings)
        });
        entry
            .and_then(|settings| settings.days_till_flag_expires)
            .or_else(|| {
                self.worlds
                    .get(DEFAULT_WORLD)
                    .and_then(|settings| settings.days_till_flag_expires)
            })
    }

    /// How long a visit keeps a chunk alive, in milliseconds. Negative means
    /// the world is not managed.
    pub fn flag_duration(&self, world: &str) -> i64 {
        match self.world_days(world) {
            Some(days) if days >= 0 => days.saturating_mul(MILLIS_PER_DAY),
            _ => -1,
        }
    }

    pub fn is_enabled(&self, world: &str) -> bool {
        self.flag_duration(world) >= 0
    }

    /// Whether generated-but-unvisited chunks may be deleted once their
    /// generation flag lapses.
    pub fn delete_fresh_chunks(&self, world: &str) -> bool {
        !self.flagging.flag_generated_chunks_until_visited && self.flag_duration(world) > 0
    }

    /// Flag value for a chunk seen visited at `now`.
    pub fn flag_visit(&self, world: &str, now: i64) -> i64 {
        now.saturating_add(self.flag_duration(world))
    }

    /// Flag value for a freshly generated chunk.
    pub fn flag_generated(&self, world: &str, now: i64) -> i64 {
        if self.delete_fresh_chunks(world) {
            self.flag_visit(world, now)
        } else {
            FLAG_GENERATED
        }
    }

    pub fn flagging_interval(&self) -> Duration {
        if self.flagging.seconds_per_flag < 1 {
            FALLBACK_FLAG_INTERVAL
        } else {
            Duration::from_secs(self.flagging.seconds_per_flag as u64)
        }
    }

    pub fn flag_radius(&self) -> i32 {
        self.flagging.chunk_flag_radius.max(0)
    }

    pub fn recovery_time(&self) -> Duration {
        Duration::from_millis(self.deletion.recovery_time.max(0) as u64)
    }

    pub fn expensive_checks_between_recovery(&self) -> u64 {
        self.deletion.expensive_checks_between_recovery.max(1) as u64
    }

    pub fn cycle_delay(&self) -> Duration {
        let hours = self.deletion.hours_between_cycles.max(0) as u64;
        Duration::from_millis(hours.saturating_mul(MILLIS_PER_HOUR))
    }

    pub fn remember_cycle_delay(&self) -> bool {
        self.deletion.remember_next_cycle_time
    }

    /// Configured world names, excluding the `default` entry.
    pub fn world_names(&self) -> impl Iterator<Item = &str> {
        self.worlds
            .keys()
            .map(String::as_str)
            .filter(|name| *name != DEFAULT_WORLD)
    }
}

/// Config shared between the scanner threads and whoever reloads it.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The config as of now. Read every related value from one snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, config: Config) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_worlds(entries: &[(&str, Option<i64>)]) -> Config {
        let mut config = Config::default();
        for (name, days) in entries {
            config.worlds.insert(
                name.to_string(),
                WorldSettings {
                    days_till_flag_expires: *days,
                },
            );
        }
        config
    }

    #[test]
    fn test_defaults_disable_every_world() {
        let config = Config::default();
        assert_eq!(config.flag_duration("world"), -1);
        assert!(!config.is_enabled("world"));
        assert!(!config.delete_fresh_chunks("world"));
        assert_eq!(config.flagging_interval(), Duration::from_secs(10));
        assert_eq!(config.cycle_delay(), Duration::from_secs(168 * 3600));
    }

    #[test]
    fn test_flag_duration_falls_back_to_default_entry() {
        let config = with_worlds(&[("default", Some(2)), ("world", Some(7)), ("world_nether", None)]);
        assert_eq!(config.flag_duration("world"), 7 * MILLIS_PER_DAY);
        assert_eq!(config.flag_duration("world_nether"), 2 * MILLIS_PER_DAY);
        assert_eq!(config.flag_duration("unlisted"), 2 * MILLIS_PER_DAY);
        assert_eq!(config.flag_duration("WORLD"), 7 * MILLIS_PER_DAY);
    }

    #[test]
    fn test_negative_days_disable_world() {
        let config = with_worlds(&[("default", Some(3)), ("world_the_end", Some(-5))]);
        assert_eq!(config.flag_duration("world_the_end"), -1);
        assert!(!config.is_enabled("world_the_end"));
        assert!(config.is_enabled("world"));
    }

    #[test]
    fn test_fresh_chunk_deletion_needs_positive_duration() {
        let mut config = with_worlds(&[("world", Some(1)), ("instant", Some(0))]);
        assert!(!config.delete_fresh_chunks("world"));
        assert_eq!(config.flag_generated("world", 1_000), FLAG_GENERATED);

        config.flagging.flag_generated_chunks_until_visited = false;
        assert!(config.delete_fresh_chunks("world"));
        assert!(!config.delete_fresh_chunks("instant"));
        assert_eq!(config.flag_generated("world", 1_000), 1_000 + MILLIS_PER_DAY);
        assert_eq!(config.flag_generated("instant", 1_000), FLAG_GENERATED);
    }

    #[test]
    fn test_flag_visit_saturates() {
        let config = with_worlds(&[("world", Some(1))]);
        assert_eq!(config.flag_visit("world", i64::MAX - 5), i64::MAX);
    }

    #[test]
    fn test_clamped_values() {
        let mut config = Config::default();
        config.flagging.seconds_per_flag = 0;
        config.flagging.chunk_flag_radius = -3;
        config.deletion.recovery_time = -10;
        config.deletion.expensive_checks_between_recovery = 0;
        config.deletion.hours_between_cycles = -1;

        assert_eq!(config.flagging_interval(), Duration::from_millis(500));
        assert_eq!(config.flag_radius(), 0);
        assert_eq!(config.recovery_time(), Duration::ZERO);
        assert_eq!(config.expensive_checks_between_recovery(), 1);
        assert_eq!(config.cycle_delay(), Duration::ZERO);
    }

    #[test]
    fn test_debug_levels_are_ordered() {
        let mut config = Config::default();
        assert!(!config.debug(DebugLevel::Low));
        config.debug_level = DebugLevel::Medium;
        assert!(config.debug(DebugLevel::Low));
        assert!(config.debug(DebugLevel::Medium));
        assert!(!config.debug(DebugLevel::High));
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let shared = SharedConfig::default();
        let before = shared.snapshot();
        shared.replace(with_worlds(&[("world", Some(4))]));
        assert_eq!(before.flag_duration("world"), -1);
        assert_eq!(shared.snapshot().flag_duration("world"), 4 * MILLIS_PER_DAY);
    }
}
