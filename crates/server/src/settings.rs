//! Config file loading.
//!
//! Layering: compiled-in defaults, then the (migrated) TOML file, then
//! `REGIONERATOR__`-prefixed environment variables, where `__` separates
//! tables and `_` stands for `-` (`REGIONERATOR__DELETION__RECOVERY_TIME`).

use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use regionerator_engine::config::{CURRENT_CONFIG_VERSION, Config, DEFAULT_WORLD};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::zones::ProtectionSettings;

const ENV_PREFIX: &str = "REGIONERATOR__";

/// Legacy milliseconds per server tick, used to convert `ticks-per-deletion`.
const MILLIS_PER_TICK: i64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(flatten)]
    pub engine: Config,
    #[serde(default)]
    pub protection: ProtectionSettings,
}

/// Load settings from `path`, migrating and rewriting legacy files.
/// A missing file yields the defaults.
pub fn load(path: &Path) -> anyhow::Result<Settings> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("No config at {}, using defaults", path.display());
            return from_toml("");
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading config {}", path.display()));
        }
    };

    let mut table: Table = text
        .parse()
        .with_context(|| format!("parsing config {}", path.display()))?;

    if migrate(&mut table) {
        let migrated = toml::to_string_pretty(&table).context("serializing migrated config")?;
        fs::write(path, &migrated)
            .with_context(|| format!("writing migrated config {}", path.display()))?;
        tracing::info!("Updated {} to config version {}", path.display(), CURRENT_CONFIG_VERSION);
        return from_toml(&migrated);
    }

    from_toml(&text)
}

/// Build settings from TOML text layered over defaults and the environment.
pub fn from_toml(contents: &str) -> anyhow::Result<Settings> {
    layered(contents)
        .merge(Env::prefixed(ENV_PREFIX).map(|key| env_key(key.as_str()).into()))
        .extract()
        .context("invalid configuration")
}

/// Map an env key (prefix stripped) to a config path: `__` nests and `_`
/// stands for `-`, except in the world name that follows `worlds`, which is
/// kept as written (`WORLDS__WORLD_NETHER__DAYS_TILL_FLAG_EXPIRES` is
/// `worlds.world_nether.days-till-flag-expires`).
fn env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    let mut path: Vec<String> = Vec::new();
    for segment in key.split("__") {
        let world_name = path.len() == 1 && path[0] == "worlds";
        if world_name {
            path.push(segment.to_string());
        } else {
            path.push(segment.replace('_', "-"));
        }
    }
    path.join(".")
}

fn layered(contents: &str) -> Figment {
    Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(contents))
}

/// Bring a raw config table up to the current version. Returns `true` if
/// anything changed and the file should be written back.
pub fn migrate(table: &mut Table) -> bool {
    let version = table
        .get("config-version")
        .and_then(Value::as_integer)
        .unwrap_or(0);

    match version {
        0 => {
            migrate_0_to_1(table);
            true
        }
        CURRENT_CONFIG_VERSION => false,
        _ => {
            tracing::warn!("You appear to have messed with your configuration version.");
            tracing::warn!("Please ensure that your configuration contains the correct nodes.");
            table.insert("config-version".into(), Value::Integer(CURRENT_CONFIG_VERSION));
            true
        }
    }
}

fn migrate_0_to_1(table: &mut Table) {
    move_key(table, "seconds-per-flag", "flagging", "seconds-per-flag", Some);
    move_key(table, "chunk-flag-radius", "flagging", "chunk-flag-radius", Some);
    move_key(
        table,
        "delete-new-unvisited-chunks",
        "flagging",
        "flag-generated-chunks-until-visited",
        |value| value.as_bool().map(|delete| Value::Boolean(!delete)),
    );

    move_key(table, "ticks-per-deletion", "deletion", "recovery-time", |value| {
        value
            .as_integer()
            .map(|ticks| Value::Integer(ticks.saturating_mul(MILLIS_PER_TICK)))
    });
    move_key(
        table,
        "chunks-per-deletion",
        "deletion",
        "expensive-checks-between-recovery",
        Some,
    );
    move_key(table, "hours-between-cycles", "deletion", "hours-between-cycles", Some);
    move_key(
        table,
        "remember-next-cycle-time",
        "deletion",
        "remember-next-cycle-time",
        Some,
    );

    let days = table
        .remove("days-till-flag-expires")
        .and_then(|value| value.as_integer())
        .map(|days| days.max(0));

    let mut worlds = match table.remove("worlds") {
        Some(Value::Table(existing)) => existing,
        Some(Value::Array(names)) => {
            let mut worlds = Table::new();
            for name in names.iter().filter_map(Value::as_str) {
                let mut world = Table::new();
                if let Some(days) = days {
                    world.insert("days-till-flag-expires".into(), Value::Integer(days));
                }
                worlds.insert(name.to_string(), Value::Table(world));
            }
            worlds
        }
        _ => Table::new(),
    };
    if !worlds.contains_key(DEFAULT_WORLD) {
        let mut default = Table::new();
        default.insert("days-till-flag-expires".into(), Value::Integer(-1));
        worlds.insert(DEFAULT_WORLD.into(), Value::Table(default));
    }
    table.insert("worlds".into(), Value::Table(worlds));

    table.insert("config-version".into(), Value::Integer(1));
}

/// Move a top-level key into `section`, converting its value. Values the
/// conversion rejects are dropped so the default applies.
fn move_key(
    table: &mut Table,
    from: &str,
    section: &str,
    to: &str,
    convert: impl FnOnce(Value) -> Option<Value>,
) {
    let Some(value) = table.remove(from) else {
        return;
    };
    let Some(value) = convert(value) else {
        tracing::warn!("Dropping legacy config value {} with unexpected type", from);
        return;
    };
    let entry = table
        .entry(section.to_string())
        .or_insert(Value::Table(Table::new()));
    if !entry.is_table() {
        *entry = Value::Table(Table::new());
    }
    if let Value::Table(section) = entry {
        section.insert(to.to_string(), value);
    }
}
