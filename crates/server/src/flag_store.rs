//! On-disk persistence of the flag cache (`flags.json`).
//!
//! Format: `{ "<world>": [[x, z, until], ...] }`. Saves go through a temp
//! file and a rename so a crash mid-save never leaves a truncated file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use regionerator_engine::flag::MemoryFlagCache;
use regionerator_engine::world::ChunkPos;

type FlagFile = BTreeMap<String, Vec<(i32, i32, i64)>>;

/// Load flags from `path` into `cache`. A missing file loads nothing.
pub fn load(path: &Path, cache: &MemoryFlagCache) -> anyhow::Result<usize> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let file: FlagFile =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;

    let mut loaded = 0;
    for (world, flags) in file {
        loaded += flags.len();
        cache.restore(
            &world,
            flags
                .into_iter()
                .map(|(x, z, until)| (ChunkPos::new(x, z), until)),
        );
    }
    Ok(loaded)
}

/// Write every flag in `cache` to `path`. Returns the number written.
pub fn save(path: &Path, cache: &MemoryFlagCache) -> anyhow::Result<usize> {
    let mut saved = 0;
    let file: FlagFile = cache
        .snapshot()
        .into_iter()
        .map(|(world, flags)| {
            saved += flags.len();
            let flags = flags
                .into_iter()
                .map(|(chunk, until)| (chunk.x, chunk.z, until))
                .collect();
            (world, flags)
        })
        .collect();

    let json = serde_json::to_vec(&file).context("serializing flags")?;
    write_atomic(path, &json)?;
    Ok(saved)
}

/// Replace `path` with `contents` via a sibling temp file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
