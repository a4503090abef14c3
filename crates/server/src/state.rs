//! Remembered cycle schedule (`state.json`): when each world is next due.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use regionerator_engine::deletion::RunSnapshot;

use crate::flag_store::write_atomic;

pub struct CycleState {
    path: PathBuf,
    next_runs: Mutex<BTreeMap<String, i64>>,
}

impl CycleState {
    /// Load the schedule at `path`; a missing file is an empty schedule.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let next_runs = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(Self {
            path,
            next_runs: Mutex::new(next_runs),
        })
    }

    /// An empty schedule that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_runs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_run(&self, world: &str) -> Option<i64> {
        self.next_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(world)
            .copied()
    }

    pub fn record(&self, run: &RunSnapshot) {
        self.next_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run.world.clone(), run.next_run);
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = {
            let next_runs = self.next_runs.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec_pretty(&*next_runs).context("serializing cycle state")?
        };
        write_atomic(&self.path, &json)
    }
}
