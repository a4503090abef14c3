//! Per-world run counters.
//!
//! Workers bump these with relaxed atomics; operator tooling reads them at
//! its own pace through `RunSnapshot`. Values are eventually consistent and
//! only used for reporting.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering::Relaxed};

use serde::{Deserialize, Serialize};

/// Lifecycle of one world's deletion worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Scanning,
    Completed,
    Cancelled,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Scanning,
            2 => RunState::Completed,
            3 => RunState::Cancelled,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Scanning => 1,
            RunState::Completed => 2,
            RunState::Cancelled => 3,
        }
    }
}

pub struct RunStats {
    world: String,
    regions_checked: AtomicU64,
    regions_deleted: AtomicU64,
    chunks_deleted: AtomicU64,
    /// Epoch millis of the next cycle; `i64::MAX` until one is scheduled.
    next_run: AtomicI64,
    state: AtomicU8,
}

impl RunStats {
    pub fn new(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            regions_checked: AtomicU64::new(0),
            regions_deleted: AtomicU64::new(0),
            chunks_deleted: AtomicU64::new(0),
            next_run: AtomicI64::new(i64::MAX),
            state: AtomicU8::new(RunState::Idle.as_u8()),
        }
    }

    pub fn region_checked(&self) -> u64 {
        self.regions_checked.fetch_add(1, Relaxed) + 1
    }

    pub fn region_deleted(&self) {
        self.regions_deleted.fetch_add(1, Relaxed);
    }

    pub fn chunks_deleted(&self, count: u64) {
        self.chunks_deleted.fetch_add(count, Relaxed);
    }

    pub fn next_run(&self) -> i64 {
        self.next_run.load(Relaxed)
    }

    pub fn set_next_run(&self, at: i64) {
        self.next_run.store(at, Relaxed);
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Relaxed))
    }

    pub fn set_state(&self, state: RunState) {
        self.state.store(state.as_u8(), Relaxed);
    }

    /// Zero the counters for a new cycle. `next_run` is kept.
    pub fn reset(&self) {
        self.regions_checked.store(0, Relaxed);
        self.regions_deleted.store(0, Relaxed);
        self.chunks_deleted.store(0, Relaxed);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            world: self.world.clone(),
            regions_checked: self.regions_checked.load(Relaxed),
            regions_deleted: self.regions_deleted.load(Relaxed),
            chunks_deleted: self.chunks_deleted.load(Relaxed),
            next_run: self.next_run(),
            state: self.state(),
        }
    }
}

/// Point-in-time copy of a world's run statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub world: String,
    pub regions_checked: u64,
    pub regions_deleted: u64,
    pub chunks_deleted: u64,
    pub next_run: i64,
    pub state: RunState,
}

impl fmt::Display for RunSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: checked {}, deleted {} regions & {} chunks",
            self.world, self.regions_checked, self.regions_deleted, self.chunks_deleted
        )
    }
}
