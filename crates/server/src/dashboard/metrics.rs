//! Lock-free service counters.
//!
//! API handlers and the cycle-state task bump these with relaxed atomics;
//! the stats endpoint reads them at its own pace.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

pub struct Metrics {
    player_reports: AtomicU64,
    flag_requests: AtomicU64,
    flagged_chunks: AtomicU64,
    reloads: AtomicU64,
    failed_reloads: AtomicU64,
    cycles_recorded: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            player_reports: AtomicU64::new(0),
            flag_requests: AtomicU64::new(0),
            flagged_chunks: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            failed_reloads: AtomicU64::new(0),
            cycles_recorded: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn player_report(&self) {
        self.player_reports.fetch_add(1, Relaxed);
    }

    pub fn flag_request(&self, chunks: u64) {
        self.flag_requests.fetch_add(1, Relaxed);
        self.flagged_chunks.fetch_add(chunks, Relaxed);
    }

    pub fn reload(&self, ok: bool) {
        if ok {
            self.reloads.fetch_add(1, Relaxed);
        } else {
            self.failed_reloads.fetch_add(1, Relaxed);
        }
    }

    /// A finished cycle whose next run was persisted.
    pub fn cycle_recorded(&self) {
        self.cycles_recorded.fetch_add(1, Relaxed);
    }

    pub fn snapshot(&self, players_online: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            player_reports: self.player_reports.load(Relaxed),
            flag_requests: self.flag_requests.load(Relaxed),
            flagged_chunks: self.flagged_chunks.load(Relaxed),
            reloads: self.reloads.load(Relaxed),
            failed_reloads: self.failed_reloads.load(Relaxed),
            cycles_recorded: self.cycles_recorded.load(Relaxed),
            players_online,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub player_reports: u64,
    pub flag_requests: u64,
    /// Chunks touched by API flag requests, including unflags.
    pub flagged_chunks: u64,
    pub reloads: u64,
    pub failed_reloads: u64,
    pub cycles_recorded: u64,
    pub players_online: u64,
}
