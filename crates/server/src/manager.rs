//! Cycle manager: one deletion worker thread per world on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use regionerator_engine::deletion::{CycleListener, DeletionContext, DeletionRunner, RunSnapshot};
use regionerator_engine::format_millis;
use regionerator_engine::world::{AnvilWorld, WorldInfo};
use tokio::sync::mpsc;

use crate::state::CycleState;

struct Worker {
    runner: Arc<DeletionRunner>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Join a finished thread so its panic, if any, gets reported.
    fn reap(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Deletion worker for {} panicked", self.runner.world());
            }
        }
    }
}

pub struct CycleManager {
    worlds_dir: PathBuf,
    ctx: DeletionContext,
    state: Arc<CycleState>,
    workers: Mutex<BTreeMap<String, Worker>>,
}

impl CycleManager {
    pub fn new(worlds_dir: impl Into<PathBuf>, ctx: DeletionContext, state: Arc<CycleState>) -> Self {
        Self {
            worlds_dir: worlds_dir.into(),
            ctx,
            state,
            workers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start a cycle for every enabled world that is due. Returns the worlds
    /// whose workers were started.
    pub fn attempt_activation(&self, now: i64) -> Vec<String> {
        let config = self.ctx.config.snapshot();
        let mut started = Vec::new();
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        for world in self.discover() {
            let name = world.name().to_string();
            if !config.is_enabled(&name) {
                continue;
            }

            if let Some(worker) = workers.get_mut(&name) {
                if worker.is_running() || worker.runner.is_cancelled() {
                    continue;
                }
                worker.reap();
            }

            let worker = workers.entry(name.clone()).or_insert_with(|| {
                let runner = DeletionRunner::new(Arc::new(world), self.ctx.clone());
                let seeded = if config.remember_cycle_delay() {
                    self.state.next_run(&name)
                } else {
                    None
                };
                runner.set_next_run(seeded.unwrap_or(now));
                if let Some(at) = seeded {
                    tracing::info!("Next cycle for {} at {}", name, format_millis(at));
                }
                Worker {
                    runner: Arc::new(runner),
                    thread: None,
                }
            });

            if worker.runner.next_run() > now {
                continue;
            }

            worker.runner.rearm();
            let runner = Arc::clone(&worker.runner);
            let spawned = thread::Builder::new()
                .name(format!("deletion-{name}"))
                .spawn(move || runner.run_once());
            match spawned {
                Ok(thread) => {
                    tracing::info!("Starting regeneration cycle for {}", name);
                    worker.thread = Some(thread);
                    started.push(name);
                }
                Err(e) => {
                    tracing::error!("Unable to start deletion worker for {}: {}", name, e);
                    // Releases the rendezvous slot taken by rearm.
                    worker.runner.cancel();
                    worker.runner.run_once();
                }
            }
        }

        started
    }

    /// Worlds with a worker thread currently scanning.
    pub fn running(&self) -> Vec<String> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, worker)| worker.is_running())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|worker| worker.runner.snapshot())
            .collect()
    }

    /// Cancel every runner and wait for the worker threads to exit.
    pub fn shutdown(&self) {
        let threads: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers
                .values_mut()
                .filter_map(|worker| {
                    worker.runner.cancel();
                    worker.thread.take().map(|thread| (worker.runner.world().to_string(), thread))
                })
                .collect()
        };

        for (world, thread) in threads {
            if thread.join().is_err() {
                tracing::error!("Deletion worker for {} panicked", world);
            }
        }
    }

    /// Subdirectories of the worlds directory that hold a region folder.
    fn discover(&self) -> Vec<AnvilWorld> {
        let entries = match fs::read_dir(&self.worlds_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Unable to list worlds in {}: {}", self.worlds_dir.display(), e);
                return Vec::new();
            }
        };

        let mut worlds: Vec<AnvilWorld> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                AnvilWorld::locate(name, &entry.path())
            })
            .collect();
        worlds.sort_by(|a, b| a.name().cmp(b.name()));
        worlds
    }
}

/// Forwards finished cycles to the task that persists `state.json`.
pub struct CycleReporter {
    tx: mpsc::UnboundedSender<RunSnapshot>,
}

impl CycleReporter {
    pub fn new(tx: mpsc::UnboundedSender<RunSnapshot>) -> Self {
        Self { tx }
    }
}

impl CycleListener for CycleReporter {
    fn cycle_finished(&self, run: &RunSnapshot) -> anyhow::Result<()> {
        self.tx
            .send(run.clone())
            .map_err(|_| anyhow::anyhow!("cycle state writer has stopped"))
    }
}
