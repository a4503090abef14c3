use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};

use crate::config::{DebugLevel, SharedConfig};
use crate::flag::FlagCache;
use crate::hooks::HookRegistry;
use crate::{format_millis, now_millis};
use crate::visit::{Classifier, VisitStatus};
use crate::world::{RegionInfo, RegionPos, SLOT_COUNT, SlotIndex, WorldInfo, WriteOutcome};

use super::barrier::Rendezvous;
use super::cancel::CancelToken;
use super::stats::{RunSnapshot, RunState, RunStats};

/// Regions between progress reports.
const PROGRESS_INTERVAL: u64 = 20;

/// Told when a world finishes a full cycle, so the next run can be
/// remembered across restarts.
pub trait CycleListener: Send + Sync {
    /// An `Err` means the host is no longer accepting work; the runner logs
    /// and carries on.
    fn cycle_finished(&self, run: &RunSnapshot) -> anyhow::Result<()>;
}

/// Everything the per-world runners share.
#[derive(Clone)]
pub struct DeletionContext {
    pub config: Arc<SharedConfig>,
    pub flags: Arc<dyn FlagCache>,
    pub hooks: Arc<HookRegistry>,
    pub rendezvous: Arc<Rendezvous>,
    pub listener: Option<Arc<dyn CycleListener>>,
}

/// Scans one world's regions and deletes what nobody has visited.
///
/// A runner is driven from its own thread: `rearm` on the scheduling side,
/// then `run_once` on the worker. All runners of a context walk their
/// regions in lockstep through the shared `Rendezvous`.
pub struct DeletionRunner {
    world: Arc<dyn WorldInfo>,
    ctx: DeletionContext,
    cancel: CancelToken,
    stats: RunStats,
    armed: AtomicBool,
}

impl DeletionRunner {
    pub fn new(world: Arc<dyn WorldInfo>, ctx: DeletionContext) -> Self {
        let stats = RunStats::new(world.name());
        Self {
            world,
            ctx,
            cancel: CancelToken::new(),
            stats,
            armed: AtomicBool::new(false),
        }
    }

    pub fn world(&self) -> &str {
        self.world.name()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> RunState {
        self.stats.state()
    }

    pub fn next_run(&self) -> i64 {
        self.stats.next_run()
    }

    /// Seed the schedule, e.g. from a remembered cycle.
    pub fn set_next_run(&self, at: i64) {
        self.stats.set_next_run(at);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.stats.snapshot()
    }

    /// Prepare for another cycle and join the rendezvous, before the worker
    /// thread is started so that siblings already scanning wait for it.
    pub fn rearm(&self) {
        self.stats.reset();
        self.stats.set_state(RunState::Idle);
        if !self.armed.swap(true, SeqCst) {
            self.ctx.rendezvous.register();
        }
    }

    /// Run one full cycle over the world. Blocks until done or cancelled.
    pub fn run_once(&self) {
        if !self.armed.swap(false, SeqCst) {
            self.ctx.rendezvous.register();
        }
        self.stats.set_state(RunState::Scanning);

        match self.world.region_positions() {
            Ok(positions) => {
                for pos in positions {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    self.handle_region(pos);
                }
            }
            Err(e) => tracing::warn!("Unable to list regions of {}: {}", self.world(), e),
        }

        if self.cancel.is_cancelled() {
            self.stats.set_state(RunState::Cancelled);
            tracing::info!("Deletion cycle cancelled for {}", self.stats.snapshot());
        } else {
            self.finish_cycle();
        }

        self.ctx.rendezvous.arrive_and_deregister();
    }

    fn finish_cycle(&self) {
        let config = self.ctx.config.snapshot();
        tracing::info!("Regeneration cycle complete for {}", self.stats.snapshot());

        let delay = i64::try_from(config.cycle_delay().as_millis()).unwrap_or(i64::MAX);
        let next_run = now_millis().saturating_add(delay);
        self.stats.set_next_run(next_run);
        tracing::info!("Next cycle for {} at {}", self.world(), format_millis(next_run));
        self.stats.set_state(RunState::Completed);

        if config.remember_cycle_delay() {
            if let Some(listener) = &self.ctx.listener {
                if let Err(e) = listener.cycle_finished(&self.stats.snapshot()) {
                    // Host shutting down mid-cycle; leave the old schedule.
                    tracing::debug!("Unable to record finished cycle for {}: {}", self.world(), e);
                }
            }
        }

        self.stats.set_state(RunState::Idle);
    }

    fn handle_region(&self, pos: RegionPos) {
        if self.cancel.is_cancelled() {
            return;
        }

        self.ctx.rendezvous.arrive_and_await();

        let checked = self.stats.region_checked();
        let config = self.ctx.config.snapshot();
        let world = self.world.name();
        let mut region = self.world.region(pos);

        if config.debug(DebugLevel::High) {
            tracing::debug!("Checking {}:{} ({})", world, region.identifier(), checked);
        }

        if let Err(e) = region.read() {
            tracing::warn!("Unable to read region {}:{}: {}", world, region.identifier(), e);
            return;
        }

        let eligible = {
            let mut classifier = Classifier::new(
                world,
                &config,
                self.ctx.flags.as_ref(),
                &self.ctx.hooks,
                &self.cancel,
            );
            self.collect_eligible(region.as_ref(), &mut classifier, config.delete_fresh_chunks(world))
        };

        // Cancelled mid-region: leave the file as it was.
        if eligible.is_empty() && self.cancel.is_cancelled() {
            return;
        }

        // Pending marks must be in place before write, which is what deletes
        // a region left without chunks.
        for (slot, _) in &eligible {
            region.set_orphaned(*slot);
        }

        match region.write() {
            Ok(outcome) => {
                for (slot, _) in &eligible {
                    self.ctx.flags.unflag(world, region.chunk(*slot));
                }
                match outcome {
                    WriteOutcome::Deleted => self.stats.region_deleted(),
                    WriteOutcome::Rewritten => {
                        let removed = eligible
                            .iter()
                            .filter(|(_, status)| *status != VisitStatus::Orphaned)
                            .count();
                        self.stats.chunks_deleted(removed as u64);
                    }
                    WriteOutcome::Missing => {}
                }
            }
            Err(e) => {
                tracing::debug!("Unable to write region {}:{}: {}", world, region.identifier(), e);
            }
        }

        if checked % PROGRESS_INTERVAL == 0 && config.debug(DebugLevel::Low) {
            tracing::info!("{}", self.stats.snapshot());
        }

        self.cancel.sleep(config.recovery_time());
    }

    /// Slots to orphan this pass, with the status that made them eligible.
    fn collect_eligible(
        &self,
        region: &dyn RegionInfo,
        classifier: &mut Classifier<'_>,
        delete_fresh: bool,
    ) -> Vec<(SlotIndex, VisitStatus)> {
        let now = now_millis();
        let mut eligible: Vec<(SlotIndex, VisitStatus)> = SlotIndex::all()
            .filter_map(|slot| {
                let status = classifier.classify(region, slot, now);
                status.is_eligible().then_some((slot, status))
            })
            .collect();

        if eligible.len() == SLOT_COUNT {
            return eligible;
        }

        // Partial region: skip slots that are already empty, and generated
        // chunks unless this world deletes them.
        eligible.retain(|(_, status)| {
            !self.cancel.is_cancelled()
                && *status != VisitStatus::Orphaned
                && (delete_fresh || *status != VisitStatus::Generated)
        });
        eligible
    }
}
