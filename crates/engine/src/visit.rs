//! Per-chunk visit classification.

use crate::config::{Config, DebugLevel};
use crate::deletion::CancelToken;
use crate::flag::FlagCache;
use crate::hooks::HookRegistry;
use crate::world::{RegionInfo, SlotIndex};

/// Chunk was never flagged.
pub const FLAG_DEFAULT: i64 = -1;
/// Flag that never expires.
pub const FLAG_ETERNAL: i64 = i64::MAX - 1;
/// Flag data for the chunk could not be loaded.
pub const FLAG_OH_NO: i64 = i64::MAX - 2;
/// Generated chunk kept until someone visits it.
pub const FLAG_GENERATED: i64 = i64::MAX;

/// Lifecycle state of a chunk. Declaration order matters: everything before
/// `Visited` may be deleted, everything from `Visited` on is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VisitStatus {
    /// No data in the region file.
    Orphaned,
    /// Generated but never visited.
    Generated,
    /// Visited once, flag since expired.
    Unvisited,
    Visited,
    PermanentlyFlagged,
    Protected,
    /// Classification failed; kept.
    Unknown,
}

impl VisitStatus {
    pub fn is_eligible(self) -> bool {
        self < VisitStatus::Visited
    }
}

/// Classifies the chunks of one region against one config snapshot.
///
/// Checks are ordered cheapest first. Hook queries count as expensive; every
/// `expensive-checks-between-recovery` of them the classifier sleeps for the
/// recovery time, waking early on cancellation.
pub struct Classifier<'a> {
    world: &'a str,
    config: &'a Config,
    flags: &'a dyn FlagCache,
    hooks: &'a HookRegistry,
    cancel: &'a CancelToken,
    expensive_checks: u64,
}

impl<'a> Classifier<'a> {
    pub fn new(
        world: &'a str,
        config: &'a Config,
        flags: &'a dyn FlagCache,
        hooks: &'a HookRegistry,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            world,
            config,
            flags,
            hooks,
            cancel,
            expensive_checks: 0,
        }
    }

    /// Expensive checks performed since this classifier was built.
    pub fn expensive_checks(&self) -> u64 {
        self.expensive_checks
    }

    pub fn classify(&mut self, region: &dyn RegionInfo, slot: SlotIndex, now: i64) -> VisitStatus {
        let verbose = self.config.debug(DebugLevel::High);

        if self.cancel.is_cancelled() {
            if verbose {
                tracing::debug!("Deletion task is cancelled, chunks are ineligible for delete.");
            }
            return VisitStatus::Unknown;
        }

        let chunk = region.chunk(slot);

        if region.is_orphaned(slot) {
            if verbose {
                tracing::trace!("{}: {}, {} is already orphaned.", region.identifier(), chunk.x, chunk.z);
            }
            return VisitStatus::Orphaned;
        }

        let last_visit = self
            .flags
            .visit_until(self.world, chunk)
            .unwrap_or(FLAG_DEFAULT);
        let is_fresh = !self.config.delete_fresh_chunks(self.world)
            && last_visit == self.config.flag_generated(self.world, now);

        if !is_fresh && now <= last_visit {
            if verbose {
                tracing::trace!(
                    "{}: {}, {} is visited until {}",
                    region.identifier(),
                    chunk.x,
                    chunk.z,
                    last_visit
                );
            }
            return match last_visit {
                FLAG_ETERNAL => VisitStatus::PermanentlyFlagged,
                FLAG_OH_NO => VisitStatus::Unknown,
                _ => VisitStatus::Visited,
            };
        }

        let last_modified = region.last_modified(slot);
        let window_start = now.saturating_sub(self.config.flag_duration(self.world));
        if !is_fresh && window_start <= last_modified {
            if verbose {
                tracing::trace!(
                    "{}: {}, {} is modified until {}",
                    region.identifier(),
                    chunk.x,
                    chunk.z,
                    last_modified
                );
            }
            return VisitStatus::Visited;
        }

        self.expensive_checks += 1;
        if self.expensive_checks % self.config.expensive_checks_between_recovery() == 0 {
            self.cancel.sleep(self.config.recovery_time());
        }

        match self.hooks.is_protected(self.world, chunk) {
            Ok(true) => return VisitStatus::Protected,
            Ok(false) => {}
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    tracing::warn!(
                        "Caught an error getting visit status of {}_{}_{}: {}",
                        self.world,
                        chunk.x,
                        chunk.z,
                        e
                    );
                }
                return VisitStatus::Unknown;
            }
        }

        if last_visit == FLAG_DEFAULT || last_visit == FLAG_GENERATED {
            VisitStatus::Generated
        } else {
            VisitStatus::Unvisited
        }
    }
}
