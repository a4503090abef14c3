use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Phase {
    parties: usize,
    arrived: usize,
    phase: u64,
}

impl Phase {
    fn advance(&mut self) {
        self.arrived = 0;
        self.phase = self.phase.wrapping_add(1);
    }
}

/// Reusable barrier whose party count changes at runtime.
///
/// Workers `register` before their first arrival and `arrive_and_deregister`
/// when they finish, so a world that joins or leaves mid-cycle never strands
/// the others. A phase completes once every registered party has arrived.
#[derive(Debug, Default)]
pub struct Rendezvous {
    state: Mutex<Phase>,
    advanced: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a party. It is expected at the current phase.
    pub fn register(&self) -> u64 {
        let mut state = self.lock();
        state.parties += 1;
        state.phase
    }

    /// Arrive and block until every registered party has arrived. Returns the
    /// phase that was completed.
    pub fn arrive_and_await(&self) -> u64 {
        let mut state = self.lock();
        let phase = state.phase;
        state.arrived += 1;
        if state.arrived >= state.parties {
            state.advance();
            self.advanced.notify_all();
            return phase;
        }
        let _state = self
            .advanced
            .wait_while(state, |state| state.phase == phase)
            .unwrap_or_else(PoisonError::into_inner);
        phase
    }

    /// Leave without waiting. Releases the others if they were only waiting
    /// for this party.
    pub fn arrive_and_deregister(&self) {
        let mut state = self.lock();
        state.parties = state.parties.saturating_sub(1);
        if state.arrived > 0 && state.arrived >= state.parties {
            state.advance();
            self.advanced.notify_all();
        }
    }

    pub fn parties(&self) -> usize {
        self.lock().parties
    }

    pub fn phase(&self) -> u64 {
        self.lock().phase
    }
}
