//! The deletion scheduler: one runner per world, walking regions in lockstep.

pub mod barrier;
pub mod cancel;
pub mod runner;
pub mod stats;

pub use barrier::Rendezvous;
pub use cancel::CancelToken;
pub use runner::{CycleListener, DeletionContext, DeletionRunner};
pub use stats::{RunSnapshot, RunState, RunStats};
