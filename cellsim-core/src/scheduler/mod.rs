//! Scheduler actors: shared queueing/placement logic plus the
//! optimistic-commit Omega style.

pub mod base;
pub mod omega;

pub use base::{BaseScheduler, SchedulingState};
pub use omega::{OmegaScheduler, OmegaStepOutcome, OmegaThinkPlan};
