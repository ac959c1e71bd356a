//! The discrete-event kernel: a min-heap event queue and the `Simulator`
//! that drains it.

mod queue;
mod simulator;

pub use simulator::{RunOutcome, SchedulerKind, Simulator};
