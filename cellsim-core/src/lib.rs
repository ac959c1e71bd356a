//! Discrete-event simulator core for a cluster-scheduling research testbed
//! modeled after the Omega/Mesos family of architectures: a cooperative
//! virtual-time kernel, a shared resource ledger with two concurrency-control
//! styles (optimistic sequence numbers, pessimistic offer-based locking),
//! and the placement/fairness logic each style needs.
//!
//! This crate carries no workload trace loader, no CLI, and no statistics
//! dumper — see `cellsim-cli` for the thin driver that wires a scenario
//! together and runs it.

pub mod cellstate;
pub mod config;
pub mod mesos;
pub mod scheduler;
pub mod sim;
pub mod workload;

pub use cellstate::{CellState, CellStateError, ClaimDelta, CommitResult, ConflictMode, TransactionMode};
pub use mesos::{MesosAllocator, MesosError, MesosScheduler, Offer};
pub use scheduler::{BaseScheduler, OmegaScheduler};
pub use sim::{RunOutcome, SchedulerKind, Simulator};
pub use workload::{Job, Workload, WorkloadError};
