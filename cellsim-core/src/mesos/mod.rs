//! The pessimistic, offer-based allocator style (spec §4.5): a central
//! allocator DRF-sorts requesters, locks resources for the winner, and
//! hands them back as a one-shot [`Offer`].

use std::collections::HashMap;

use thiserror::Error;

use crate::cellstate::{CellState, ClaimDelta};
use crate::scheduler::base::BaseScheduler;
use crate::workload::Job;

/// Errors raised by the Mesos allocator/scheduler side.
#[derive(Debug, Error, PartialEq)]
pub enum MesosError {
    #[error("invalid mesos configuration: {0}")]
    InvalidConfig(String),
    #[error("offer {0} response produced a conflict under resource-fit locking")]
    ProtocolViolation(u64),
}

/// A one-shot handle an allocator hands to the scheduler it chose, carrying
/// the resources that scheduler may claim.
#[derive(Debug, Clone)]
pub struct Offer {
    pub id: u64,
    pub scheduler: String,
    /// The shared ledger as it stood just before this offer's resources
    /// were locked; informational only (DRF accounting, logging), not
    /// re-consulted for placement — the locked `deltas` already describe
    /// exactly what the scheduler may claim.
    pub cell_state_snapshot: CellState,
    pub deltas: Vec<ClaimDelta>,
}

struct OfferRecord {
    scheduler: String,
    deltas: Vec<ClaimDelta>,
    task_counts: Vec<(u64, u32)>,
}

/// `Unscheduled` / `Pending` per spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferBuildState {
    Unscheduled,
    Pending,
}

/// The Mesos-side scheduler: queueing and think-time bookkeeping are
/// identical to Omega's ([`BaseScheduler`]); the placement decision is
/// driven entirely by the allocator handing it resources, not by its own
/// snapshot-and-commit loop.
#[derive(Debug, Clone)]
pub struct MesosScheduler {
    pub base: BaseScheduler,
}

impl MesosScheduler {
    pub fn new(name: impl Into<String>, num_machines_to_blacklist: u32) -> Self {
        Self { base: BaseScheduler::new(name, num_machines_to_blacklist) }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    /// Enqueue a newly-submitted job. Unlike Omega, a Mesos scheduler has no
    /// think-delayed cycle of its own to kick off: it always asks the
    /// allocator for an offer, which coalesces concurrent requests into one
    /// batch.
    pub fn submit(&mut self, mut job: Job, now: f64) {
        job.update_time_in_queue_stats(now);
        self.base.enqueue(job);
    }
}

/// Central allocator: DRF candidate selection, batched offer building, and
/// the lock/commit/unlock protocol around each offer.
#[derive(Debug, Clone)]
pub struct MesosAllocator {
    requesters: Vec<String>,
    next_offer_id: u64,
    offered: HashMap<u64, OfferRecord>,
    build_state: OfferBuildState,

    pub constant_think_time: f64,
    pub min_cpu_offer: f64,
    pub min_mem_offer: f64,
    pub offer_batch_interval: f64,
    pub time_spent_allocating: f64,
}

impl MesosAllocator {
    pub fn new(
        constant_think_time: f64,
        min_cpu_offer: f64,
        min_mem_offer: f64,
        offer_batch_interval: f64,
    ) -> Result<Self, MesosError> {
        if constant_think_time < 0.0 {
            return Err(MesosError::InvalidConfig("constant_think_time must be >= 0".into()));
        }
        if offer_batch_interval < 0.0 {
            return Err(MesosError::InvalidConfig("offer_batch_interval must be >= 0".into()));
        }
        Ok(Self {
            requesters: Vec::new(),
            next_offer_id: 0,
            offered: HashMap::new(),
            build_state: OfferBuildState::Unscheduled,
            constant_think_time,
            min_cpu_offer,
            min_mem_offer,
            offer_batch_interval,
            time_spent_allocating: 0.0,
        })
    }

    /// Mesos requires `ResourceFit` conflict detection; enforce this once at
    /// wiring time.
    pub fn validate_cell(&self, cell: &CellState) -> Result<(), MesosError> {
        if cell.conflict_mode() != crate::cellstate::ConflictMode::ResourceFit {
            return Err(MesosError::InvalidConfig("mesos allocator requires ResourceFit conflict mode".into()));
        }
        Ok(())
    }

    /// Add `scheduler` to the requester set. Returns `true` the first time a
    /// build is not already pending, so the caller schedules the batched
    /// `build_and_send_offer` after `offer_batch_interval` — repeat calls
    /// within the same batch window coalesce into the flag already being set.
    pub fn request_offer(&mut self, scheduler: impl Into<String>) -> bool {
        let scheduler = scheduler.into();
        if !self.requesters.contains(&scheduler) {
            self.requesters.push(scheduler);
        }
        self.mark_build_pending_if_idle()
    }

    pub fn cancel_offer_request(&mut self, scheduler: &str) {
        self.requesters.retain(|s| s != scheduler);
    }

    /// `true` the first time a build isn't already pending, meaning the
    /// caller must actually schedule `build_and_send_offer` after
    /// `offer_batch_interval`. `pub(crate)` so `Simulator` can re-enter the
    /// batch state machine itself from a task-end event (spec §4.5 step 3),
    /// not only from `request_offer`/`respond_to_offer`.
    pub(crate) fn mark_build_pending_if_idle(&mut self) -> bool {
        if self.build_state == OfferBuildState::Unscheduled {
            self.build_state = OfferBuildState::Pending;
            true
        } else {
            false
        }
    }

    /// DRF-sort the requester set and pick the lowest dominant share,
    /// without mutating anything. `None` when there is no eligible
    /// candidate (empty set, or insufficient available resources to make
    /// an offer worthwhile).
    pub fn choose_candidate(&self, shared: &CellState) -> Option<String> {
        if self.requesters.is_empty() {
            return None;
        }
        if shared.available_cpus() < self.min_cpu_offer || shared.available_mem() < self.min_mem_offer {
            return None;
        }
        let mut ranked = self.requesters.clone();
        let total_cpus = shared.total_cpus();
        let total_mem = shared.total_mem();
        ranked.sort_by(|a, b| dominant_share(a, shared, total_cpus, total_mem).total_cmp(&dominant_share(b, shared, total_cpus, total_mem)));
        ranked.into_iter().next()
    }

    /// Clear the pending-build flag; called at the moment a scheduled batch
    /// build actually fires.
    pub fn clear_build_pending(&mut self) {
        self.build_state = OfferBuildState::Unscheduled;
    }

    /// Lock as much of `shared`'s available capacity as `candidate`'s
    /// pending jobs can use, FIFO over its queue, stopping at the first job
    /// that cannot be fully satisfied. Removes `candidate_name` from the
    /// requester set regardless of outcome — a served (or found-wanting)
    /// candidate must ask again to be reconsidered.
    pub fn lock_for_candidate(
        &mut self,
        candidate_name: &str,
        candidate: &mut MesosScheduler,
        shared: &mut CellState,
    ) -> Option<Offer> {
        self.requesters.retain(|s| s != candidate_name);

        let snapshot = shared.deep_copy();
        let mut scratch = shared.deep_copy();
        let mut deltas = Vec::new();
        let mut task_counts = Vec::new();

        for job in candidate.base.iter_pending() {
            let job_deltas = candidate.base.schedule_job(job, &mut scratch);
            let tasks_placed = tasks_in(&job_deltas, job.cpus_per_task);
            if tasks_placed == 0 {
                break;
            }
            deltas.extend(job_deltas);
            task_counts.push((job.id, tasks_placed));
            if tasks_placed < job.unscheduled_tasks {
                break;
            }
        }

        if deltas.is_empty() {
            return None;
        }

        for d in &deltas {
            d.apply(shared, true).expect("capacity already validated against the scratch copy");
        }

        let offer_id = self.next_offer_id;
        self.next_offer_id += 1;
        self.offered.insert(
            offer_id,
            OfferRecord { scheduler: candidate_name.to_string(), deltas: deltas.clone(), task_counts },
        );
        self.time_spent_allocating += self.constant_think_time;

        Some(Offer { id: offer_id, scheduler: candidate_name.to_string(), cell_state_snapshot: snapshot, deltas })
    }

    /// Accept the full locked offer on the scheduler's behalf: unlock it,
    /// commit it for real (non-locked), and fold the task-count bookkeeping
    /// into the scheduler's own pending-job queue. Returns the committed
    /// deltas so the caller can schedule their end-of-duration release —
    /// mirrors [`crate::cellstate::CommitResult::pending_ends`] since this
    /// commit is made with `schedule_end_event = false` (the allocator, not
    /// `CellState`, owns when the release event gets enqueued here).
    pub fn respond_to_offer(
        &mut self,
        offer_id: u64,
        candidate: &mut MesosScheduler,
        shared: &mut CellState,
    ) -> Result<RespondOutcome, MesosError> {
        let record = self.offered.remove(&offer_id).ok_or(MesosError::ProtocolViolation(offer_id))?;
        debug_assert_eq!(record.scheduler, candidate.name());

        for d in &record.deltas {
            d.unapply(shared, true).expect("unlocking a delta this offer itself locked cannot fail");
        }

        let result = shared.commit(record.deltas.clone(), false);
        if !result.conflicted.is_empty() {
            return Err(MesosError::ProtocolViolation(offer_id));
        }

        candidate.base.apply_task_counts(&record.task_counts);
        let should_schedule_build = self.mark_build_pending_if_idle();
        Ok(RespondOutcome { pending_ends: result.committed, should_schedule_build })
    }
}

/// Outcome of [`MesosAllocator::respond_to_offer`].
#[derive(Debug)]
pub struct RespondOutcome {
    pub pending_ends: Vec<ClaimDelta>,
    pub should_schedule_build: bool,
}

fn dominant_share(name: &str, shared: &CellState, total_cpus: f64, total_mem: f64) -> f64 {
    let cpu_share = if total_cpus > 0.0 { shared.occupied_cpus_for(name) / total_cpus } else { 0.0 };
    let mem_share = if total_mem > 0.0 { shared.occupied_mem_for(name) / total_mem } else { 0.0 };
    cpu_share.max(mem_share)
}

fn tasks_in(deltas: &[ClaimDelta], cpus_per_task: f64) -> u32 {
    if cpus_per_task <= 0.0 {
        return 0;
    }
    deltas.iter().map(|d| (d.cpus / cpus_per_task).round() as u32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellstate::{ConflictMode, TransactionMode};

    fn cell(cpus: f64, mem: f64) -> CellState {
        CellState::new(1, cpus, mem, ConflictMode::ResourceFit, TransactionMode::Incremental).unwrap()
    }

    #[test]
    fn validate_cell_rejects_sequence_number_mode() {
        let alloc = MesosAllocator::new(1.0, 0.0, 0.0, 1.0).unwrap();
        let seq_cell = CellState::new(1, 10.0, 10.0, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing).unwrap();
        assert!(alloc.validate_cell(&seq_cell).is_err());
    }

    #[test]
    fn choose_candidate_picks_lowest_dominant_share() {
        let mut shared = cell(100.0, 100.0);
        shared.assign_resources("o1", 0, 40.0, 0.0, false).unwrap();
        shared.assign_resources("o2", 0, 10.0, 0.0, false).unwrap();
        let mut alloc = MesosAllocator::new(0.0, 0.0, 0.0, 1.0).unwrap();
        alloc.request_offer("o1");
        alloc.request_offer("o2");
        assert_eq!(alloc.choose_candidate(&shared), Some("o2".to_string()));
    }

    #[test]
    fn choose_candidate_respects_minimum_offer_thresholds() {
        let shared = cell(50.0, 50.0);
        let mut alloc = MesosAllocator::new(0.0, 100.0, 100.0, 1.0).unwrap();
        alloc.request_offer("o1");
        assert_eq!(alloc.choose_candidate(&shared), None);
    }

    #[test]
    fn lock_and_respond_round_trip_commits_and_frees_job() {
        let mut shared = cell(100.0, 100.0);
        let mut alloc = MesosAllocator::new(1.0, 0.0, 0.0, 1.0).unwrap();
        let mut sched = MesosScheduler::new("o1", 0);
        sched.submit(Job::new(1, 0.0, "w", 2, 10.0, 10.0, 5.0, false), 0.0);
        alloc.request_offer("o1");

        let offer = alloc.lock_for_candidate("o1", &mut sched, &mut shared).unwrap();
        assert_eq!(shared.available_cpus(), 80.0); // locked, not occupied, but still unavailable
        assert_eq!(sched.base.iter_pending().count(), 1); // job bookkeeping deferred to respond

        let outcome = alloc.respond_to_offer(offer.id, &mut sched, &mut shared).unwrap();
        assert_eq!(outcome.pending_ends.len(), 1);
        assert_eq!(shared.available_cpus(), 80.0); // now occupied instead of locked
        assert_eq!(sched.base.iter_pending().count(), 0); // job fully placed and dropped
    }

    #[test]
    fn lock_for_candidate_removes_it_from_requesters_even_with_nothing_to_offer() {
        let mut shared = cell(100.0, 100.0);
        let mut alloc = MesosAllocator::new(1.0, 0.0, 0.0, 1.0).unwrap();
        let mut sched = MesosScheduler::new("o1", 0); // no pending jobs
        alloc.request_offer("o1");
        assert!(alloc.lock_for_candidate("o1", &mut sched, &mut shared).is_none());
        assert_eq!(alloc.choose_candidate(&shared), None);
    }
}
