//! Shared queueing, think-time, and first-fit placement logic used by every
//! scheduler style.

use std::collections::{HashMap, VecDeque};

use crate::cellstate::{CellState, ClaimDelta};
use crate::workload::Job;

/// `Idle` / `Thinking` per spec §4.6: a scheduler has at most one
/// think-delayed continuation in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingState {
    Idle,
    Thinking,
}

/// The queueing, think-time, and first-fit placement behavior common to
/// [`crate::scheduler::omega::OmegaScheduler`] and the Mesos scheduler side
/// in [`crate::mesos`]. Neither subtype inherits by trait object; they each
/// hold a `BaseScheduler` and delegate to it, matching the corpus's
/// composition-over-trait-object style for small stateful helpers.
#[derive(Debug, Clone)]
pub struct BaseScheduler {
    pub name: String,
    pub constant_think_time: HashMap<String, f64>,
    pub per_task_think_time: HashMap<String, f64>,
    pub num_machines_to_blacklist: u32,

    pending: VecDeque<Job>,
    pub state: SchedulingState,

    pub num_successful_transactions: u64,
    pub num_failed_transactions: u64,
    pub num_successful_task_transactions: u64,
    pub num_failed_task_transactions: u64,
    pub num_retried_transactions: u64,
    pub num_no_resources_found_scheduling_attempts: u64,
    pub num_jobs_timed_out_scheduling: u64,
    pub useful_time_scheduling: f64,
    pub wasted_time_scheduling: f64,
}

impl BaseScheduler {
    pub fn new(name: impl Into<String>, num_machines_to_blacklist: u32) -> Self {
        Self {
            name: name.into(),
            constant_think_time: HashMap::new(),
            per_task_think_time: HashMap::new(),
            num_machines_to_blacklist,
            pending: VecDeque::new(),
            state: SchedulingState::Idle,
            num_successful_transactions: 0,
            num_failed_transactions: 0,
            num_successful_task_transactions: 0,
            num_failed_task_transactions: 0,
            num_retried_transactions: 0,
            num_no_resources_found_scheduling_attempts: 0,
            num_jobs_timed_out_scheduling: 0,
            useful_time_scheduling: 0.0,
            wasted_time_scheduling: 0.0,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.state == SchedulingState::Idle
    }

    pub fn enqueue(&mut self, job: Job) {
        self.pending.push_back(job);
    }

    pub fn pop_next(&mut self) -> Option<Job> {
        self.pending.pop_front()
    }

    pub fn requeue_front(&mut self, job: Job) {
        self.pending.push_front(job);
    }

    pub fn iter_pending(&self) -> impl Iterator<Item = &Job> {
        self.pending.iter()
    }

    /// Apply previously-computed `(job_id, tasks_placed)` bookkeeping,
    /// dropping any job that reaches zero unscheduled tasks. Used by the
    /// Mesos side, where the allocator's lock-time placement and the
    /// scheduler's own job-queue bookkeeping happen in two separate calls
    /// (see [`crate::mesos`]).
    pub fn apply_task_counts(&mut self, counts: &[(u64, u32)]) {
        for (job_id, tasks) in counts {
            if let Some(job) = self.pending.iter_mut().find(|j| j.id == *job_id) {
                job.unscheduled_tasks = job.unscheduled_tasks.saturating_sub(*tasks);
            }
        }
        self.pending.retain(|j| j.unscheduled_tasks > 0);
    }

    /// `constant[wl] + perTask[wl] * unscheduledTasks`, both defaulting to 0.
    pub fn think_time(&self, job: &Job) -> f64 {
        let constant = self.constant_think_time.get(&job.workload_name).copied().unwrap_or(0.0);
        let per_task = self.per_task_think_time.get(&job.workload_name).copied().unwrap_or(0.0);
        constant + per_task * job.unscheduled_tasks as f64
    }

    /// First-fit placement over machines `0 .. numMachines - numMachinesToBlackList`.
    /// Each delta is applied to `cell` immediately (non-locked) so later
    /// machines in the same call see reduced availability; the caller owns
    /// committing (or discarding) this private view against the shared
    /// ledger.
    pub fn schedule_job(&self, job: &Job, cell: &mut CellState) -> Vec<ClaimDelta> {
        let mut deltas = Vec::new();
        let mut already_planned: u32 = 0;
        let usable_machines = cell.num_machines().saturating_sub(self.num_machines_to_blacklist);

        for machine in 0..usable_machines {
            if already_planned >= job.unscheduled_tasks {
                break;
            }
            let avail_cpus = cell.available_cpus_on(machine).unwrap_or(0.0);
            let avail_mem = cell.available_mem_on(machine).unwrap_or(0.0);
            let mut k = job.num_tasks_to_schedule(avail_cpus, avail_mem);
            k = k.min(job.unscheduled_tasks - already_planned);
            if k == 0 {
                continue;
            }

            let cpus = k as f64 * job.cpus_per_task;
            let mem = k as f64 * job.mem_per_task;
            let seq = cell.current_machine_seq_num(machine);
            let delta = ClaimDelta::new(self.name.clone(), machine, seq, job.task_duration, cpus, mem);
            delta.apply(cell, false).expect("first-fit candidate already validated against available capacity");
            already_planned += k;
            deltas.push(delta);
        }
        deltas
    }

    pub fn record_useful_time_scheduling(&mut self, job: &mut Job, think_time: f64) {
        self.useful_time_scheduling += think_time;
        job.useful_time_scheduling += think_time;
    }

    pub fn record_wasted_time_scheduling(&mut self, job: &mut Job, think_time: f64) {
        self.wasted_time_scheduling += think_time;
        job.wasted_time_scheduling += think_time;
    }
}
