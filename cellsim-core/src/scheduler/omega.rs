//! The optimistic, private-snapshot scheduler style.
//!
//! `OmegaScheduler` never touches the event queue directly; it hands back
//! small plan/outcome values that [`crate::sim::Simulator`] turns into
//! scheduled callbacks. This keeps every cell-state mutation explicit at the
//! call site instead of behind a back-pointer into the simulator.

use std::collections::HashMap;

use crate::cellstate::CellState;
use crate::scheduler::base::{BaseScheduler, SchedulingState};
use crate::workload::Job;

/// A job has been pulled off the queue and is ready to "think": holds the
/// private snapshot it will plan against and the delay before the plan is
/// evaluated.
#[derive(Debug)]
pub struct OmegaThinkPlan {
    pub job: Job,
    pub private_snapshot: CellState,
    pub think_time: f64,
}

/// What the simulator should do once a think-delayed plan has been
/// evaluated against the shared ledger.
#[derive(Debug)]
pub struct OmegaStepOutcome {
    /// `Some((job, delay))` when the job still has unscheduled tasks and
    /// should be resubmitted after `delay` virtual-time units.
    pub requeue: Option<(Job, f64)>,
    /// Whether the scheduler's own pending queue still has work, i.e.
    /// whether the simulator should begin another cycle at this same tick.
    pub continue_cycle: bool,
}

const ABANDON_AFTER_FULL_FAILURE_ATTEMPTS: u32 = 100;
const ABANDON_AFTER_ANY_ATTEMPTS: u32 = 1000;
const RETRY_DELAY: f64 = 1.0;

/// Private-snapshot, optimistic-commit scheduler (spec §4.4).
#[derive(Debug, Clone)]
pub struct OmegaScheduler {
    pub base: BaseScheduler,
    per_day_successful: HashMap<u64, u64>,
    per_day_failed: HashMap<u64, u64>,
}

impl OmegaScheduler {
    pub fn new(name: impl Into<String>, num_machines_to_blacklist: u32) -> Self {
        Self {
            base: BaseScheduler::new(name, num_machines_to_blacklist),
            per_day_successful: HashMap::new(),
            per_day_failed: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn per_day_successful(&self, day: u64) -> u64 {
        self.per_day_successful.get(&day).copied().unwrap_or(0)
    }

    pub fn per_day_failed(&self, day: u64) -> u64 {
        self.per_day_failed.get(&day).copied().unwrap_or(0)
    }

    /// Accept a newly-submitted (or retried) job: fold queue-wait stats,
    /// enqueue it, and report whether the scheduler was idle — the
    /// simulator should begin a new cycle exactly when this returns `true`.
    pub fn submit(&mut self, mut job: Job, now: f64) -> bool {
        job.update_time_in_queue_stats(now);
        let was_idle = self.base.is_idle();
        self.base.enqueue(job);
        if was_idle {
            self.base.state = SchedulingState::Thinking;
        }
        was_idle
    }

    /// Pop the next pending job and snapshot the shared ledger for it to
    /// plan against. Returns `None` if the queue is empty (the caller then
    /// goes back to `Idle`).
    pub fn start_next_job(&mut self, shared_cell: &CellState, now: f64) -> Option<OmegaThinkPlan> {
        let mut job = self.base.pop_next()?;
        job.last_scheduling_start_time = now;
        let think_time = self.base.think_time(&job);
        Some(OmegaThinkPlan { job, private_snapshot: shared_cell.deep_copy(), think_time })
    }

    /// Evaluate a previously-started plan against the real shared ledger:
    /// place tasks against the private snapshot, commit the resulting
    /// deltas, and update every counter spec §4.4 and §4.3 name.
    pub fn finish_think(
        &mut self,
        mut job: Job,
        mut private_snapshot: CellState,
        shared_cell: &mut CellState,
        now: f64,
        think_time: f64,
    ) -> OmegaStepOutcome {
        job.num_scheduling_attempts += 1;
        job.num_task_scheduling_attempts += job.unscheduled_tasks as u64;

        let deltas = self.base.schedule_job(&job, &mut private_snapshot);
        if deltas.is_empty() {
            self.base.num_no_resources_found_scheduling_attempts += 1;
            self.base.record_wasted_time_scheduling(&mut job, think_time);
        } else {
            let result = shared_cell.commit(deltas, true);
            let committed_tasks = tasks_in(&result.committed, job.cpus_per_task);
            let conflicted_tasks = tasks_in(&result.conflicted, job.cpus_per_task);
            job.unscheduled_tasks = job.unscheduled_tasks.saturating_sub(committed_tasks);

            if !result.committed.is_empty() {
                self.base.num_successful_transactions += 1;
                self.base.num_successful_task_transactions += committed_tasks as u64;
            }
            if !result.conflicted.is_empty() {
                self.base.num_failed_transactions += 1;
                self.base.num_failed_task_transactions += conflicted_tasks as u64;
            }
            if job.num_scheduling_attempts > 1 {
                self.base.num_retried_transactions += 1;
            }

            if result.conflicted.is_empty() {
                self.base.record_useful_time_scheduling(&mut job, think_time);
            } else {
                self.base.record_wasted_time_scheduling(&mut job, think_time);
            }

            let day = (now / 86400.0).floor() as u64;
            if result.conflicted.is_empty() {
                *self.per_day_successful.entry(day).or_insert(0) += 1;
            } else {
                *self.per_day_failed.entry(day).or_insert(0) += 1;
            }
        }

        let requeue = if job.unscheduled_tasks > 0 {
            let fully_unscheduled = job.unscheduled_tasks == job.num_tasks;
            let abandon = (job.num_scheduling_attempts > ABANDON_AFTER_FULL_FAILURE_ATTEMPTS && fully_unscheduled)
                || job.num_scheduling_attempts > ABANDON_AFTER_ANY_ATTEMPTS;
            if abandon {
                self.base.num_jobs_timed_out_scheduling += 1;
                None
            } else {
                Some((job, RETRY_DELAY))
            }
        } else {
            None
        };

        let continue_cycle = self.base.pending_len() > 0;
        if !continue_cycle {
            self.base.state = SchedulingState::Idle;
        }
        OmegaStepOutcome { requeue, continue_cycle }
    }
}

fn tasks_in(deltas: &[crate::cellstate::ClaimDelta], cpus_per_task: f64) -> u32 {
    if cpus_per_task <= 0.0 {
        return 0;
    }
    deltas.iter().map(|d| (d.cpus / cpus_per_task).round() as u32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellstate::{ConflictMode, TransactionMode};

    fn cell(machines: u32, cpus: f64, mem: f64) -> CellState {
        CellState::new(machines, cpus, mem, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing).unwrap()
    }

    #[test]
    fn submit_reports_idle_transition_only_once() {
        let mut sched = OmegaScheduler::new("o1", 0);
        let j1 = Job::new(1, 0.0, "w", 1, 1.0, 1.0, 1.0, false);
        let j2 = Job::new(2, 0.0, "w", 1, 1.0, 1.0, 1.0, false);
        assert!(sched.submit(j1, 0.0));
        assert!(!sched.submit(j2, 0.0));
    }

    #[test]
    fn single_job_fits_commits_and_frees_job_unscheduled_tasks() {
        let mut sched = OmegaScheduler::new("o1", 0);
        let mut shared = cell(1, 100.0, 100.0);
        let job = Job::new(1, 0.0, "w", 2, 10.0, 10.0, 5.0, false);
        sched.submit(job, 0.0);
        let plan = sched.start_next_job(&shared, 0.0).unwrap();
        let outcome = sched.finish_think(plan.job, plan.private_snapshot, &mut shared, 0.0, plan.think_time);
        assert!(outcome.requeue.is_none());
        assert_eq!(shared.current_machine_seq_num(0), 1);
        assert_eq!(sched.base.num_successful_transactions, 1);
        assert_eq!(shared.available_cpus(), 80.0);
    }

    #[test]
    fn second_scheduler_to_commit_against_a_stale_snapshot_conflicts() {
        let mut o1 = OmegaScheduler::new("o1", 0);
        let mut o2 = OmegaScheduler::new("o2", 0);
        let mut shared = cell(1, 100.0, 100.0);

        let job1 = Job::new(1, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
        let job2 = Job::new(2, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
        o1.submit(job1, 0.0);
        o2.submit(job2, 0.0);
        // Both plans snapshot the shared ledger while its seq num is still 0.
        let plan1 = o1.start_next_job(&shared, 0.0).unwrap();
        let plan2 = o2.start_next_job(&shared, 0.0).unwrap();

        let outcome1 = o1.finish_think(plan1.job, plan1.private_snapshot, &mut shared, 1.0, plan1.think_time);
        assert!(outcome1.requeue.is_none());
        assert_eq!(shared.current_machine_seq_num(0), 1);
        assert_eq!(o1.base.num_successful_transactions, 1);

        let outcome2 = o2.finish_think(plan2.job, plan2.private_snapshot, &mut shared, 1.0, plan2.think_time);
        assert_eq!(o2.base.num_failed_transactions, 1);
        assert_eq!(o2.base.num_successful_transactions, 0);
        assert!(outcome2.requeue.is_some());
    }

    #[test]
    fn abandons_after_full_failure_threshold() {
        let mut sched = OmegaScheduler::new("o1", 0);
        let mut shared = cell(1, 1.0, 1.0); // too small for the job ever to fit
        let job = Job::new(1, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
        sched.submit(job, 0.0);
        let mut plan = sched.start_next_job(&shared, 0.0).unwrap();
        for _ in 0..=ABANDON_AFTER_FULL_FAILURE_ATTEMPTS {
            let outcome = sched.finish_think(plan.job, plan.private_snapshot, &mut shared, 0.0, 0.0);
            match outcome.requeue {
                Some((job, _delay)) => {
                    plan = OmegaThinkPlan { job, private_snapshot: shared.deep_copy(), think_time: 0.0 };
                }
                None => {
                    assert_eq!(sched.base.num_jobs_timed_out_scheduling, 1);
                    return;
                }
            }
        }
        panic!("job was never abandoned");
    }
}
