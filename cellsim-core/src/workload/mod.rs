//! Data-only job and workload containers.
//!
//! `Job` and `Workload` carry no scheduling logic of their own; they are the
//! mutable records a [`crate::scheduler`] or [`crate::mesos`] actor reads and
//! updates as it places tasks. Everything here is intentionally inert.

use std::collections::VecDeque;

use thiserror::Error;

/// A job submitted to the cell: a fixed number of identical tasks that must
/// each receive `cpus_per_task`/`mem_per_task` somewhere in the cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: u64,
    pub submitted_at: f64,
    pub workload_name: String,
    pub num_tasks: u32,
    pub cpus_per_task: f64,
    pub mem_per_task: f64,
    pub is_rigid: bool,

    pub task_duration: f64,
    pub unscheduled_tasks: u32,

    pub time_in_queue_till_first_scheduled: f64,
    pub time_in_queue_till_fully_scheduled: f64,
    pub last_enqueued: f64,
    pub last_scheduling_start_time: f64,
    pub num_scheduling_attempts: u32,
    pub num_task_scheduling_attempts: u64,
    pub useful_time_scheduling: f64,
    pub wasted_time_scheduling: f64,
}

impl Job {
    /// Construct a freshly-submitted job. `unscheduled_tasks` starts at
    /// `num_tasks`; every queue-time and attempt counter starts at zero.
    pub fn new(
        id: u64,
        submitted_at: f64,
        workload_name: impl Into<String>,
        num_tasks: u32,
        cpus_per_task: f64,
        mem_per_task: f64,
        task_duration: f64,
        is_rigid: bool,
    ) -> Self {
        Self {
            id,
            submitted_at,
            workload_name: workload_name.into(),
            num_tasks,
            cpus_per_task,
            mem_per_task,
            is_rigid,
            task_duration,
            unscheduled_tasks: num_tasks,
            time_in_queue_till_first_scheduled: 0.0,
            time_in_queue_till_fully_scheduled: 0.0,
            last_enqueued: submitted_at,
            last_scheduling_start_time: submitted_at,
            num_scheduling_attempts: 0,
            num_task_scheduling_attempts: 0,
            useful_time_scheduling: 0.0,
            wasted_time_scheduling: 0.0,
        }
    }

    /// Total CPU still required to finish placing every remaining task.
    pub fn cpus_still_needed(&self) -> f64 {
        self.cpus_per_task * self.unscheduled_tasks as f64
    }

    /// Total memory still required to finish placing every remaining task.
    pub fn mem_still_needed(&self) -> f64 {
        self.mem_per_task * self.unscheduled_tasks as f64
    }

    /// How many of this job's remaining tasks fit in `cpus_avail`/`mem_avail`,
    /// each first floor-rounded to a whole-task multiple. Zero availability
    /// in either dimension naturally floors to zero tasks.
    pub fn num_tasks_to_schedule(&self, cpus_avail: f64, mem_avail: f64) -> u32 {
        if self.cpus_per_task <= 0.0 || self.mem_per_task <= 0.0 {
            return 0;
        }
        let by_cpu = (cpus_avail / self.cpus_per_task).floor();
        let by_mem = (mem_avail / self.mem_per_task).floor();
        let by_cpu = if by_cpu.is_finite() && by_cpu > 0.0 { by_cpu as u32 } else { 0 };
        let by_mem = if by_mem.is_finite() && by_mem > 0.0 { by_mem as u32 } else { 0 };
        self.unscheduled_tasks.min(by_cpu).min(by_mem)
    }

    /// Fold the wait since this job was last (re-)enqueued into the
    /// queue-time accumulators, then reset the enqueue marker to `now`.
    /// Called exactly once, synchronously, at the moment a scheduler pulls
    /// the job off its pending queue to begin a scheduling cycle.
    pub fn update_time_in_queue_stats(&mut self, now: f64) {
        let waited = (now - self.last_enqueued).max(0.0);
        self.time_in_queue_till_fully_scheduled += waited;
        if self.num_scheduling_attempts == 0 {
            self.time_in_queue_till_first_scheduled += waited;
        }
        self.last_enqueued = now;
    }
}

/// Errors raised by [`Workload`] operations.
#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    #[error("job workload name {job_name:?} does not match workload {workload_name:?}")]
    NameMismatch { workload_name: String, job_name: String },
}

/// A named, insertion-order collection of [`Job`]s sharing one workload name.
#[derive(Debug, Clone)]
pub struct Workload {
    name: String,
    jobs: VecDeque<Job>,
}

impl Workload {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), jobs: VecDeque::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Append a job, enforcing that its `workload_name` matches this
    /// workload's name.
    pub fn add_job(&mut self, job: Job) -> Result<(), WorkloadError> {
        if job.workload_name != self.name {
            return Err(WorkloadError::NameMismatch {
                workload_name: self.name.clone(),
                job_name: job.workload_name,
            });
        }
        self.jobs.push_back(job);
        Ok(())
    }

    /// An independent copy: mutating the clone never affects `self`.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_tasks_to_schedule_floors_to_whole_tasks() {
        let job = Job::new(1, 0.0, "w", 10, 2.0, 3.0, 5.0, false);
        assert_eq!(job.num_tasks_to_schedule(7.0, 100.0), 3);
        assert_eq!(job.num_tasks_to_schedule(100.0, 7.0), 2);
        assert_eq!(job.num_tasks_to_schedule(0.0, 100.0), 0);
        assert_eq!(job.num_tasks_to_schedule(100.0, 0.0), 0);
    }

    #[test]
    fn num_tasks_to_schedule_caps_at_unscheduled() {
        let mut job = Job::new(1, 0.0, "w", 3, 1.0, 1.0, 5.0, false);
        job.unscheduled_tasks = 1;
        assert_eq!(job.num_tasks_to_schedule(100.0, 100.0), 1);
    }

    #[test]
    fn workload_rejects_name_mismatch() {
        let mut wl = Workload::new("w1");
        let job = Job::new(1, 0.0, "w2", 1, 1.0, 1.0, 1.0, false);
        assert_eq!(
            wl.add_job(job),
            Err(WorkloadError::NameMismatch {
                workload_name: "w1".into(),
                job_name: "w2".into(),
            })
        );
        assert!(wl.is_empty());
    }

    #[test]
    fn workload_deep_copy_is_independent() {
        let mut wl = Workload::new("w1");
        wl.add_job(Job::new(1, 0.0, "w1", 1, 1.0, 1.0, 1.0, false)).unwrap();
        let mut copy = wl.deep_copy();
        copy.add_job(Job::new(2, 0.0, "w1", 1, 1.0, 1.0, 1.0, false)).unwrap();
        assert_eq!(wl.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn update_time_in_queue_stats_accumulates_only_first_wait_into_first_scheduled() {
        let mut job = Job::new(1, 0.0, "w", 1, 1.0, 1.0, 1.0, false);
        job.update_time_in_queue_stats(5.0);
        assert_eq!(job.time_in_queue_till_first_scheduled, 5.0);
        assert_eq!(job.time_in_queue_till_fully_scheduled, 5.0);
        job.num_scheduling_attempts = 1;
        job.update_time_in_queue_stats(8.0);
        assert_eq!(job.time_in_queue_till_first_scheduled, 5.0);
        assert_eq!(job.time_in_queue_till_fully_scheduled, 8.0);
    }
}
