//! The cooperative event-loop kernel (spec §4.1) plus the dispatch glue that
//! turns each scheduler style's plans into scheduled callbacks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cellstate::CellState;
use crate::mesos::{MesosAllocator, MesosError, MesosScheduler, Offer};
use crate::scheduler::OmegaScheduler;
use crate::workload::Job;

use super::queue::EventQueue;

/// Either scheduler style, dispatched by name. Kept as an enum rather than
/// a trait object so the simulator can match on it and reach into the
/// concrete type's own methods without a `dyn Any` downcast.
pub enum SchedulerKind {
    Omega(OmegaScheduler),
    Mesos(MesosScheduler),
}

impl SchedulerKind {
    pub fn name(&self) -> &str {
        match self {
            SchedulerKind::Omega(s) => s.name(),
            SchedulerKind::Mesos(s) => s.name(),
        }
    }
}

/// Result of [`Simulator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    TimedOut,
}

/// Drives virtual time by draining the event queue. Owns `CellState`, the
/// event queue, and the scheduler/allocator registry directly; every
/// scheduled closure receives `&mut Simulator` fresh at dispatch time, so
/// nothing holds a back-pointer into the simulator across a suspension
/// point (spec §9).
pub struct Simulator {
    current_time: f64,
    queue: EventQueue,
    cell_state: CellState,
    schedulers: HashMap<String, SchedulerKind>,
    mesos_allocator: Option<MesosAllocator>,
    logging: bool,
    log_buffer: Vec<String>,
    events_processed: u64,
    last_run_wall_clock: Duration,
}

impl Simulator {
    pub fn new(cell_state: CellState, logging: bool) -> Self {
        Self {
            current_time: 0.0,
            queue: EventQueue::new(),
            cell_state,
            schedulers: HashMap::new(),
            mesos_allocator: None,
            logging,
            log_buffer: Vec::new(),
            events_processed: 0,
            last_run_wall_clock: Duration::ZERO,
        }
    }

    pub fn with_mesos_allocator(mut self, allocator: MesosAllocator) -> Result<Self, MesosError> {
        allocator.validate_cell(&self.cell_state)?;
        self.mesos_allocator = Some(allocator);
        Ok(self)
    }

    pub fn register_omega_scheduler(&mut self, scheduler: OmegaScheduler) {
        self.schedulers.insert(scheduler.name().to_string(), SchedulerKind::Omega(scheduler));
    }

    pub fn register_mesos_scheduler(&mut self, scheduler: MesosScheduler) {
        self.schedulers.insert(scheduler.name().to_string(), SchedulerKind::Mesos(scheduler));
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn cell_state(&self) -> &CellState {
        &self.cell_state
    }

    pub fn scheduler(&self, name: &str) -> Option<&SchedulerKind> {
        self.schedulers.get(name)
    }

    pub fn event_count(&self) -> u64 {
        self.events_processed
    }

    pub fn elapsed_wall_clock(&self) -> Duration {
        self.last_run_wall_clock
    }

    pub fn log_buffer(&self) -> &[String] {
        &self.log_buffer
    }

    /// Append `"<current_time> <msg>"` to the in-memory buffer when logging
    /// is enabled, and always emit a structured `tracing` event so a real
    /// run can pipe to any subscriber regardless of the buffer toggle.
    pub fn log(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::debug!(current_time = self.current_time, "{}", msg);
        if self.logging {
            self.log_buffer.push(format!("{} {}", self.current_time, msg));
        }
    }

    /// Enqueue `action` to fire at `current_time + delay`. `delay = 0` runs
    /// after every event already pending at `current_time`, never before.
    pub fn after_delay(&mut self, delay: f64, action: impl FnOnce(&mut Simulator) + 'static) {
        debug_assert!(delay >= 0.0, "after_delay requires a non-negative delay");
        let time = self.current_time + delay;
        self.queue.push(time, Box::new(action));
    }

    /// Drain the event queue in order. Stops when the queue empties, when
    /// the next event's time exceeds `max_virtual_time`, or when wall-clock
    /// elapsed exceeds `wall_clock_timeout`.
    pub fn run(&mut self, max_virtual_time: Option<f64>, wall_clock_timeout: Option<Duration>) -> RunOutcome {
        let start = Instant::now();
        let outcome = loop {
            if let Some(timeout) = wall_clock_timeout {
                if start.elapsed() >= timeout {
                    break RunOutcome::TimedOut;
                }
            }
            let Some(event) = self.queue.pop() else {
                break RunOutcome::Completed;
            };
            if let Some(max) = max_virtual_time {
                if event.time > max {
                    break RunOutcome::Completed;
                }
            }
            self.current_time = event.time;
            self.events_processed += 1;
            (event.action)(self);
        };
        self.last_run_wall_clock = start.elapsed();
        outcome
    }

    /// Entry point a workload driver calls at a job's submission time
    /// (typically itself scheduled via `after_delay`): route the job to the
    /// named scheduler and kick off whatever cycle that style requires.
    pub fn submit_job(&mut self, scheduler_name: &str, job: Job) {
        let now = self.current_time;
        let Some(mut kind) = self.schedulers.remove(scheduler_name) else {
            self.log(format!("submit_job: no such scheduler {scheduler_name:?}"));
            return;
        };
        match &mut kind {
            SchedulerKind::Omega(omega) => {
                let was_idle = omega.submit(job, now);
                self.schedulers.insert(scheduler_name.to_string(), kind);
                if was_idle {
                    self.begin_omega_cycle(scheduler_name.to_string());
                }
            }
            SchedulerKind::Mesos(mesos) => {
                mesos.submit(job, now);
                self.schedulers.insert(scheduler_name.to_string(), kind);
                self.request_mesos_offer(scheduler_name.to_string());
            }
        }
    }

    fn begin_omega_cycle(&mut self, scheduler_name: String) {
        let Some(mut kind) = self.schedulers.remove(&scheduler_name) else { return };
        let plan = if let SchedulerKind::Omega(omega) = &mut kind {
            let now = self.current_time;
            omega.start_next_job(&self.cell_state, now)
        } else {
            None
        };
        self.schedulers.insert(scheduler_name.clone(), kind);

        if let Some(plan) = plan {
            let name = scheduler_name;
            let think_time = plan.think_time;
            self.after_delay(think_time, move |sim: &mut Simulator| {
                sim.finish_omega_think(name, plan.job, plan.private_snapshot, think_time);
            });
        }
    }

    fn finish_omega_think(&mut self, scheduler_name: String, job: Job, private_snapshot: CellState, think_time: f64) {
        let now = self.current_time;
        let Some(mut kind) = self.schedulers.remove(&scheduler_name) else { return };
        let outcome = if let SchedulerKind::Omega(omega) = &mut kind {
            Some(omega.finish_think(job, private_snapshot, &mut self.cell_state, now, think_time))
        } else {
            None
        };
        self.schedulers.insert(scheduler_name.clone(), kind);

        let Some(outcome) = outcome else { return };
        if let Some((job, delay)) = outcome.requeue {
            let name = scheduler_name.clone();
            self.after_delay(delay, move |sim: &mut Simulator| sim.submit_job(&name, job));
        }
        if outcome.continue_cycle {
            self.after_delay(0.0, move |sim: &mut Simulator| sim.begin_omega_cycle(scheduler_name));
        }
    }

    fn request_mesos_offer(&mut self, scheduler_name: String) {
        let Some(allocator) = self.mesos_allocator.as_mut() else { return };
        let should_schedule = allocator.request_offer(scheduler_name);
        if should_schedule {
            let interval = allocator.offer_batch_interval;
            self.after_delay(interval, |sim: &mut Simulator| sim.build_and_send_offer());
        }
    }

    /// Re-enter the offer-batch state machine: mark a build pending (if one
    /// isn't already) and schedule it after `offer_batch_interval`. Spec
    /// §4.5 step 3 requires this after every delta's release, not only
    /// after a fresh request or a response, so a requester that found the
    /// cell full when it asked still gets a fresh batch once capacity frees.
    fn schedule_offer_build_if_idle(&mut self) {
        let Some(allocator) = self.mesos_allocator.as_mut() else { return };
        if allocator.mark_build_pending_if_idle() {
            let interval = allocator.offer_batch_interval;
            self.after_delay(interval, |sim: &mut Simulator| sim.build_and_send_offer());
        }
    }

    pub fn cancel_mesos_offer_request(&mut self, scheduler_name: &str) {
        if let Some(allocator) = self.mesos_allocator.as_mut() {
            allocator.cancel_offer_request(scheduler_name);
        }
    }

    fn build_and_send_offer(&mut self) {
        let candidate_name = {
            let Some(allocator) = self.mesos_allocator.as_mut() else { return };
            allocator.clear_build_pending();
            match allocator.choose_candidate(&self.cell_state) {
                Some(name) => name,
                None => return,
            }
        };

        let Some(mut kind) = self.schedulers.remove(&candidate_name) else { return };
        let offer_and_think = if let SchedulerKind::Mesos(mesos) = &mut kind {
            let allocator = self.mesos_allocator.as_mut().expect("validated above");
            allocator
                .lock_for_candidate(&candidate_name, mesos, &mut self.cell_state)
                .map(|offer| (offer, allocator.constant_think_time))
        } else {
            None
        };
        self.schedulers.insert(candidate_name.clone(), kind);

        if let Some((offer, think_time)) = offer_and_think {
            let name = candidate_name;
            self.after_delay(think_time, move |sim: &mut Simulator| sim.deliver_mesos_offer(name, offer));
        }
    }

    /// Hands the offer to the scheduler it was built for. The scheduler
    /// always fully accepts its own offer (see DESIGN.md): the envelope was
    /// already sized to exactly what its pending jobs can use when the
    /// allocator locked it, so there is no separate partial-acceptance
    /// decision to model.
    fn deliver_mesos_offer(&mut self, scheduler_name: String, offer: Offer) {
        let offer_id = offer.id;
        self.respond_to_mesos_offer(scheduler_name, offer_id);
    }

    fn respond_to_mesos_offer(&mut self, scheduler_name: String, offer_id: u64) {
        let Some(mut kind) = self.schedulers.remove(&scheduler_name) else { return };
        let response = if let SchedulerKind::Mesos(mesos) = &mut kind {
            let cell_state = &mut self.cell_state;
            self.mesos_allocator.as_mut().map(|allocator| allocator.respond_to_offer(offer_id, mesos, cell_state))
        } else {
            None
        };
        self.schedulers.insert(scheduler_name.clone(), kind);

        match response {
            Some(Ok(outcome)) => {
                for delta in outcome.pending_ends {
                    let duration = delta.duration;
                    self.after_delay(duration, move |sim: &mut Simulator| {
                        delta
                            .unapply(&mut sim.cell_state, false)
                            .expect("releasing a delta this run itself committed cannot fail");
                        // Spec §4.5 step 3: every end-event re-triggers the
                        // batch trigger after releasing its delta, so a
                        // requester that found the cell full earlier gets a
                        // fresh chance now that capacity just freed.
                        sim.schedule_offer_build_if_idle();
                    });
                }
                if outcome.should_schedule_build {
                    if let Some(interval) = self.mesos_allocator.as_ref().map(|a| a.offer_batch_interval) {
                        self.after_delay(interval, |sim: &mut Simulator| sim.build_and_send_offer());
                    }
                }
            }
            Some(Err(err)) => {
                // Per spec §7 these are programmer errors: a locked,
                // resource-fit-validated offer must commit cleanly.
                panic!("mesos protocol violation responding to offer {offer_id}: {err}");
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellstate::{ConflictMode, TransactionMode};

    fn new_sim(cpus: f64, mem: f64) -> Simulator {
        let cell = CellState::new(1, cpus, mem, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing).unwrap();
        Simulator::new(cell, true)
    }

    #[test]
    fn equal_time_events_run_in_fifo_order() {
        let mut sim = new_sim(100.0, 100.0);
        sim.after_delay(1.0, |sim| sim.log("first"));
        sim.after_delay(1.0, |sim| sim.log("second"));
        sim.run(None, None);
        assert_eq!(sim.log_buffer(), &["1 first".to_string(), "1 second".to_string()]);
    }

    #[test]
    fn delay_zero_runs_strictly_after_the_enqueuing_event() {
        let mut sim = new_sim(100.0, 100.0);
        sim.after_delay(0.0, |sim| {
            sim.log("outer");
            sim.after_delay(0.0, |sim| sim.log("inner"));
        });
        sim.run(None, None);
        assert_eq!(sim.log_buffer(), &["0 outer".to_string(), "0 inner".to_string()]);
    }

    #[test]
    fn run_stops_at_max_virtual_time() {
        let mut sim = new_sim(100.0, 100.0);
        sim.after_delay(1.0, |sim| sim.log("in range"));
        sim.after_delay(10.0, |sim| sim.log("out of range"));
        let outcome = sim.run(Some(5.0), None);
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(sim.log_buffer(), &["1 in range".to_string()]);
    }

    #[test]
    fn single_omega_job_fits_and_frees_after_duration() {
        let mut sim = new_sim(100.0, 100.0);
        sim.register_omega_scheduler(OmegaScheduler::new("o1", 0));
        let job = Job::new(1, 0.0, "w", 2, 10.0, 10.0, 5.0, false);
        sim.submit_job("o1", job);
        sim.run(None, None);
        assert_eq!(sim.cell_state().available_cpus(), 100.0);
        assert_eq!(sim.cell_state().current_machine_seq_num(0), 1);
        if let Some(SchedulerKind::Omega(o)) = sim.scheduler("o1") {
            assert_eq!(o.base.num_successful_transactions, 1);
        } else {
            panic!("expected omega scheduler");
        }
    }

    #[test]
    fn mesos_job_round_trips_through_allocator() {
        let cell = CellState::new(1, 100.0, 100.0, ConflictMode::ResourceFit, TransactionMode::Incremental).unwrap();
        let mut sim = Simulator::new(cell, true)
            .with_mesos_allocator(MesosAllocator::new(0.0, 0.0, 0.0, 1.0).unwrap())
            .unwrap();
        sim.register_mesos_scheduler(MesosScheduler::new("m1", 0));
        let job = Job::new(1, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
        sim.submit_job("m1", job);
        sim.run(Some(20.0), None);
        assert_eq!(sim.cell_state().available_cpus(), 100.0);
    }
}
