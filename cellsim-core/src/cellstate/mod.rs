//! The shared resource ledger: per-machine capacity accounting, per-scheduler
//! occupied/locked holdings, and the transactional `commit` protocol that
//! both concurrency-control styles race against.

mod delta;

pub use delta::ClaimDelta;

use std::collections::HashMap;

use thiserror::Error;

/// Slack tolerated on "is this free within what's held" checks, to absorb
/// floating-point accumulation across many small assign/free cycles.
pub const FREE_TOLERANCE: f64 = 1e-3;

/// How a [`CellState::commit`] decides whether a delta conflicts with the
/// current ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// Omega-style optimistic concurrency: a delta conflicts iff the
    /// machine's sequence number has moved since the delta was built.
    SequenceNumbers,
    /// Mesos-style: a delta conflicts iff the machine no longer has enough
    /// free capacity, regardless of who else has claimed it meanwhile.
    ResourceFit,
}

/// Whether a partially-conflicting batch of deltas commits incrementally or
/// is rolled back entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Any conflict rolls back every delta applied so far in this call.
    AllOrNothing,
    /// Non-conflicting deltas commit even when others in the same batch
    /// conflict.
    Incremental,
}

/// Errors raised by [`CellState`] operations. All of these are programmer
/// errors, not ordinary simulation outcomes: conflicts detected during
/// `commit` are data (see [`CommitResult`]), never an `Err`.
#[derive(Debug, Error, PartialEq)]
pub enum CellStateError {
    #[error("invalid cell-state configuration: {0}")]
    InvalidConfig(String),
    #[error("machine {0} does not exist in this cell")]
    NoSuchMachine(u32),
    #[error("assigning {cpus} cpu / {mem} mem to machine {machine} would overcommit it")]
    Overcommit { machine: u32, cpus: f64, mem: f64 },
    #[error("scheduler {0:?} holds nothing on machine {1}")]
    NotHolding(String, u32),
    #[error("scheduler {scheduler:?} tried to free more than it holds on machine {machine}")]
    Underfree { scheduler: String, machine: u32 },
}

/// The outcome of [`CellState::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitResult {
    /// Deltas that were applied and remain in effect.
    pub committed: Vec<ClaimDelta>,
    /// Deltas that conflicted (including, under `AllOrNothing`, any delta
    /// that was applied and then rolled back, and any delta left
    /// unevaluated once the batch was abandoned).
    pub conflicted: Vec<ClaimDelta>,
    /// Populated only when `commit` was called with `schedule_end_event =
    /// true`: the committed deltas for which the caller should arrange a
    /// `duration`-delayed release. `CellState` has no event queue of its
    /// own (see DESIGN.md), so scheduling the actual release event is the
    /// caller's responsibility; this field exists so the caller never has
    /// to re-derive which deltas need one.
    pub pending_ends: Vec<ClaimDelta>,
}

/// The shared, per-cell resource ledger.
#[derive(Debug, Clone)]
pub struct CellState {
    num_machines: u32,
    cpus_per_machine: f64,
    mem_per_machine: f64,
    conflict_mode: ConflictMode,
    transaction_mode: TransactionMode,

    allocated_cpus: Vec<f64>,
    allocated_mem: Vec<f64>,
    machine_seq_num: Vec<u32>,

    occupied_cpus: HashMap<String, f64>,
    occupied_mem: HashMap<String, f64>,
    locked_cpus: HashMap<String, f64>,
    locked_mem: HashMap<String, f64>,

    total_occupied_cpus: f64,
    total_occupied_mem: f64,
    total_locked_cpus: f64,
    total_locked_mem: f64,
}

impl CellState {
    pub fn new(
        num_machines: u32,
        cpus_per_machine: f64,
        mem_per_machine: f64,
        conflict_mode: ConflictMode,
        transaction_mode: TransactionMode,
    ) -> Result<Self, CellStateError> {
        if num_machines == 0 {
            return Err(CellStateError::InvalidConfig("num_machines must be > 0".into()));
        }
        if cpus_per_machine <= 0.0 {
            return Err(CellStateError::InvalidConfig("cpus_per_machine must be > 0".into()));
        }
        if mem_per_machine <= 0.0 {
            return Err(CellStateError::InvalidConfig("mem_per_machine must be > 0".into()));
        }
        Ok(Self {
            num_machines,
            cpus_per_machine,
            mem_per_machine,
            conflict_mode,
            transaction_mode,
            allocated_cpus: vec![0.0; num_machines as usize],
            allocated_mem: vec![0.0; num_machines as usize],
            machine_seq_num: vec![0; num_machines as usize],
            occupied_cpus: HashMap::new(),
            occupied_mem: HashMap::new(),
            locked_cpus: HashMap::new(),
            locked_mem: HashMap::new(),
            total_occupied_cpus: 0.0,
            total_occupied_mem: 0.0,
            total_locked_cpus: 0.0,
            total_locked_mem: 0.0,
        })
    }

    pub fn num_machines(&self) -> u32 {
        self.num_machines
    }

    pub fn conflict_mode(&self) -> ConflictMode {
        self.conflict_mode
    }

    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    pub fn total_cpus(&self) -> f64 {
        self.num_machines as f64 * self.cpus_per_machine
    }

    pub fn total_mem(&self) -> f64 {
        self.num_machines as f64 * self.mem_per_machine
    }

    pub fn total_occupied_cpus(&self) -> f64 {
        self.total_occupied_cpus
    }

    pub fn total_occupied_mem(&self) -> f64 {
        self.total_occupied_mem
    }

    pub fn total_locked_cpus(&self) -> f64 {
        self.total_locked_cpus
    }

    pub fn total_locked_mem(&self) -> f64 {
        self.total_locked_mem
    }

    pub fn available_cpus(&self) -> f64 {
        self.total_cpus() - self.total_occupied_cpus - self.total_locked_cpus
    }

    pub fn available_mem(&self) -> f64 {
        self.total_mem() - self.total_occupied_mem - self.total_locked_mem
    }

    pub fn occupied_cpus_for(&self, scheduler: &str) -> f64 {
        *self.occupied_cpus.get(scheduler).unwrap_or(&0.0)
    }

    pub fn occupied_mem_for(&self, scheduler: &str) -> f64 {
        *self.occupied_mem.get(scheduler).unwrap_or(&0.0)
    }

    fn check_machine(&self, machine_id: u32) -> Result<usize, CellStateError> {
        if machine_id >= self.num_machines {
            return Err(CellStateError::NoSuchMachine(machine_id));
        }
        Ok(machine_id as usize)
    }

    pub fn available_cpus_on(&self, machine_id: u32) -> Result<f64, CellStateError> {
        let m = self.check_machine(machine_id)?;
        Ok(self.cpus_per_machine - self.allocated_cpus[m])
    }

    pub fn available_mem_on(&self, machine_id: u32) -> Result<f64, CellStateError> {
        let m = self.check_machine(machine_id)?;
        Ok(self.mem_per_machine - self.allocated_mem[m])
    }

    pub fn current_machine_seq_num(&self, machine_id: u32) -> u32 {
        self.machine_seq_num.get(machine_id as usize).copied().unwrap_or(0)
    }

    /// Fraction of each machine's CPU/mem currently occupied or locked, for
    /// reporting only.
    pub fn utilization(&self) -> Vec<(f64, f64)> {
        (0..self.num_machines as usize)
            .map(|m| (self.allocated_cpus[m] / self.cpus_per_machine, self.allocated_mem[m] / self.mem_per_machine))
            .collect()
    }

    /// Reserve `cpus`/`mem` on `machine_id` for `scheduler`, as locked (held
    /// for an in-flight offer) or occupied (backing a running task).
    /// Capacity is validated before any field is mutated, so a failed call
    /// leaves `self` byte-for-byte unchanged (the "recommended" resolution
    /// of the aggregate-vs-machine-check ordering question; see DESIGN.md).
    pub fn assign_resources(
        &mut self,
        scheduler: &str,
        machine_id: u32,
        cpus: f64,
        mem: f64,
        locked: bool,
    ) -> Result<(), CellStateError> {
        let m = self.check_machine(machine_id)?;
        if self.allocated_cpus[m] + cpus > self.cpus_per_machine + FREE_TOLERANCE
            || self.allocated_mem[m] + mem > self.mem_per_machine + FREE_TOLERANCE
        {
            return Err(CellStateError::Overcommit { machine: machine_id, cpus, mem });
        }

        self.allocated_cpus[m] += cpus;
        self.allocated_mem[m] += mem;

        if locked {
            *self.locked_cpus.entry(scheduler.to_string()).or_insert(0.0) += cpus;
            *self.locked_mem.entry(scheduler.to_string()).or_insert(0.0) += mem;
            self.total_locked_cpus += cpus;
            self.total_locked_mem += mem;
        } else {
            *self.occupied_cpus.entry(scheduler.to_string()).or_insert(0.0) += cpus;
            *self.occupied_mem.entry(scheduler.to_string()).or_insert(0.0) += mem;
            self.total_occupied_cpus += cpus;
            self.total_occupied_mem += mem;
        }
        Ok(())
    }

    /// Release `cpus`/`mem` on `machine_id` previously held by `scheduler`.
    pub fn free_resources(
        &mut self,
        scheduler: &str,
        machine_id: u32,
        cpus: f64,
        mem: f64,
        locked: bool,
    ) -> Result<(), CellStateError> {
        let m = self.check_machine(machine_id)?;
        let (cpu_map, mem_map, total_cpu, total_mem) = if locked {
            (&mut self.locked_cpus, &mut self.locked_mem, &mut self.total_locked_cpus, &mut self.total_locked_mem)
        } else {
            (&mut self.occupied_cpus, &mut self.occupied_mem, &mut self.total_occupied_cpus, &mut self.total_occupied_mem)
        };

        let held_cpus = *cpu_map.get(scheduler).ok_or_else(|| CellStateError::NotHolding(scheduler.to_string(), machine_id))?;
        let held_mem = mem_map.get(scheduler).copied().unwrap_or(0.0);
        if held_cpus + FREE_TOLERANCE < cpus || held_mem + FREE_TOLERANCE < mem {
            return Err(CellStateError::Underfree { scheduler: scheduler.to_string(), machine: machine_id });
        }

        let new_cpus = (held_cpus - cpus).max(0.0);
        let new_mem = (held_mem - mem).max(0.0);
        cpu_map.insert(scheduler.to_string(), new_cpus);
        mem_map.insert(scheduler.to_string(), new_mem);
        *total_cpu -= cpus;
        *total_mem -= mem;

        self.allocated_cpus[m] = (self.allocated_cpus[m] - cpus).max(0.0);
        self.allocated_mem[m] = (self.allocated_mem[m] - mem).max(0.0);
        Ok(())
    }

    /// Called only from [`ClaimDelta::apply`] on a successful non-locked
    /// assign. Never called from `free_resources`: sequence numbers are a
    /// one-way counter of non-locked applies, not a generation count that
    /// round-trips with frees.
    pub(crate) fn increment_machine_seq_num(&mut self, machine_id: u32) -> Result<(), CellStateError> {
        let m = self.check_machine(machine_id)?;
        self.machine_seq_num[m] = self.machine_seq_num[m].wrapping_add(1);
        Ok(())
    }

    /// Undo exactly one `increment_machine_seq_num` bump. Called only from
    /// `commit`'s `AllOrNothing` rollback path: unlike an ordinary
    /// `unapply`, a rolled-back commit must leave every field `apply`
    /// touched — including the sequence number — back where it started, or
    /// the rollback is observable and breaks the sequence-number invariant.
    pub(crate) fn decrement_machine_seq_num(&mut self, machine_id: u32) -> Result<(), CellStateError> {
        let m = self.check_machine(machine_id)?;
        self.machine_seq_num[m] = self.machine_seq_num[m].wrapping_sub(1);
        Ok(())
    }

    fn causes_conflict(&self, delta: &ClaimDelta) -> bool {
        match self.conflict_mode {
            ConflictMode::SequenceNumbers => delta.machine_seq_num != self.current_machine_seq_num(delta.machine_id),
            ConflictMode::ResourceFit => {
                let avail_cpus = self.available_cpus_on(delta.machine_id).unwrap_or(0.0);
                let avail_mem = self.available_mem_on(delta.machine_id).unwrap_or(0.0);
                avail_cpus + FREE_TOLERANCE < delta.cpus || avail_mem + FREE_TOLERANCE < delta.mem
            }
        }
    }

    /// The central transactional entry point: apply every non-conflicting
    /// delta, report the rest as conflicted, and (under `AllOrNothing`) roll
    /// everything back the instant any delta conflicts.
    pub fn commit(&mut self, deltas: Vec<ClaimDelta>, schedule_end_event: bool) -> CommitResult {
        let mut applied: Vec<ClaimDelta> = Vec::new();
        let mut conflicted: Vec<ClaimDelta> = Vec::new();
        let mut iter = deltas.into_iter();

        while let Some(d) = iter.next() {
            if self.causes_conflict(&d) {
                conflicted.push(d);
                if self.transaction_mode == TransactionMode::AllOrNothing {
                    // The rest of the batch was never evaluated once the
                    // transaction broke; it still reports as conflicted.
                    conflicted.extend(iter);
                    for a in applied.into_iter().rev() {
                        a.unapply(self, false).expect("rolling back a delta this call just applied cannot fail");
                        self.decrement_machine_seq_num(a.machine_id)
                            .expect("rolling back a delta on a machine this call already validated cannot fail");
                        conflicted.push(a);
                    }
                    return CommitResult { committed: Vec::new(), conflicted, pending_ends: Vec::new() };
                }
            } else {
                d.apply(self, false).expect("a delta that does not conflict must be applicable");
                applied.push(d);
            }
        }

        let pending_ends = if schedule_end_event { applied.clone() } else { Vec::new() };
        CommitResult { committed: applied, conflicted, pending_ends }
    }

    /// An independent snapshot: mutating the clone never affects `self`.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Check the invariants of spec §8 that must hold after every
    /// completed event. Intended for tests and debug assertions, not the
    /// hot path.
    #[cfg(any(test, feature = "invariant-checks"))]
    pub fn check_invariants(&self) {
        for m in 0..self.num_machines as usize {
            assert!(self.allocated_cpus[m] >= -FREE_TOLERANCE && self.allocated_cpus[m] <= self.cpus_per_machine + FREE_TOLERANCE);
            assert!(self.allocated_mem[m] >= -FREE_TOLERANCE && self.allocated_mem[m] <= self.mem_per_machine + FREE_TOLERANCE);
        }
        let sum_occupied_cpus: f64 = self.occupied_cpus.values().sum();
        let sum_locked_cpus: f64 = self.locked_cpus.values().sum();
        let sum_occupied_mem: f64 = self.occupied_mem.values().sum();
        let sum_locked_mem: f64 = self.locked_mem.values().sum();
        assert!((sum_occupied_cpus - self.total_occupied_cpus).abs() < 1e-6);
        assert!((sum_locked_cpus - self.total_locked_cpus).abs() < 1e-6);
        assert!((sum_occupied_mem - self.total_occupied_mem).abs() < 1e-6);
        assert!((sum_locked_mem - self.total_locked_mem).abs() < 1e-6);

        let sum_allocated_cpus: f64 = self.allocated_cpus.iter().sum();
        let sum_allocated_mem: f64 = self.allocated_mem.iter().sum();
        assert!((sum_allocated_cpus - (self.total_occupied_cpus + self.total_locked_cpus)).abs() < 1e-6);
        assert!((sum_allocated_mem - (self.total_occupied_mem + self.total_locked_mem)).abs() < 1e-6);
        assert!(self.available_cpus() >= -FREE_TOLERANCE);
        assert!(self.available_mem() >= -FREE_TOLERANCE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(mode: ConflictMode, tx: TransactionMode) -> CellState {
        CellState::new(1, 100.0, 100.0, mode, tx).unwrap()
    }

    #[test]
    fn rejects_bad_config() {
        assert!(CellState::new(0, 100.0, 100.0, ConflictMode::ResourceFit, TransactionMode::Incremental).is_err());
        assert!(CellState::new(1, 0.0, 100.0, ConflictMode::ResourceFit, TransactionMode::Incremental).is_err());
    }

    #[test]
    fn assign_then_free_round_trips_exactly() {
        let mut cs = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);
        let d = ClaimDelta::new("o1", 0, 0, 5.0, 20.0, 20.0);
        d.apply(&mut cs, false).unwrap();
        assert_eq!(cs.current_machine_seq_num(0), 1);
        d.unapply(&mut cs, false).unwrap();
        assert_eq!(cs.available_cpus_on(0).unwrap(), 100.0);
        assert_eq!(cs.available_mem_on(0).unwrap(), 100.0);
        // seq num is never decremented by unapply.
        assert_eq!(cs.current_machine_seq_num(0), 1);
        cs.check_invariants();
    }

    #[test]
    fn overcommit_is_rejected_without_mutation() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        let before = cs.clone();
        let err = cs.assign_resources("o1", 0, 150.0, 10.0, false).unwrap_err();
        assert!(matches!(err, CellStateError::Overcommit { .. }));
        assert_eq!(format!("{:?}", cs.allocated_cpus), format!("{:?}", before.allocated_cpus));
        assert_eq!(cs.total_occupied_cpus, before.total_occupied_cpus);
    }

    #[test]
    fn no_such_machine_is_rejected() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        assert_eq!(cs.assign_resources("o1", 5, 1.0, 1.0, false), Err(CellStateError::NoSuchMachine(5)));
    }

    #[test]
    fn free_without_holding_fails() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        assert_eq!(cs.free_resources("o1", 0, 1.0, 1.0, false), Err(CellStateError::NotHolding("o1".into(), 0)));
    }

    #[test]
    fn underfree_is_rejected() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        cs.assign_resources("o1", 0, 10.0, 10.0, false).unwrap();
        let err = cs.free_resources("o1", 0, 20.0, 10.0, false).unwrap_err();
        assert!(matches!(err, CellStateError::Underfree { .. }));
    }

    #[test]
    fn sequence_number_conflict_detection() {
        let mut cs = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);
        let d1 = ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 10.0);
        let d2 = ClaimDelta::new("o2", 0, 0, 5.0, 10.0, 10.0);
        let r1 = cs.commit(vec![d1], true);
        assert_eq!(r1.committed.len(), 1);
        assert!(r1.conflicted.is_empty());
        assert_eq!(cs.current_machine_seq_num(0), 1);

        let r2 = cs.commit(vec![d2], true);
        assert!(r2.committed.is_empty());
        assert_eq!(r2.conflicted.len(), 1);
    }

    #[test]
    fn all_or_nothing_rollback_leaves_state_untouched() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::AllOrNothing);
        let before = cs.clone();
        let deltas = vec![
            ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 10.0),
            ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 200.0), // conflicts: insufficient mem
            ClaimDelta::new("o1", 0, 0, 5.0, 5.0, 5.0),
        ];
        let result = cs.commit(deltas, true);
        assert!(result.committed.is_empty());
        assert_eq!(result.conflicted.len(), 3);
        assert_eq!(cs.total_occupied_cpus, before.total_occupied_cpus);
        assert_eq!(cs.total_occupied_mem, before.total_occupied_mem);
        assert_eq!(cs.current_machine_seq_num(0), before.current_machine_seq_num(0));
    }

    #[test]
    fn all_or_nothing_rollback_restores_sequence_number() {
        // The first delta applies cleanly (bumping seq num 0 -> 1), then the
        // second, built against the now-stale seq num 0, conflicts and
        // forces a rollback of the whole batch. The rollback must undo the
        // seq-num bump along with everything else `apply` touched.
        let mut cs = cell(ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing);
        let deltas = vec![
            ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 10.0),
            ClaimDelta::new("o2", 0, 0, 5.0, 10.0, 10.0),
        ];
        let result = cs.commit(deltas, true);
        assert!(result.committed.is_empty());
        assert_eq!(result.conflicted.len(), 2);
        assert_eq!(cs.current_machine_seq_num(0), 0);

        // And the restored seq num is exactly what a fresh delta must match.
        let retry = ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 10.0);
        let retry_result = cs.commit(vec![retry], true);
        assert_eq!(retry_result.committed.len(), 1);
    }

    #[test]
    fn incremental_commits_only_non_conflicting_deltas() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        let deltas = vec![
            ClaimDelta::new("o1", 0, 0, 5.0, 10.0, 10.0),
            ClaimDelta::new("o1", 0, 0, 5.0, 1000.0, 1000.0), // conflicts
            ClaimDelta::new("o1", 0, 0, 5.0, 5.0, 5.0),
        ];
        let result = cs.commit(deltas, true);
        assert_eq!(result.committed.len(), 2);
        assert_eq!(result.conflicted.len(), 1);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut cs = cell(ConflictMode::ResourceFit, TransactionMode::Incremental);
        let mut copy = cs.deep_copy();
        copy.assign_resources("o1", 0, 10.0, 10.0, false).unwrap();
        assert_eq!(cs.available_cpus_on(0).unwrap(), 100.0);
        assert_eq!(copy.available_cpus_on(0).unwrap(), 90.0);
        cs.assign_resources("o2", 0, 5.0, 5.0, false).unwrap();
        assert_eq!(cs.available_cpus_on(0).unwrap(), 95.0);
    }
}
