//! A single proposed reservation and its apply/unapply primitives.

use super::{CellState, CellStateError};

/// A proposed reservation of `cpus`/`mem` for `duration` virtual-time units
/// on one machine, tagged with the scheduler's belief about that machine's
/// sequence number at the time the delta was built.
///
/// `ClaimDelta` carries no "locked" flag of its own: whoever applies or
/// unapplies a delta decides, at that call, whether it affects the locked or
/// the occupied accounts of [`CellState`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDelta {
    pub scheduler: String,
    pub machine_id: u32,
    pub machine_seq_num: u32,
    pub duration: f64,
    pub cpus: f64,
    pub mem: f64,
}

impl ClaimDelta {
    pub fn new(
        scheduler: impl Into<String>,
        machine_id: u32,
        machine_seq_num: u32,
        duration: f64,
        cpus: f64,
        mem: f64,
    ) -> Self {
        Self { scheduler: scheduler.into(), machine_id, machine_seq_num, duration, cpus, mem }
    }

    /// Reserve this delta's resources against `cell`. Non-locked applies
    /// additionally bump the target machine's sequence number; locked
    /// applies (Mesos offer locks) never do, since the sequence-number
    /// invariant counts only non-locked applies.
    pub fn apply(&self, cell: &mut CellState, locked: bool) -> Result<(), CellStateError> {
        cell.assign_resources(&self.scheduler, self.machine_id, self.cpus, self.mem, locked)?;
        if !locked {
            cell.increment_machine_seq_num(self.machine_id)?;
        }
        Ok(())
    }

    /// Release this delta's resources. Never touches the sequence number:
    /// apply/unapply of the same delta restores the per-machine arrays
    /// exactly, but the sequence number is a one-way counter.
    pub fn unapply(&self, cell: &mut CellState, locked: bool) -> Result<(), CellStateError> {
        cell.free_resources(&self.scheduler, self.machine_id, self.cpus, self.mem, locked)
    }
}
