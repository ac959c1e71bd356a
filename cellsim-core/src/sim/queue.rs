//! Min-heap of `(virtual_time, sequence, action)`, earliest time first,
//! ties broken by insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Simulator;

/// A single queued continuation. `action` captures by value everything it
/// needs (job, delta, scheduler name) rather than borrowing — spec §9's
/// "Event closures" note.
pub struct ScheduledEvent {
    pub time: f64,
    seq: u64,
    pub action: Box<dyn FnOnce(&mut Simulator) + 'static>,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    /// Reversed so `BinaryHeap` (a max-heap) pops the earliest time first,
    /// and among equal times, the lowest sequence number (FIFO) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue on virtual time. Not itself `pub` outside `sim`: owned
/// exclusively by [`Simulator`].
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_seq: 0 }
    }

    pub fn push(&mut self, time: f64, action: Box<dyn FnOnce(&mut Simulator) + 'static>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, action });
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
