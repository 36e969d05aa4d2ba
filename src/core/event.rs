use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::state::{Pid, Ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Submitted,
    Dispatched,
    Terminated,
    QuantumExpired,
    IoRequested,
    IoCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub t: Ticks,
    pub pid: Pid,
}

// Heap entry carrying the explicit ordering key: timestamp ascending, ties
// broken by insertion sequence so equal-time events pop FIFO.
#[derive(Debug)]
struct Scheduled {
    t: Ticks,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.t == other.t && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

// BinaryHeap is a max-heap, so the key ordering is reversed
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.t, other.seq).cmp(&(self.t, self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event priority queue: earliest timestamp first, FIFO within a
/// timestamp.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            t: event.t,
            seq,
            event,
        });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|s| s.event)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|s| &s.event)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
