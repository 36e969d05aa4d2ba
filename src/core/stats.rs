//! Aggregate and time-indexed run statistics.
//!
//! Everything here is plain data, read-only after a run; the reporting
//! layer consumes it, the engine only appends.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::core::state::Ticks;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeStats {
    pub completed: u64,
    pub turnaround: Vec<Ticks>,
    pub wait: Vec<Ticks>,
    pub preemptions: Vec<u64>,
    /// Completions recorded per timestamp: the throughput curve.
    pub throughput: BTreeMap<Ticks, u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub per_type: FxHashMap<String, TypeStats>,
    /// (timestamp, event queue length, ready queue length) per step.
    pub queue_lens: Vec<(Ticks, usize, usize)>,
    pub processes_completed: u64,
}

impl SimStats {
    pub fn record_completion(
        &mut self,
        kind: &str,
        now: Ticks,
        turnaround: Ticks,
        wait: Ticks,
        preemptions: u64,
    ) {
        let entry = self.per_type.entry(kind.to_string()).or_default();
        entry.completed += 1;
        entry.turnaround.push(turnaround);
        entry.wait.push(wait);
        entry.preemptions.push(preemptions);
        *entry.throughput.entry(now).or_insert(0) += 1;
        self.processes_completed += 1;
    }

    pub fn record_queue_lens(&mut self, now: Ticks, events: usize, ready: usize) {
        self.queue_lens.push((now, events, ready));
    }
}
