use std::collections::BTreeMap;

// Index into the engine's process table
pub type Pid = usize;
pub type CpuId = usize;
pub type Ticks = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Created, submission event not yet handled.
    New,
    /// Sitting in the ready queue, accruing wait time.
    Ready,
    /// In flight inside a pending dispatch event.
    Dispatching,
    /// Occupying a cpu.
    Running,
    /// Blocked until its io-complete event fires.
    IoWait,
    /// Terminated; demand is zero and no further events reference it.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub kind: String,
    pub pid: Pid,
    /// Total cpu time left before termination. Strictly decreasing over the
    /// process's life; zero exactly when the process is Done.
    pub demand: Ticks,
    /// Time left until the next io boundary (or termination). Never
    /// exceeds `demand`.
    pub cpu_current: Ticks,
    /// Original cpu burst length; `cpu_current` resets to this after io.
    pub burst_cpu: Ticks,
    /// None means this process never performs io.
    pub burst_io: Option<Ticks>,
    pub arrival_time: Ticks,
    /// Accrued only while in the ready queue.
    pub wait_time: Ticks,
    pub preemptions: u64,
    pub cpu: Option<CpuId>,
    /// Quantum granted at the last dispatch; None means run to the natural
    /// boundary without a timer.
    pub quantum: Option<Ticks>,
    /// Most recent granted quantum, kept as a policy feature.
    pub last_quantum: Ticks,
    pub state: ProcState,
}

/// One exclusive execution slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    pub id: CpuId,
    pub current: Option<Pid>,
    pub busy_time: Ticks,
    pub ctx_switch_time: Ticks,
    pub idle_time: Ticks,
    // Cumulative idle sampled at each clock advance; answers "idle accrued
    // between two timestamps" for reporting and as a learning feature.
    idle_log: BTreeMap<Ticks, Ticks>,
}

impl Cpu {
    pub fn new(id: CpuId) -> Self {
        let mut idle_log = BTreeMap::new();
        idle_log.insert(0, 0);
        Self {
            id,
            current: None,
            busy_time: 0,
            ctx_switch_time: 0,
            idle_time: 0,
            idle_log,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Charge the interval ending at `now` to busy or idle time.
    pub fn accrue(&mut self, elapsed: Ticks, now: Ticks) {
        if self.current.is_some() {
            self.busy_time += elapsed;
        } else {
            self.idle_time += elapsed;
        }
        self.idle_log.insert(now, self.idle_time);
    }

    fn idle_at(&self, t: Ticks) -> Ticks {
        self.idle_log
            .range(..=t)
            .next_back()
            .map(|(_, &idle)| idle)
            .unwrap_or(0)
    }

    /// Idle time accrued in the interval [from, to].
    pub fn idle_between(&self, from: Ticks, to: Ticks) -> Ticks {
        self.idle_at(to).saturating_sub(self.idle_at(from))
    }
}

/// Engine construction parameters, owned by the outer configuration layer.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time cost charged whenever a cpu's occupant changes.
    pub ctx_switch: Ticks,
    /// The run ends once simulated time reaches this.
    pub stop_time: Ticks,
    pub enable_io: bool,
    pub num_cpus: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ctx_switch: 0,
            stop_time: 100,
            enable_io: true,
            num_cpus: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_log_answers_interval_queries() {
        let mut cpu = Cpu::new(0);
        cpu.accrue(5, 5); // idle 0..5
        cpu.current = Some(0);
        cpu.accrue(3, 8); // busy 5..8
        cpu.current = None;
        cpu.accrue(4, 12); // idle 8..12

        assert_eq!(cpu.idle_time, 9);
        assert_eq!(cpu.busy_time, 3);
        assert_eq!(cpu.idle_between(0, 5), 5);
        assert_eq!(cpu.idle_between(5, 8), 0);
        assert_eq!(cpu.idle_between(5, 12), 4);
        assert_eq!(cpu.idle_between(0, 12), 9);
    }

    #[test]
    fn idle_between_uses_last_sample_at_or_before() {
        let mut cpu = Cpu::new(0);
        cpu.accrue(10, 10);
        // no sample at t=7; the query falls back to the sample at t=0
        assert_eq!(cpu.idle_between(7, 10), 10);
    }
}
