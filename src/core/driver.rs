//! The discrete-event scheduling engine.
//!
//! Owns the event queue, the FIFO ready queue, the cpu array, and the
//! process table; drives the submission -> dispatch -> (run | preempt |
//! io) -> termination state machine one event at a time. Each run owns a
//! fully isolated engine instance.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use super::event::{Event, EventKind, EventQueue};
use super::observer::Observer;
use super::state::{Cpu, CpuId, EngineConfig, Pid, ProcState, Process, Ticks};
use super::stats::SimStats;
use crate::error::SimError;
use crate::quantum::adaptive::{
    cpu_idle_key, F_BURST_IO, F_CPU_CURRENT, F_DEMAND, F_LAST_QUANTUM, F_TIME, F_TIME_IN_SYSTEM,
    F_WAIT_TIME, WARMUP,
};
use crate::quantum::{Features, QuantumPolicy};
use crate::rand48::Rand48;
use crate::workload::{ProcessFactory, WorkloadSpec};

// One observed transition: feature snapshots around the previous event
// plus the quantum that was in force.
struct Transition {
    pre: Features,
    action: Ticks,
    post: Features,
}

pub struct Engine<Q: QuantumPolicy> {
    pub cfg: EngineConfig,
    pub policy: Q,
    pub procs: Vec<Process>,
    pub cpus: Vec<Cpu>,
    pub stats: SimStats,
    factory: ProcessFactory,
    rng: Rand48,
    events: EventQueue,
    ready: VecDeque<Pid>,
    now: Ticks,
    t_last: Ticks,
    initialized: bool,
    observer: Observer,
    pending: Option<Transition>,
    // waits of processes that completed since the last policy observation
    recent_waits: Vec<Ticks>,
}

impl<Q: QuantumPolicy> Engine<Q> {
    pub fn new(cfg: EngineConfig, spec: WorkloadSpec, policy: Q, rng: Rand48) -> Self {
        assert!(cfg.num_cpus > 0, "simulation requires at least one cpu");
        let cpus = (0..cfg.num_cpus).map(Cpu::new).collect();
        Self {
            cfg,
            policy,
            procs: Vec::new(),
            cpus,
            stats: SimStats::default(),
            factory: ProcessFactory::new(spec),
            rng,
            events: EventQueue::new(),
            ready: VecDeque::new(),
            now: 0,
            t_last: 0,
            initialized: false,
            observer: Observer::new(),
            pending: None,
            recent_waits: Vec::new(),
        }
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Seed one process per declared type at arrival times 0..k-1 and
    /// enqueue their submission events. Calling this twice is a no-op.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        if self.initialized {
            warn!("system already initialized");
            return Ok(());
        }
        let names: Vec<String> = self.factory.spec().type_names().map(String::from).collect();
        for (i, name) in names.iter().enumerate() {
            let mut seed = self
                .factory
                .observe(&mut self.rng, name, 0, self.cfg.enable_io)?;
            seed.arrival_time = i as Ticks;
            let (pid, at) = (seed.pid, seed.arrival_time);
            debug_assert_eq!(pid, self.procs.len(), "pid must match table index");
            self.procs.push(seed);
            self.push(EventKind::Submitted, at, pid);
        }
        self.initialized = true;
        Ok(())
    }

    /// Handle the earliest event. Returns it, or None once the queue is
    /// drained.
    pub fn step(&mut self) -> Result<Option<Event>, SimError> {
        let Some(event) = self.events.pop() else {
            return Ok(None);
        };

        self.stats
            .record_queue_lens(event.t, self.events.len(), self.ready.len());
        self.advance_clock(event.t);
        trace!("t={} {:?} pid={}", self.now, event.kind, event.pid);

        // feed the previous event's transition to the learner, once past
        // the warm-up threshold
        if self.policy.adaptive() {
            let reward = self.reward();
            if let Some(tr) = self.pending.take() {
                if self.now > WARMUP {
                    self.policy.observe(&tr.pre, tr.action, Some(&tr.post), reward);
                }
            }
        }

        let pre = self.policy.adaptive().then(|| self.snapshot(event.pid));

        match event.kind {
            EventKind::Submitted => self.on_submitted(event.pid)?,
            EventKind::Dispatched => self.on_dispatched(event.pid),
            EventKind::Terminated => self.on_terminated(event.pid),
            EventKind::QuantumExpired => self.on_quantum_expired(event.pid),
            EventKind::IoRequested => self.on_io_requested(event.pid),
            EventKind::IoCompleted => self.on_io_completed(event.pid),
        }

        if let Some(pre) = pre {
            self.pending = Some(Transition {
                pre,
                action: self.procs[event.pid].last_quantum,
                post: self.snapshot(event.pid),
            });
        }

        self.observer.observe(&self.procs, &self.ready, &self.cpus);
        Ok(Some(event))
    }

    /// Run while simulated time is below `stop` and events remain.
    pub fn run_until(&mut self, stop: Ticks) -> Result<(), SimError> {
        while self.now < stop {
            if self.step()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<(), SimError> {
        self.run_until(self.cfg.stop_time)
    }

    // Move the clock forward (never backward) and charge the elapsed
    // interval: wait time to every queued process, busy/idle time to every
    // cpu.
    fn advance_clock(&mut self, to: Ticks) {
        let now = self.now.max(to);
        let elapsed = now - self.now;
        self.t_last = self.now;
        self.now = now;
        for &pid in &self.ready {
            self.procs[pid].wait_time += elapsed;
        }
        for cpu in &mut self.cpus {
            cpu.accrue(elapsed, now);
        }
    }

    /// The canonical idle-unit selection: lowest free id.
    fn idle_cpu(&self) -> Option<CpuId> {
        self.cpus.iter().find(|c| c.is_idle()).map(|c| c.id)
    }

    fn push(&mut self, kind: EventKind, t: Ticks, pid: Pid) {
        self.events.push(Event { kind, t, pid });
    }

    fn enqueue_ready(&mut self, pid: Pid) {
        self.procs[pid].state = ProcState::Ready;
        self.ready.push_back(pid);
    }

    fn dispatch(&mut self, pid: Pid) {
        self.procs[pid].state = ProcState::Dispatching;
        self.push(EventKind::Dispatched, self.now, pid);
    }

    fn release_cpu(&mut self, pid: Pid) {
        if let Some(cpu) = self.procs[pid].cpu.take() {
            self.cpus[cpu].current = None;
        }
    }

    // A process enters the system. If a cpu is free, dispatch the ready
    // queue's head (or the arrival itself when the queue is empty; the
    // queue keeps strict FIFO fairness). Either way, ask the factory for
    // this type's next arrival.
    fn on_submitted(&mut self, pid: Pid) -> Result<(), SimError> {
        if self.idle_cpu().is_some() {
            let target = match self.ready.pop_front() {
                None => pid,
                Some(head) => {
                    self.enqueue_ready(pid);
                    head
                }
            };
            self.dispatch(target);
        } else {
            self.enqueue_ready(pid);
        }

        let kind = self.procs[pid].kind.clone();
        let next = self
            .factory
            .observe(&mut self.rng, &kind, self.now, self.cfg.enable_io)?;
        let (npid, at) = (next.pid, next.arrival_time);
        debug_assert_eq!(npid, self.procs.len(), "pid must match table index");
        self.procs.push(next);
        self.push(EventKind::Submitted, at, npid);
        Ok(())
    }

    // A process moves onto a cpu. Guarded: if every cpu has since been
    // occupied, the dispatch is stale and the process just rejoins the
    // ready queue.
    fn on_dispatched(&mut self, pid: Pid) {
        let Some(cpu) = self.idle_cpu() else {
            debug!("stale dispatch of pid={pid}, re-queued");
            self.enqueue_ready(pid);
            return;
        };

        self.now += self.cfg.ctx_switch;
        self.cpus[cpu].ctx_switch_time += self.cfg.ctx_switch;
        self.cpus[cpu].current = Some(pid);

        {
            let p = &mut self.procs[pid];
            p.cpu = Some(cpu);
            p.state = ProcState::Running;
            // never overshoot the remaining demand
            p.cpu_current = p.cpu_current.min(p.demand);
        }

        let state = if self.policy.adaptive() {
            self.snapshot(pid)
        } else {
            Features::default()
        };
        let quantum = self.policy.assign(&state, &mut self.rng);

        let p = &mut self.procs[pid];
        p.quantum = quantum;
        if let Some(q) = quantum {
            p.last_quantum = q;
        }

        let (cpu_current, demand) = (p.cpu_current, p.demand);
        match quantum {
            Some(q) if cpu_current > q => {
                debug!("pid={pid} on cpu {cpu} for quantum {q}");
                self.push(EventKind::QuantumExpired, self.now + q, pid);
            }
            _ if cpu_current == demand => {
                // this burst exhausts the demand
                self.push(EventKind::Terminated, self.now + cpu_current, pid);
            }
            _ if self.cfg.enable_io => {
                self.push(EventKind::IoRequested, self.now + cpu_current, pid);
            }
            _ => {
                // unreachable for well-formed processes: without io the
                // whole demand is one burst
                debug_assert!(false, "pid={pid} dispatched with no boundary event");
            }
        }
    }

    // A process leaves the system: free its cpu, finalize its statistics,
    // and hand the cpu to the ready queue's head if one is waiting.
    fn on_terminated(&mut self, pid: Pid) {
        self.release_cpu(pid);
        let p = &mut self.procs[pid];
        p.demand = 0;
        p.cpu_current = 0;
        p.quantum = None;
        p.state = ProcState::Done;

        let turnaround = self.now.saturating_sub(p.arrival_time);
        let (kind, wait, preemptions) = (p.kind.clone(), p.wait_time, p.preemptions);
        debug!("pid={pid} terminated: turnaround={turnaround} wait={wait}");
        self.stats
            .record_completion(&kind, self.now, turnaround, wait, preemptions);
        if self.policy.adaptive() {
            self.recent_waits.push(wait);
        }

        if let Some(head) = self.ready.pop_front() {
            self.dispatch(head);
        }
    }

    // The running process used up its time slice: charge the quantum
    // against its demand, push it to the back of the ready queue, and give
    // the freed cpu to the queue's head (itself, if nothing else waits).
    fn on_quantum_expired(&mut self, pid: Pid) {
        self.release_cpu(pid);
        let p = &mut self.procs[pid];
        debug_assert!(p.quantum.is_some(), "preempted pid={pid} has no quantum");
        let q = p.quantum.unwrap_or(0);
        p.preemptions += 1;
        p.demand = p.demand.saturating_sub(q);
        p.cpu_current = p.cpu_current.saturating_sub(q);
        self.enqueue_ready(pid);

        if let Some(head) = self.ready.pop_front() {
            self.dispatch(head);
        }
    }

    // The burst ended at an io boundary: charge the consumed burst, block
    // the process for its io duration, and refill the cpu from the ready
    // queue.
    fn on_io_requested(&mut self, pid: Pid) {
        self.release_cpu(pid);
        let p = &mut self.procs[pid];
        p.demand = p.demand.saturating_sub(p.cpu_current);
        p.state = ProcState::IoWait;
        debug_assert!(p.burst_io.is_some(), "pid={pid} io request without io burst");
        let dur = p.burst_io.unwrap_or(0);
        self.push(EventKind::IoCompleted, self.now + dur, pid);

        if let Some(head) = self.ready.pop_front() {
            self.dispatch(head);
        }
    }

    // Io finished: start a fresh cpu burst and compete for a cpu again,
    // behind anything already queued.
    fn on_io_completed(&mut self, pid: Pid) {
        self.procs[pid].cpu_current = self.procs[pid].burst_cpu;

        if self.idle_cpu().is_some() {
            let target = match self.ready.pop_front() {
                None => pid,
                Some(head) => {
                    self.enqueue_ready(pid);
                    head
                }
            };
            self.dispatch(target);
        } else {
            self.enqueue_ready(pid);
        }
    }

    // Feature snapshot of one process plus the system, keyed the way the
    // adaptive policy expects.
    fn snapshot(&self, pid: Pid) -> Features {
        let p = &self.procs[pid];
        let mut f = Features::default();
        f.insert(F_TIME.to_string(), self.now as f64);
        f.insert(F_DEMAND.to_string(), p.demand as f64);
        f.insert(F_CPU_CURRENT.to_string(), p.cpu_current as f64);
        f.insert(F_LAST_QUANTUM.to_string(), p.last_quantum as f64);
        f.insert(F_WAIT_TIME.to_string(), p.wait_time as f64);
        f.insert(
            F_TIME_IN_SYSTEM.to_string(),
            self.now.saturating_sub(p.arrival_time) as f64,
        );
        if let Some(io) = p.burst_io {
            f.insert(F_BURST_IO.to_string(), io as f64);
        }
        for cpu in &self.cpus {
            f.insert(
                cpu_idle_key(cpu.id),
                cpu.idle_between(self.t_last, self.now) as f64,
            );
        }
        f
    }

    // Reward for the interval since the last observation: the negated mean
    // wait of processes that completed in it, or, with no completions, the
    // negated idle time the cpus accrued.
    fn reward(&mut self) -> f64 {
        if self.recent_waits.is_empty() {
            let idle: Ticks = self
                .cpus
                .iter()
                .map(|c| c.idle_between(self.t_last, self.now))
                .sum();
            return -(idle as f64);
        }
        let mean = self.recent_waits.iter().sum::<Ticks>() as f64
            / self.recent_waits.len() as f64;
        self.recent_waits.clear();
        -mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::{AdaptivePreemptor, FixedQuantum};

    fn scripted_rng(script: Vec<f64>, default: f64) -> Rand48 {
        let mut rng = Rand48::new(0);
        let mut draws = script.into_iter();
        rng.override_with(Box::new(move || draws.next().unwrap_or(default)));
        rng
    }

    fn engine_with(
        template: &str,
        cfg: EngineConfig,
        quantum: Option<Ticks>,
        rng: Rand48,
    ) -> Engine<FixedQuantum> {
        let spec = WorkloadSpec::parse(template).unwrap();
        Engine::new(cfg, spec, FixedQuantum(quantum), rng)
    }

    #[test]
    fn constant_quantum_preemption_scenario() {
        // one cpu, io off, demand 5, burst 5, quantum 2, ctx 0: preempted
        // at 2 and 4, terminates at 5 with 2 preemptions
        let cfg = EngineConfig {
            ctx_switch: 0,
            stop_time: 100,
            enable_io: false,
            num_cpus: 1,
        };
        // first draw 0.59 makes exprand(5) == 5; every later draw of 0.9
        // pushes the next arrival far past the stop time
        let rng = scripted_rng(vec![0.59], 0.9);
        let mut engine = engine_with("1\nbatch 5 5 100000 10\n", cfg, Some(2), rng);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let batch = &engine.stats.per_type["batch"];
        assert_eq!(batch.completed, 1);
        assert_eq!(batch.turnaround[0], 5);
        assert_eq!(batch.wait[0], 0);
        assert_eq!(batch.preemptions[0], 2);
        assert_eq!(engine.procs[0].state, ProcState::Done);
        assert_eq!(engine.procs[0].demand, 0);
    }

    #[test]
    fn wait_accrues_only_in_the_ready_queue() {
        // two types, one cpu, no preemption: the second arrival waits
        // exactly as long as the first process runs
        let cfg = EngineConfig {
            ctx_switch: 0,
            stop_time: 100,
            enable_io: false,
            num_cpus: 1,
        };
        // every third draw is a demand draw: 0.63 gives exprand(10) == 10
        // and exprand(6) == 6
        let mut n = 0;
        let mut rng = Rand48::new(0);
        rng.override_with(Box::new(move || {
            let u = if n % 3 == 0 { 0.63 } else { 0.9 };
            n += 1;
            u
        }));
        let template = "2\nbatch 10 5 100000 10\ninteractive 6 5 100000 10\n";
        let mut engine = engine_with(template, cfg, None, rng);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let batch = &engine.stats.per_type["batch"];
        assert_eq!(batch.turnaround[0], 10);
        assert_eq!(batch.wait[0], 0);
        // interactive arrived at t=1, queued until batch finished at t=10,
        // then ran its 6 ticks
        let interactive = &engine.stats.per_type["interactive"];
        assert_eq!(interactive.wait[0], 9);
        assert_eq!(interactive.turnaround[0], 15);
    }

    #[test]
    fn dispatch_picks_the_lowest_free_cpu() {
        let cfg = EngineConfig {
            ctx_switch: 0,
            stop_time: 100,
            enable_io: false,
            num_cpus: 2,
        };
        let rng = scripted_rng(vec![], 0.9);
        let template = "2\nbatch 50 5 100000 10\ninteractive 50 5 100000 10\n";
        let mut engine = engine_with(template, cfg, None, rng);
        engine.initialize().unwrap();

        // submitted(0)@0, dispatched(0)@0, submitted(1)@1, dispatched(1)@1
        for _ in 0..4 {
            engine.step().unwrap();
        }
        assert_eq!(engine.procs[0].cpu, Some(0));
        assert_eq!(engine.procs[1].cpu, Some(1));
        assert_eq!(engine.cpus[0].current, Some(0));
        assert_eq!(engine.cpus[1].current, Some(1));
    }

    #[test]
    fn initialize_twice_is_a_noop() {
        let cfg = EngineConfig::default();
        let rng = Rand48::new(7);
        let mut engine = engine_with("1\nbatch 20 5 10 5\n", cfg, None, rng);
        engine.initialize().unwrap();
        let queued = engine.pending_events();
        engine.initialize().unwrap();
        assert_eq!(engine.pending_events(), queued);
        assert_eq!(engine.procs.len(), 1);
    }

    #[test]
    fn handled_timestamps_never_decrease() {
        let cfg = EngineConfig {
            ctx_switch: 2,
            stop_time: 3000,
            enable_io: true,
            num_cpus: 2,
        };
        let rng = Rand48::new(424242);
        let template = "2\nbatch 60 12 40 20\ninteractive 12 3 8 4\n";
        let mut engine = engine_with(template, cfg, Some(5), rng);
        engine.initialize().unwrap();

        let mut last = 0;
        while engine.now() < 3000 {
            let Some(event) = engine.step().unwrap() else {
                break;
            };
            assert!(event.t >= last, "event at t={} after t={last}", event.t);
            last = event.t;
        }
        assert!(engine.stats.processes_completed > 0);
    }

    #[test]
    fn conservation_holds_after_a_long_run() {
        let cfg = EngineConfig {
            ctx_switch: 1,
            stop_time: 5000,
            enable_io: true,
            num_cpus: 3,
        };
        let rng = Rand48::new(99);
        let template = "2\nbatch 80 15 30 25\ninteractive 10 2 5 3\n";
        let mut engine = engine_with(template, cfg, Some(4), rng);
        engine.initialize().unwrap();
        engine.run().unwrap();

        let done = engine
            .procs
            .iter()
            .filter(|p| p.state == ProcState::Done)
            .count() as u64;
        assert_eq!(done, engine.stats.processes_completed);

        let running = engine
            .procs
            .iter()
            .filter(|p| p.state == ProcState::Running)
            .count();
        let occupied = engine.cpus.iter().filter(|c| c.current.is_some()).count();
        assert_eq!(running, occupied);
        assert!(occupied <= 3);

        let ready = engine
            .procs
            .iter()
            .filter(|p| p.state == ProcState::Ready)
            .count();
        assert_eq!(ready, engine.ready_len());

        for p in &engine.procs {
            assert_eq!(p.demand == 0, p.state == ProcState::Done);
        }
    }

    #[test]
    fn identical_seeds_give_identical_statistics() {
        let template = "2\nbatch 60 12 40 20\ninteractive 12 3 8 4\n";
        let cfg = EngineConfig {
            ctx_switch: 1,
            stop_time: 4000,
            enable_io: true,
            num_cpus: 2,
        };
        let run = || {
            let mut engine =
                engine_with(template, cfg.clone(), Some(7), Rand48::new(1234));
            engine.initialize().unwrap();
            engine.run().unwrap();
            engine
        };
        let a = run();
        let b = run();
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.cpus, b.cpus);
        assert_eq!(a.procs, b.procs);
    }

    #[test]
    fn adaptive_policy_learns_without_poisoning_weights() {
        let cfg = EngineConfig {
            ctx_switch: 0,
            stop_time: 4000,
            enable_io: true,
            num_cpus: 2,
        };
        let spec =
            WorkloadSpec::parse("2\nbatch 60 12 40 20\ninteractive 12 3 8 4\n").unwrap();
        let policy = AdaptivePreemptor::new(2, true);
        let mut engine = Engine::new(cfg, spec, policy, Rand48::new(5150));
        engine.initialize().unwrap();
        engine.run().unwrap();

        assert!(engine.stats.processes_completed > 0);
        // every preempted process got its quantum from the action set
        for p in &engine.procs {
            if p.preemptions > 0 {
                assert!((1..=200).contains(&p.last_quantum));
            }
        }
        // alpha decays but never goes negative
        assert!(engine.policy.alpha >= 0.0);
        assert!(engine.policy.alpha < 0.01);
    }

    #[test]
    fn empty_template_yields_an_idle_engine() {
        let spec = WorkloadSpec::parse("0\n").unwrap();
        let mut engine = Engine::new(
            EngineConfig::default(),
            spec,
            FixedQuantum(None),
            Rand48::new(1),
        );
        engine.initialize().unwrap();
        // no seed processes, nothing to do
        assert_eq!(engine.pending_events(), 0);
        assert!(engine.step().unwrap().is_none());
    }
}
