use std::collections::VecDeque;

use super::state::{Cpu, Pid, ProcState, Process};

/// Invariant checker run after every engine step. A violation here means
/// the run has no defined semantics left, so everything is a hard
/// debug_assert.
#[derive(Debug, Default)]
pub struct Observer {
    step: u64,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, procs: &[Process], ready: &VecDeque<Pid>, cpus: &[Cpu]) {
        self.step += 1;

        for cpu in cpus {
            if let Some(pid) = cpu.current {
                let p = &procs[pid];
                debug_assert_eq!(
                    p.state,
                    ProcState::Running,
                    "cpu {} occupant pid={pid} must be Running",
                    cpu.id
                );
                debug_assert_eq!(
                    p.cpu,
                    Some(cpu.id),
                    "pid={pid} cpu assignment disagrees with cpu {} occupancy",
                    cpu.id
                );
                debug_assert_eq!(
                    cpus.iter().filter(|c| c.current == Some(pid)).count(),
                    1,
                    "pid={pid} occupies more than one cpu"
                );
            }
        }

        for &pid in ready {
            let p = &procs[pid];
            debug_assert_eq!(
                p.state,
                ProcState::Ready,
                "ready queue member pid={pid} must be Ready"
            );
            debug_assert!(p.cpu.is_none(), "ready pid={pid} still holds a cpu");
        }

        // conservation: every created process is in exactly one place
        let running = procs.iter().filter(|p| p.state == ProcState::Running).count();
        let occupied = cpus.iter().filter(|c| c.current.is_some()).count();
        debug_assert_eq!(running, occupied, "running count disagrees with occupancy");

        let queued = procs.iter().filter(|p| p.state == ProcState::Ready).count();
        debug_assert_eq!(queued, ready.len(), "Ready count disagrees with ready queue");

        for p in procs {
            debug_assert_eq!(
                p.demand == 0,
                p.state == ProcState::Done,
                "pid={} demand/terminal mismatch (demand={}, state={:?})",
                p.pid,
                p.demand,
                p.state
            );
            debug_assert!(
                p.cpu_current <= p.demand || p.state != ProcState::Running,
                "pid={} running with cpu_current beyond demand",
                p.pid
            );
        }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }
}
