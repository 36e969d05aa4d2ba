//! Process generation from stochastic templates.

pub mod template;

pub use template::{ProcessTemplate, WorkloadSpec};

use log::trace;

use crate::core::state::{Pid, Process, ProcState, Ticks};
use crate::error::SimError;
use crate::rand48::Rand48;

/// Spins up new `Process` instances from the template table. The factory
/// owns the ascending pid counter; the engine owns the random stream and
/// lends it per call so every draw stays on the one seeded sequence.
#[derive(Debug)]
pub struct ProcessFactory {
    spec: WorkloadSpec,
    next_pid: Pid,
}

impl ProcessFactory {
    pub fn new(spec: WorkloadSpec) -> Self {
        Self { spec, next_pid: 0 }
    }

    pub fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    /// Create the next process of the given type. Draw order is fixed
    /// (demand, interarrival, cpu burst, io burst) so scripted override
    /// streams stay predictable.
    ///
    /// `last_arrival` is the arrival time of the previous process of this
    /// type; the new arrival lands a random interarrival beyond it. With
    /// `io` disabled (or no io mean declared) the whole demand is a single
    /// cpu burst and the process never blocks.
    pub fn observe(
        &mut self,
        rng: &mut Rand48,
        kind: &str,
        last_arrival: Ticks,
        io: bool,
    ) -> Result<Process, SimError> {
        let template = self
            .spec
            .get(kind)
            .ok_or_else(|| SimError::UnknownType(kind.to_string()))?;

        let demand = rng.exprand(template.mean_demand);
        let arrival_time = last_arrival + rng.exprand(template.mean_interarrival);
        let burst_cpu = rng.urand(1, 2 * template.mean_cpu_burst);
        let burst_io = match template.mean_io_burst {
            Some(mean) if io => Some(rng.exprand(mean)),
            _ => None,
        };

        // Without io faults the process runs its full demand in one burst.
        let burst_cpu = if burst_io.is_some() { burst_cpu } else { demand };

        let pid = self.next_pid;
        self.next_pid += 1;

        trace!(
            "spawned pid={pid} kind={kind} demand={demand} burst={burst_cpu} arrival={arrival_time}"
        );

        Ok(Process {
            kind: template.name.clone(),
            pid,
            demand,
            cpu_current: burst_cpu,
            burst_cpu,
            burst_io,
            arrival_time,
            wait_time: 0,
            preemptions: 0,
            cpu: None,
            quantum: None,
            last_quantum: 0,
            state: ProcState::New,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WorkloadSpec {
        WorkloadSpec::parse("1\nbatch 100 20 50 30\n").unwrap()
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut factory = ProcessFactory::new(spec());
        let mut rng = Rand48::new(1);
        let err = factory.observe(&mut rng, "nope", 0, true).unwrap_err();
        assert!(matches!(err, SimError::UnknownType(t) if t == "nope"));
    }

    #[test]
    fn pids_ascend_from_zero() {
        let mut factory = ProcessFactory::new(spec());
        let mut rng = Rand48::new(1);
        for expect in 0..5 {
            let p = factory.observe(&mut rng, "batch", 0, true).unwrap();
            assert_eq!(p.pid, expect);
        }
    }

    #[test]
    fn observe_is_deterministic_for_a_seed() {
        let mut rng_a = Rand48::new(1234);
        let mut rng_b = Rand48::new(1234);
        let mut fa = ProcessFactory::new(spec());
        let mut fb = ProcessFactory::new(spec());
        for _ in 0..50 {
            let a = fa.observe(&mut rng_a, "batch", 10, true).unwrap();
            let b = fb.observe(&mut rng_b, "batch", 10, true).unwrap();
            assert_eq!(a.demand, b.demand);
            assert_eq!(a.arrival_time, b.arrival_time);
            assert_eq!(a.burst_cpu, b.burst_cpu);
            assert_eq!(a.burst_io, b.burst_io);
        }
    }

    #[test]
    fn io_disabled_folds_demand_into_one_burst() {
        let mut factory = ProcessFactory::new(spec());
        let mut rng = Rand48::new(9);
        let p = factory.observe(&mut rng, "batch", 0, false).unwrap();
        assert_eq!(p.burst_io, None);
        assert_eq!(p.burst_cpu, p.demand);
        assert_eq!(p.cpu_current, p.demand);
    }

    #[test]
    fn io_enabled_draws_io_burst() {
        let mut factory = ProcessFactory::new(spec());
        let mut rng = Rand48::new(9);
        let p = factory.observe(&mut rng, "batch", 0, true).unwrap();
        assert!(p.burst_io.is_some());
        assert_eq!(p.cpu_current, p.burst_cpu);
    }

    #[test]
    fn arrival_is_strictly_after_last() {
        let mut factory = ProcessFactory::new(spec());
        let mut rng = Rand48::new(5);
        let p = factory.observe(&mut rng, "batch", 77, true).unwrap();
        assert!(p.arrival_time > 77);
    }
}
