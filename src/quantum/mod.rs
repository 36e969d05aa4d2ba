//! Time-quantum selection strategies.
//!
//! The engine is generic over one of these, chosen at construction:
//! constant, bounded-random, or the adaptive learner in [`adaptive`].

pub mod adaptive;

pub use adaptive::AdaptivePreemptor;

use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::core::state::Ticks;
use crate::rand48::Rand48;

/// Feature snapshot of a dispatched process plus the system, keyed by
/// feature name. Only the adaptive policy reads it.
pub type Features = FxHashMap<String, f64>;

pub trait QuantumPolicy {
    /// Quantum for a process being dispatched. None means run to the
    /// natural boundary without a preemption timer.
    fn assign(&mut self, state: &Features, rng: &mut Rand48) -> Option<Ticks>;

    /// Whether the engine should snapshot features and report transitions.
    fn adaptive(&self) -> bool {
        false
    }

    /// Observe a completed transition. No-op for non-learning policies.
    fn observe(
        &mut self,
        _state: &Features,
        _action: Ticks,
        _next: Option<&Features>,
        _reward: f64,
    ) {
    }
}

/// Every dispatch gets the same quantum; None disables preemption timers
/// entirely.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuantum(pub Option<Ticks>);

impl QuantumPolicy for FixedQuantum {
    fn assign(&mut self, _state: &Features, _rng: &mut Rand48) -> Option<Ticks> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumDist {
    /// Drawn uniformly from [1, max].
    Uniform(Ticks),
    /// Drawn from an exponential with the given mean.
    Exponential(Ticks),
}

/// Quantum drawn once per assignment from the shared random stream, using
/// the same draw primitives the workload factory uses.
#[derive(Debug, Clone, Copy)]
pub struct RandomQuantum(pub QuantumDist);

impl QuantumPolicy for RandomQuantum {
    fn assign(&mut self, _state: &Features, rng: &mut Rand48) -> Option<Ticks> {
        Some(match self.0 {
            QuantumDist::Uniform(max) => rng.urand(1, max),
            QuantumDist::Exponential(mean) => rng.exprand(mean),
        })
    }
}

/// Parsed quantum configuration, mapped onto a concrete policy by the
/// caller that builds the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumSpec {
    /// No preemption timer.
    None,
    Constant(Ticks),
    Uniform(Ticks),
    Exponential(Ticks),
    Adaptive,
}

impl FromStr for QuantumSpec {
    type Err = String;

    /// `none`/`0` | an integer | `u:<max>` | `e:<mean>` | `rl`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || format!("invalid quantum spec `{s}`");
        match s {
            "none" | "0" => Ok(Self::None),
            "rl" | "adaptive" => Ok(Self::Adaptive),
            _ => {
                if let Some(max) = s.strip_prefix("u:") {
                    let max = max.parse().map_err(|_| err())?;
                    if max < 2 {
                        return Err(err());
                    }
                    Ok(Self::Uniform(max))
                } else if let Some(mean) = s.strip_prefix("e:") {
                    let mean = mean.parse().map_err(|_| err())?;
                    if mean == 0 {
                        return Err(err());
                    }
                    Ok(Self::Exponential(mean))
                } else {
                    let q = s.parse().map_err(|_| err())?;
                    Ok(Self::Constant(q))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_always_returns_its_quantum() {
        let mut rng = Rand48::new(1);
        let state = Features::default();
        let mut p = FixedQuantum(Some(12));
        for _ in 0..10 {
            assert_eq!(p.assign(&state, &mut rng), Some(12));
        }
        let mut none = FixedQuantum(None);
        assert_eq!(none.assign(&state, &mut rng), None);
        assert!(!p.adaptive());
    }

    #[test]
    fn uniform_policy_stays_in_range() {
        let mut rng = Rand48::new(4);
        let state = Features::default();
        let mut p = RandomQuantum(QuantumDist::Uniform(30));
        for _ in 0..1000 {
            let q = p.assign(&state, &mut rng).unwrap();
            assert!((1..=30).contains(&q));
        }
    }

    #[test]
    fn exponential_policy_is_positive() {
        let mut rng = Rand48::new(4);
        let state = Features::default();
        let mut p = RandomQuantum(QuantumDist::Exponential(20));
        for _ in 0..1000 {
            assert!(p.assign(&state, &mut rng).unwrap() >= 1);
        }
    }

    #[test]
    fn quantum_spec_parses() {
        assert_eq!("none".parse::<QuantumSpec>().unwrap(), QuantumSpec::None);
        assert_eq!("0".parse::<QuantumSpec>().unwrap(), QuantumSpec::None);
        assert_eq!("25".parse::<QuantumSpec>().unwrap(), QuantumSpec::Constant(25));
        assert_eq!("u:30".parse::<QuantumSpec>().unwrap(), QuantumSpec::Uniform(30));
        assert_eq!(
            "e:15".parse::<QuantumSpec>().unwrap(),
            QuantumSpec::Exponential(15)
        );
        assert_eq!("rl".parse::<QuantumSpec>().unwrap(), QuantumSpec::Adaptive);
        assert!("u:1".parse::<QuantumSpec>().is_err());
        assert!("bogus".parse::<QuantumSpec>().is_err());
    }
}
