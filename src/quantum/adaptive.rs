//! Adaptive quantum selection via linear function approximation.
//!
//! A Q-learner whose value is a dot product of a learned weight vector
//! with the dispatched process's feature snapshot. Rewarded in negative
//! wait time, so smaller waits look better to it.
//!
//! Two oddities are kept deliberately, matching the system this models:
//! the action-selection ratio exploits only `exploit_p` of the time
//! (default 0.01) and explores the rest, and the weight vector is
//! re-normalized to sum to 1 after every update. Both change convergence
//! behavior; `exploit_p` is a public field so callers can experiment.

use rustc_hash::FxHashMap;

use super::{Features, QuantumPolicy};
use crate::core::state::{CpuId, Ticks};
use crate::rand48::Rand48;

/// The discrete action set: every quantum from 1 to 200.
pub const ACTION_MIN: Ticks = 1;
pub const ACTION_MAX: Ticks = 200;

/// Learning updates are skipped until the simulation clock passes this.
pub const WARMUP: Ticks = 1000;

pub const F_TIME: &str = "T";
pub const F_DEMAND: &str = "demand";
pub const F_CPU_CURRENT: &str = "cpu_current";
pub const F_LAST_QUANTUM: &str = "last_quantum";
pub const F_WAIT_TIME: &str = "wait_time";
pub const F_TIME_IN_SYSTEM: &str = "time_in_system";
pub const F_BURST_IO: &str = "burst_io";

/// Feature name for one cpu's idle-time delta.
pub fn cpu_idle_key(cpu: CpuId) -> String {
    format!("cpu_{cpu}_idletime")
}

pub struct AdaptivePreemptor {
    /// One weight per feature, keyed by feature name.
    pub weights: FxHashMap<String, f64>,
    features: Vec<String>,
    pub alpha: f64,
    pub gamma: f64,
    pub decay: f64,
    /// Probability of exploiting the best-valued action; the remainder
    /// explores uniformly.
    pub exploit_p: f64,
}

impl AdaptivePreemptor {
    pub fn new(num_cpus: usize, enable_io: bool) -> Self {
        let mut features: Vec<String> = (0..num_cpus).map(cpu_idle_key).collect();
        features.extend(
            [
                F_TIME,
                F_DEMAND,
                F_CPU_CURRENT,
                F_LAST_QUANTUM,
                F_WAIT_TIME,
                F_TIME_IN_SYSTEM,
            ]
            .map(String::from),
        );
        if enable_io {
            features.push(F_BURST_IO.to_string());
        }
        let weights = features.iter().map(|f| (f.clone(), 0.0)).collect();
        Self {
            weights,
            features,
            alpha: 0.01,
            gamma: 0.9,
            decay: 1e-5,
            exploit_p: 0.01,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    /// Q(state, action) = w · f(state). The feature set carries no action
    /// component, so the value is shared across actions; a terminal
    /// (absent) state is worth 0.
    pub fn qvalue(&self, state: Option<&Features>, _action: Ticks) -> f64 {
        let Some(state) = state else { return 0.0 };
        self.features
            .iter()
            .map(|f| self.weights[f] * state.get(f).copied().unwrap_or(0.0))
            .sum()
    }

    /// Best-valued action; later actions win ties.
    pub fn best_action(&self, state: Option<&Features>) -> Ticks {
        let mut best = ACTION_MIN;
        let mut best_value = f64::NEG_INFINITY;
        for action in ACTION_MIN..=ACTION_MAX {
            let value = self.qvalue(state, action);
            if value >= best_value {
                best_value = value;
                best = action;
            }
        }
        best
    }

    fn random_action(&self, rng: &mut Rand48) -> Ticks {
        let u = rng.drand();
        let span = ACTION_MAX - ACTION_MIN + 1;
        (ACTION_MIN + (u * span as f64) as Ticks).min(ACTION_MAX)
    }

    /// Pick an action: the best-valued one with probability `exploit_p`, a
    /// uniformly random one otherwise.
    pub fn choose(&mut self, state: &Features, rng: &mut Rand48) -> Ticks {
        if rng.drand() > self.exploit_p {
            self.random_action(rng)
        } else {
            self.best_action(Some(state))
        }
    }

    /// Q-learning weight update for one observed transition, followed by
    /// the sum-to-1 re-normalization and the alpha decay step.
    pub fn update(
        &mut self,
        state: &Features,
        action: Ticks,
        next: Option<&Features>,
        reward: f64,
    ) {
        let best_next = self.best_action(next);
        let target = reward + self.gamma * self.qvalue(next, best_next);
        let delta = target - self.qvalue(Some(state), action);

        for (feature, &value) in state {
            if let Some(w) = self.weights.get_mut(feature) {
                *w += self.alpha * delta * value;
            }
        }

        let total: f64 = self.weights.values().sum();
        if total != 0.0 {
            for w in self.weights.values_mut() {
                *w /= total;
            }
        }

        self.alpha = (self.alpha - self.decay).max(0.0);
    }
}

impl QuantumPolicy for AdaptivePreemptor {
    fn assign(&mut self, state: &Features, rng: &mut Rand48) -> Option<Ticks> {
        Some(self.choose(state, rng))
    }

    fn adaptive(&self) -> bool {
        true
    }

    fn observe(&mut self, state: &Features, action: Ticks, next: Option<&Features>, reward: f64) {
        self.update(state, action, next, reward);
    }
}
