pub mod core;
pub mod error;
pub mod quantum;
pub mod rand48;
pub mod workload;

pub use crate::core::{Cpu, Engine, EngineConfig, Event, EventKind, Process, SimStats, Ticks};
pub use crate::error::SimError;
pub use crate::quantum::{
    AdaptivePreemptor, FixedQuantum, QuantumDist, QuantumPolicy, QuantumSpec, RandomQuantum,
};
pub use crate::rand48::Rand48;
pub use crate::workload::{ProcessFactory, WorkloadSpec};
