pub mod driver;
pub mod event;
pub mod observer;
pub mod state;
pub mod stats;

pub use driver::Engine;
pub use event::{Event, EventKind, EventQueue};
pub use state::{Cpu, CpuId, EngineConfig, Pid, ProcState, Process, Ticks};
pub use stats::{SimStats, TypeStats};
