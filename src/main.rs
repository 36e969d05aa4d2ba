use std::path::PathBuf;

use average::Estimate;
use clap::Parser;
use dessim::{
    AdaptivePreemptor, Cpu, Engine, EngineConfig, FixedQuantum, QuantumDist, QuantumPolicy,
    QuantumSpec, Rand48, RandomQuantum, SimStats, WorkloadSpec,
};
use rand::prelude::*;

/// Discrete event simulation: model processes propagating through a
/// preemptive scheduling system.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Process description file
    #[arg(short = 'f', long = "procgen-file", default_value = "pg.txt")]
    procgen: PathBuf,

    /// Number of cpus
    #[arg(short = 'c', long, default_value_t = 1)]
    num_cpus: usize,

    /// Quantum: `none`, a constant, `u:<max>`, `e:<mean>`, or `rl`
    #[arg(short, long, default_value = "none")]
    quantum: QuantumSpec,

    /// Simulation stop time
    #[arg(short = 't', long, default_value_t = 100)]
    stop_time: u64,

    /// Context switch cost
    #[arg(short = 'w', long = "switch-time", default_value_t = 0)]
    ctx_switch: u64,

    /// Disable io faults
    #[arg(short = 'n', long = "no-io-faults")]
    no_io: bool,

    /// Seed for random number generation
    #[arg(short, long)]
    seed: Option<u64>,

    /// Draw uniforms from rand's StdRng instead of the rand48 stream
    #[arg(short, long)]
    mersenne_twister: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => Rand48::new(seed),
        None => Rand48::from_entropy(),
    };
    if args.mersenne_twister {
        let mut source = StdRng::seed_from_u64(args.seed.unwrap_or_else(rand::random));
        rng.override_with(Box::new(move || source.random::<f64>()));
    }

    let spec = WorkloadSpec::load(&args.procgen)?;
    let cfg = EngineConfig {
        ctx_switch: args.ctx_switch,
        stop_time: args.stop_time,
        enable_io: !args.no_io,
        num_cpus: args.num_cpus,
    };

    match args.quantum {
        QuantumSpec::None => run(cfg, spec, FixedQuantum(None), rng),
        QuantumSpec::Constant(q) => run(cfg, spec, FixedQuantum(Some(q)), rng),
        QuantumSpec::Uniform(max) => run(cfg, spec, RandomQuantum(QuantumDist::Uniform(max)), rng),
        QuantumSpec::Exponential(mean) => {
            run(cfg, spec, RandomQuantum(QuantumDist::Exponential(mean)), rng)
        }
        QuantumSpec::Adaptive => {
            let policy = AdaptivePreemptor::new(cfg.num_cpus, cfg.enable_io);
            run(cfg, spec, policy, rng)
        }
    }
}

fn run<Q: QuantumPolicy>(
    cfg: EngineConfig,
    spec: WorkloadSpec,
    policy: Q,
    rng: Rand48,
) -> anyhow::Result<()> {
    let stop = cfg.stop_time;
    let mut engine = Engine::new(cfg, spec, policy, rng);
    engine.initialize()?;
    engine.run()?;
    summarize(&engine.stats, &engine.cpus, stop);
    Ok(())
}

fn summarize(stats: &SimStats, cpus: &[Cpu], stop: u64) {
    let mut kinds: Vec<&String> = stats.per_type.keys().collect();
    kinds.sort();

    println!("completed {} processes by t={stop}", stats.processes_completed);
    for kind in kinds {
        let t = &stats.per_type[kind];
        println!(
            "  {kind}: {} completed, avg turnaround {:.2}, avg wait {:.2}, avg preemptions {:.2}",
            t.completed,
            avg(t.turnaround.iter().map(|&v| v as f64)),
            avg(t.wait.iter().map(|&v| v as f64)),
            avg(t.preemptions.iter().map(|&v| v as f64)),
        );
    }
    for cpu in cpus {
        let total = (cpu.busy_time + cpu.idle_time + cpu.ctx_switch_time).max(1);
        println!(
            "  cpu {}: busy {} idle {} ctx {} (utilization {:.1}%)",
            cpu.id,
            cpu.busy_time,
            cpu.idle_time,
            cpu.ctx_switch_time,
            100.0 * cpu.busy_time as f64 / total as f64,
        );
    }
}

fn avg(iter: impl Iterator<Item = f64>) -> f64 {
    iter.collect::<average::Mean>().estimate()
}
