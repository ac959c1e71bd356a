//! Scenario driver for the cellsim cluster-scheduling simulator.
//!
//! Deliberately thin: no trace file format, no experiment-matrix sweeping,
//! no CSV/JSON statistics dumping. It wires up one of a handful of built-in
//! scenarios (or an optional TOML config overriding the cell), runs it to
//! completion, and prints a summary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use cellsim_core::cellstate::{CellState, ConflictMode, TransactionMode};
use cellsim_core::config::ScenarioConfig;
use cellsim_core::mesos::{MesosAllocator, MesosScheduler};
use cellsim_core::scheduler::OmegaScheduler;
use cellsim_core::sim::{RunOutcome, SchedulerKind, Simulator};
use cellsim_core::workload::Job;

#[derive(Parser)]
#[command(name = "cellsim")]
#[command(about = "Run a built-in cluster-scheduling concurrency-control scenario")]
#[command(version)]
struct Cli {
    /// Which built-in scenario to run
    #[arg(value_enum, default_value_t = Scenario::OmegaSingleJobFits)]
    scenario: Scenario,

    /// Optional TOML file overriding the cell/scheduler configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cap virtual time the run may reach
    #[arg(long)]
    max_virtual_time: Option<f64>,

    /// Cap wall-clock seconds the run may take
    #[arg(long)]
    wall_clock_timeout_secs: Option<f64>,

    /// Print the in-memory log buffer after the run
    #[arg(long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Scenario {
    /// A single Omega job that fits in one commit.
    OmegaSingleJobFits,
    /// Two Omega schedulers race for the same machine; the second conflicts.
    OmegaConflict,
    /// Two Mesos schedulers with different dominant shares race for an offer.
    MesosDrfOrdering,
    /// An Omega job that can never fit is abandoned after repeated attempts.
    Abandonment,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut sim = match &cli.config {
        Some(path) => build_from_config(path)?,
        None => build_scenario(cli.scenario)?,
    };

    let wall_clock_timeout = cli.wall_clock_timeout_secs.map(Duration::from_secs_f64);
    let outcome = sim.run(cli.max_virtual_time, wall_clock_timeout);

    print_summary(&sim, outcome);
    if cli.verbose {
        println!("\n--- log ---");
        for line in sim.log_buffer() {
            println!("{line}");
        }
    }

    Ok(())
}

fn build_from_config(path: &PathBuf) -> Result<Simulator> {
    let cfg = ScenarioConfig::load_from_file(path)
        .with_context(|| format!("loading scenario config from {}", path.display()))?;
    let cell = cfg.cell_state.build().context("building cell state from config")?;
    let mut sim = Simulator::new(cell, cfg.simulator.logging);
    for omega_cfg in &cfg.omega_schedulers {
        sim.register_omega_scheduler(omega_cfg.build());
    }
    if let Some(mesos_cfg) = &cfg.mesos_allocator {
        let allocator = mesos_cfg.build().context("building mesos allocator from config")?;
        sim = sim.with_mesos_allocator(allocator).context("wiring mesos allocator")?;
    }
    Ok(sim)
}

fn build_scenario(scenario: Scenario) -> Result<Simulator> {
    match scenario {
        Scenario::OmegaSingleJobFits => {
            let cell = CellState::new(1, 100.0, 100.0, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing)?;
            let mut sim = Simulator::new(cell, true);
            sim.register_omega_scheduler(OmegaScheduler::new("o1", 0));
            let job = Job::new(1, 0.0, "w", 2, 10.0, 10.0, 5.0, false);
            sim.submit_job("o1", job);
            Ok(sim)
        }
        Scenario::OmegaConflict => {
            let cell = CellState::new(1, 100.0, 100.0, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing)?;
            let mut sim = Simulator::new(cell, true);
            sim.register_omega_scheduler(OmegaScheduler::new("o1", 0));
            sim.register_omega_scheduler(OmegaScheduler::new("o2", 0));
            let job1 = Job::new(1, 0.0, "w", 1, 60.0, 60.0, 5.0, false);
            let job2 = Job::new(2, 0.0, "w", 1, 60.0, 60.0, 5.0, false);
            sim.submit_job("o1", job1);
            sim.submit_job("o2", job2);
            Ok(sim)
        }
        Scenario::MesosDrfOrdering => {
            let cell = CellState::new(1, 100.0, 100.0, ConflictMode::ResourceFit, TransactionMode::Incremental)?;
            let mut sim = Simulator::new(cell, true).with_mesos_allocator(MesosAllocator::new(0.0, 0.0, 0.0, 1.0)?)?;
            sim.register_mesos_scheduler(MesosScheduler::new("o1", 0));
            sim.register_mesos_scheduler(MesosScheduler::new("o2", 0));
            let job1 = Job::new(1, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
            let job2 = Job::new(2, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
            sim.submit_job("o1", job1);
            sim.submit_job("o2", job2);
            Ok(sim)
        }
        Scenario::Abandonment => {
            let cell = CellState::new(1, 5.0, 5.0, ConflictMode::SequenceNumbers, TransactionMode::AllOrNothing)?;
            let mut sim = Simulator::new(cell, true);
            sim.register_omega_scheduler(OmegaScheduler::new("o1", 0));
            let job = Job::new(1, 0.0, "w", 1, 10.0, 10.0, 5.0, false);
            sim.submit_job("o1", job);
            Ok(sim)
        }
    }
}

fn print_summary(sim: &Simulator, outcome: RunOutcome) {
    println!("run outcome: {outcome:?}");
    println!("final virtual time: {:.3}", sim.current_time());
    println!("events processed: {}", sim.event_count());
    println!("wall clock: {:?}", sim.elapsed_wall_clock());
    println!(
        "cell: available cpus={:.2} mem={:.2}",
        sim.cell_state().available_cpus(),
        sim.cell_state().available_mem()
    );

    for (machine, (cpu_util, mem_util)) in sim.cell_state().utilization().iter().enumerate() {
        println!("  machine {machine}: cpu util={cpu_util:.2} mem util={mem_util:.2}");
    }

    for name in ["o1", "o2", "m1"] {
        match sim.scheduler(name) {
            Some(SchedulerKind::Omega(o)) => println!(
                "scheduler {name} (omega): successful={} failed={} retried={} timed_out={} pending={}",
                o.base.num_successful_transactions,
                o.base.num_failed_transactions,
                o.base.num_retried_transactions,
                o.base.num_jobs_timed_out_scheduling,
                o.base.pending_len(),
            ),
            Some(SchedulerKind::Mesos(m)) => {
                println!("scheduler {name} (mesos): pending={}", m.base.pending_len());
            }
            None => {}
        }
    }
}
