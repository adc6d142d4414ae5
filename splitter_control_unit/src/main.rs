//! # LogSplitter Control Unit
//!
//! Polling control loop for the two-stage hydraulic log splitter.
//!
//! Loads the persisted configuration (substituting validated defaults when
//! the store is missing or corrupt), assembles the control core, performs
//! RT setup when built with the `rt` feature, and enters the cycle loop
//! until a shutdown signal arrives.
//!
//! Without hardware ports wired in this binary runs against the simulation
//! ports: inputs idle, pressure at a quiet idle value, relay writes logged.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use splitter_common::event::TracingSink;
use splitter_control_unit::config::ConfigStore;
use splitter_control_unit::cycle::{CyclePorts, CycleRunner, rt_setup};
use splitter_control_unit::sim::{LogRelayLink, sim_inputs, sim_pressure};

/// Idle hydraulic pressure fed by the simulation port [PSI].
const SIM_IDLE_PSI: f32 = 45.0;
const SIM_IDLE_OIL_PSI: f32 = 15.0;

/// LogSplitter Control Unit — hydraulic sequence control loop
#[derive(Parser, Debug)]
#[command(name = "splitter_control_unit")]
#[command(version)]
#[command(about = "Sequence, safety and relay control for the hydraulic log splitter")]
struct Args {
    /// Path to the controller configuration TOML.
    #[arg(default_value = "config/splitter.toml")]
    config: PathBuf,

    /// CPU core to pin the control thread to (rt builds).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt builds).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!(
        "LogSplitter Control Unit v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("LogSplitter Control Unit shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let store = ConfigStore::new(&args.config);
    let (loaded, load_err) = store.load_or_default();
    if let Some(err) = load_err {
        info!("configuration store fell back to defaults: {err}");
    }
    info!(
        "Config OK: stable={}ms startStable={}ms timeout={}ms threshold={:.0}psi",
        loaded.config.timing.stable_ms,
        loaded.config.timing.start_stable_ms,
        loaded.config.timing.timeout_ms,
        loaded.config.safety.threshold_psi,
    );

    // RT setup (mlockall, affinity, scheduler). No-op without `rt`.
    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let (input_port, _input_handle) = sim_inputs();
    let (pressure_port, _pressure_handle) = sim_pressure(SIM_IDLE_PSI, SIM_IDLE_OIL_PSI);
    let ports = CyclePorts {
        inputs: Box::new(input_port),
        pressure: Box::new(pressure_port),
        relay_link: Box::new(LogRelayLink),
        sink: Box::new(TracingSink),
    };

    let mut runner = CycleRunner::new(loaded, store, ports);
    info!("CycleRunner initialized, entering control loop");

    // Graceful shutdown on SIGINT/SIGTERM.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    runner.run(&running)?;

    info!(
        cycles = runner.stats.cycle_count,
        avg_ns = runner.stats.avg_cycle_ns(),
        overruns = runner.stats.overruns,
        "control loop exited"
    );
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
