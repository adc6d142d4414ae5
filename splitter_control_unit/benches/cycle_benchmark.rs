//! Cycle body latency benchmark.
//!
//! Measures one full control cycle (input scan, pressure ingest, safety
//! evaluation, sequence advance) against the simulation ports, both idle
//! and mid-run.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use splitter_common::config::ControllerConfig;
use splitter_common::event::NullSink;
use splitter_common::io::ChannelRole;

use splitter_control_unit::config::ConfigStore;
use splitter_control_unit::cycle::{CyclePorts, CycleRunner};
use splitter_control_unit::sim::{LogRelayLink, SimInputs, sim_inputs, sim_pressure};

fn build_runner() -> (CycleRunner, SimInputs, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("splitter.toml"));
    store.save(&ControllerConfig::default()).unwrap();
    let (loaded, _) = store.load_or_default();

    let (input_port, inputs) = sim_inputs();
    let (pressure_port, _pressure) = sim_pressure(45.0, 15.0);
    let ports = CyclePorts {
        inputs: Box::new(input_port),
        pressure: Box::new(pressure_port),
        relay_link: Box::new(LogRelayLink),
        sink: Box::new(NullSink),
    };
    (CycleRunner::new(loaded, store, ports), inputs, dir)
}

fn bench_idle_cycle(c: &mut Criterion) {
    let (mut runner, _inputs, _dir) = build_runner();
    runner.cycle_body(0);

    let mut now = 1u64;
    c.bench_function("cycle_body_idle", |b| {
        b.iter(|| {
            now += 1;
            runner.cycle_body(black_box(now));
        })
    });
}

fn bench_running_cycle(c: &mut Criterion) {
    let (mut runner, inputs, _dir) = build_runner();
    runner.cycle_body(0);

    // Bring the machine into Stage1Active.
    inputs.set_active(ChannelRole::Start, true);
    runner.cycle_body(10);
    runner.cycle_body(10 + ChannelRole::Start.default_debounce_ms());
    let confirmed =
        10 + ChannelRole::Start.default_debounce_ms() + runner.config.timing.start_stable_ms;
    runner.cycle_body(confirmed);
    assert!(runner.seq.is_active());

    // Keep `now` short of the run timeout so the benchmark measures the
    // active path, not the abort path.
    let mut now = confirmed;
    let ceiling = confirmed + runner.config.timing.timeout_ms / 2;
    c.bench_function("cycle_body_running", |b| {
        b.iter(|| {
            now += 1;
            if now >= ceiling {
                now = confirmed;
            }
            runner.cycle_body(black_box(now));
        })
    });
}

criterion_group!(benches, bench_idle_cycle, bench_running_cycle);
criterion_main!(benches);
