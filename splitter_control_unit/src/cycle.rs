//! Deterministic control cycle: read → process → write.
//!
//! The cycle body runs a fixed order every iteration:
//!
//! 1. Scan raw input levels through the debouncer; read pressure.
//! 2. Handle the e-stop edge before any other input. An asserted edge
//!    short-circuits the rest of this cycle's input handling.
//! 3. Evaluate the safety interlock against the latest filtered pressure —
//!    before the sequence machine advances, so a fresh over-pressure
//!    condition aborts a run in the cycle it is detected.
//! 4. Dispatch remaining input changes to the sequence machine; changes it
//!    does not claim fall back to the manual jog mapping.
//! 5. Advance the sequence machine's time-based transitions.
//! 6. Publish throttled status telemetry.
//!
//! ## Pacing
//!
//! With the `rt` feature the loop pins itself with `mlockall` +
//! `SCHED_FIFO` and paces on `clock_nanosleep(TIMER_ABSTIME)` for
//! drift-free cycles. Without it, a simulation loop paces with
//! `std::thread::sleep`. In both modes the loop keeps running through
//! aborts, lockout and safety activation — nothing in the core terminates
//! the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;
use tracing::info;

use splitter_common::config::ControllerConfig;
use splitter_common::consts::{
    DEFAULT_CYCLE_TIME_US, Millis, PRESSURE_PSI_MAX, STATUS_PUBLISH_INTERVAL,
};
use splitter_common::error::SystemFault;
use splitter_common::event::{ControlEvent, EventSink};
use splitter_common::io::{ChannelRole, PressureChannel};
use splitter_common::relay::{Origin, RelayId};

use crate::command::{self, CommandContext};
use crate::config::{ConfigStore, LoadedConfig};
use crate::fault::FaultRegistry;
use crate::input::{DebouncedInputs, InputChange, InputPort};
use crate::pressure::{FilteredChannel, PressurePort};
use crate::relay::{RelayController, RelayLink};
use crate::safety::{EmergencyStop, SafetySystem};
use crate::sequence::{InputDisposition, SequenceController};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics. Updated every cycle, no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record a cycle duration. O(1).
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
    }

    /// Average cycle time [ns] (0 before the first cycle).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or cycle execution.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
}

// ─── Ports ──────────────────────────────────────────────────────────

/// Hardware-facing boundaries the runner is wired to.
pub struct CyclePorts {
    pub inputs: Box<dyn InputPort + Send>,
    pub pressure: Box<dyn PressurePort + Send>,
    pub relay_link: Box<dyn RelayLink + Send>,
    pub sink: Box<dyn EventSink + Send>,
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// The assembled control core plus its pacing loop.
pub struct CycleRunner {
    pub inputs: DebouncedInputs,
    pub hydraulic: FilteredChannel,
    pub oil: FilteredChannel,
    pub seq: SequenceController,
    pub safety: SafetySystem,
    pub estop: EmergencyStop,
    pub relays: RelayController,
    pub faults: FaultRegistry,
    pub config: ControllerConfig,
    pub stats: CycleStats,
    store: ConfigStore,
    input_port: Box<dyn InputPort + Send>,
    pressure_port: Box<dyn PressurePort + Send>,
    sink: Box<dyn EventSink + Send>,
    cycle_time_ns: i64,
    started: Instant,
}

impl CycleRunner {
    /// Assemble the core from a loaded configuration and hardware ports.
    pub fn new(loaded: LoadedConfig, store: ConfigStore, ports: CyclePorts) -> Self {
        let config = loaded.config;
        let mut runner = Self {
            inputs: DebouncedInputs::new(config.channel_logic()),
            hydraulic: FilteredChannel::new(&config.pressure),
            oil: FilteredChannel::new(&config.pressure),
            seq: SequenceController::new(config.timing, &config.safety),
            safety: SafetySystem::new(config.safety),
            estop: EmergencyStop::new(),
            relays: RelayController::new(ports.relay_link),
            faults: FaultRegistry::new(),
            config,
            stats: CycleStats::new(),
            store,
            input_port: ports.inputs,
            pressure_port: ports.pressure,
            sink: ports.sink,
            cycle_time_ns: DEFAULT_CYCLE_TIME_US as i64 * 1_000,
            started: Instant::now(),
        };
        if loaded.defaults_used {
            runner
                .faults
                .raise(SystemFault::STORE_LOAD, 0, &mut *runner.sink);
        }
        runner
    }

    /// Milliseconds since the runner was created.
    #[inline]
    pub fn now(&self) -> Millis {
        self.started.elapsed().as_millis() as Millis
    }

    /// One full control cycle at the given time.
    pub fn cycle_body(&mut self, now: Millis) {
        // ═══ READ PHASE ═══
        let levels = self.input_port.read_levels();
        let changes = self.inputs.scan(levels, now);
        for change in &changes {
            self.sink.publish(&ControlEvent::InputChanged {
                channel: change.channel,
                active: change.active,
            });
        }

        self.ingest_pressure(PressureChannel::Hydraulic, now);
        self.ingest_pressure(PressureChannel::HydraulicOil, now);
        let psi = self.hydraulic.value();

        // ═══ PROCESS PHASE ═══
        // E-stop first: its edge outranks every other input in the cycle.
        for change in &changes {
            if change.role() == ChannelRole::EStop {
                self.estop.on_edge(
                    change.active,
                    now,
                    &mut self.seq,
                    &mut self.safety,
                    &mut self.relays,
                    &mut *self.sink,
                );
            }
        }

        // Safety interlock before the sequence machine advances.
        let at_limit = self.inputs.active(ChannelRole::LimitExtend)
            || self.inputs.active(ChannelRole::LimitRetract);
        self.safety.evaluate(
            psi,
            at_limit,
            now,
            &mut self.seq,
            &mut self.relays,
            &mut *self.sink,
        );

        // Input dispatch. A live e-stop short-circuits all other input
        // handling; a standing latch only inhibits the sequence machine,
        // leaving the manual relief mappings available.
        if !self.estop.is_live() {
            for change in &changes {
                if change.role() == ChannelRole::EStop {
                    continue;
                }
                let disposition = if self.estop.inhibits() {
                    InputDisposition::NotHandled
                } else {
                    self.seq
                        .process_input_change(change, now, &mut self.relays, &mut *self.sink)
                };
                if disposition == InputDisposition::NotHandled {
                    self.apply_fallback(change);
                }
            }
        }

        // Sequence time-based transitions.
        let snapshot = self.inputs.snapshot();
        self.seq.tick(
            now,
            psi,
            &snapshot,
            &mut self.relays,
            &mut self.faults,
            &mut *self.sink,
        );

        // ═══ WRITE PHASE ═══
        if self.stats.cycle_count % STATUS_PUBLISH_INTERVAL == 0 {
            if self.hydraulic.is_ready() {
                self.sink.publish(&ControlEvent::Pressure {
                    channel: PressureChannel::Hydraulic as u8,
                    psi: self.hydraulic.value(),
                });
            }
            if self.oil.is_ready() {
                self.sink.publish(&ControlEvent::Pressure {
                    channel: PressureChannel::HydraulicOil as u8,
                    psi: self.oil.value(),
                });
            }
        }
    }

    fn ingest_pressure(&mut self, channel: PressureChannel, now: Millis) {
        let raw = self.pressure_port.read_psi(channel);
        if !raw.is_finite() || !(0.0..=PRESSURE_PSI_MAX).contains(&raw) {
            self.faults
                .raise(SystemFault::SENSOR_FAULT, now, &mut *self.sink);
            return;
        }
        match channel {
            PressureChannel::Hydraulic => self.hydraulic.ingest(raw, now),
            PressureChannel::HydraulicOil => self.oil.ingest(raw, now),
        }
    }

    /// Fallback mapping for input changes the sequence machine left
    /// unclaimed: manual jog and the safety-clear button.
    fn apply_fallback(&mut self, change: &InputChange) {
        match change.role() {
            ChannelRole::JogExtend => {
                self.relays.set(
                    RelayId::Extend,
                    change.active,
                    Origin::Manual,
                    &mut *self.sink,
                );
            }
            ChannelRole::JogRetract => {
                self.relays.set(
                    RelayId::Retract,
                    change.active,
                    Origin::Manual,
                    &mut *self.sink,
                );
            }
            ChannelRole::SafetyClear => {
                if change.active {
                    self.safety.clear_manual(&mut self.relays, &mut *self.sink);
                }
            }
            _ => {}
        }
    }

    /// Execute an operator command line against the live core.
    pub fn handle_command(&mut self, line: &str, now: Millis) -> String {
        let mut ctx = CommandContext {
            seq: &mut self.seq,
            safety: &mut self.safety,
            estop: &mut self.estop,
            relays: &mut self.relays,
            faults: &mut self.faults,
            config: &mut self.config,
            store: &self.store,
            hydraulic: &mut self.hydraulic,
            oil: &mut self.oil,
            sink: &mut *self.sink,
            now,
        };
        command::execute(line, &mut ctx)
    }

    /// Enter the pacing loop until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        info!(
            cycle_time_us = self.cycle_time_ns / 1_000,
            "entering control loop"
        );

        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(running)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(running)
        }
    }

    /// RT loop: absolute-time sleep on CLOCK_MONOTONIC for drift-free pacing.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let gettime =
            |clock| clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")));

        let mut next_wake = gettime(clock)?;

        while running.load(Ordering::SeqCst) {
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start = gettime(clock)?;
            self.cycle_body(self.now());
            let cycle_end = gettime(clock)?;

            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            self.stats.record(duration_ns);
            if duration_ns > self.cycle_time_ns {
                self.stats.overruns += 1;
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    /// Simulation loop: relative sleep, approximate pacing.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        let cycle_duration = std::time::Duration::from_nanos(self.cycle_time_ns as u64);

        while running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            self.cycle_body(self.now());
            let elapsed = cycle_start.elapsed();

            self.stats.record(elapsed.as_nanos() as i64);
            if elapsed.as_nanos() as i64 > self.cycle_time_ns {
                // Overruns are recorded, not fatal: the loop must keep
                // evaluating safety whatever the timing looks like.
                self.stats.overruns += 1;
            }

            if let Some(remaining) = cycle_duration.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (no page faults in the loop).
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Full RT setup sequence. Must run before entering the cycle loop.
/// All calls are no-ops without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
