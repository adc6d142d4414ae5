//! Simulation ports.
//!
//! Hardware-free implementations of the port traits, used by the binary's
//! bring-up mode, the integration tests and the cycle benchmark. Handles
//! share state with their port through `Arc<Mutex<..>>` so a test can move
//! switches and pressure while the runner owns the port.

use std::sync::{Arc, Mutex};

use tracing::debug;

use splitter_common::io::{CHANNEL_COUNT, CHANNEL_ROLES, ChannelRole, DiLogic, PressureChannel};
use splitter_common::relay::RelayId;

use crate::input::InputPort;
use crate::pressure::PressurePort;
use crate::relay::{RelayLink, frame};

// ─── Inputs ─────────────────────────────────────────────────────────

/// Handle for driving simulated input levels (assumes role-default wiring).
#[derive(Clone)]
pub struct SimInputs {
    levels: Arc<Mutex<[bool; CHANNEL_COUNT]>>,
}

impl SimInputs {
    /// Set the *logical* state of a channel; the raw level is derived from
    /// the role's default NO/NC wiring.
    pub fn set_active(&self, role: ChannelRole, active: bool) {
        let level = match role.default_logic() {
            DiLogic::NO => active,
            DiLogic::NC => !active,
        };
        self.levels.lock().unwrap()[role.id() as usize] = level;
    }
}

/// Simulated raw input port.
pub struct SimInputPort {
    levels: Arc<Mutex<[bool; CHANNEL_COUNT]>>,
}

impl InputPort for SimInputPort {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT] {
        *self.levels.lock().unwrap()
    }
}

/// Create a port/handle pair with every channel logically inactive.
pub fn sim_inputs() -> (SimInputPort, SimInputs) {
    let mut levels = [false; CHANNEL_COUNT];
    for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
        levels[idx] = matches!(role.default_logic(), DiLogic::NC);
    }
    let shared = Arc::new(Mutex::new(levels));
    (
        SimInputPort {
            levels: shared.clone(),
        },
        SimInputs { levels: shared },
    )
}

// ─── Pressure ───────────────────────────────────────────────────────

/// Handle for driving simulated pressure readings.
#[derive(Clone)]
pub struct SimPressure {
    hydraulic: Arc<Mutex<f32>>,
    oil: Arc<Mutex<f32>>,
}

impl SimPressure {
    pub fn set_hydraulic(&self, psi: f32) {
        *self.hydraulic.lock().unwrap() = psi;
    }

    pub fn set_oil(&self, psi: f32) {
        *self.oil.lock().unwrap() = psi;
    }
}

/// Simulated pressure port.
pub struct SimPressurePort {
    hydraulic: Arc<Mutex<f32>>,
    oil: Arc<Mutex<f32>>,
}

impl PressurePort for SimPressurePort {
    fn read_psi(&mut self, channel: PressureChannel) -> f32 {
        match channel {
            PressureChannel::Hydraulic => *self.hydraulic.lock().unwrap(),
            PressureChannel::HydraulicOil => *self.oil.lock().unwrap(),
        }
    }
}

/// Create a port/handle pair at the given idle pressures.
pub fn sim_pressure(hydraulic_psi: f32, oil_psi: f32) -> (SimPressurePort, SimPressure) {
    let hydraulic = Arc::new(Mutex::new(hydraulic_psi));
    let oil = Arc::new(Mutex::new(oil_psi));
    (
        SimPressurePort {
            hydraulic: hydraulic.clone(),
            oil: oil.clone(),
        },
        SimPressure { hydraulic, oil },
    )
}

// ─── Relay Link ─────────────────────────────────────────────────────

/// Link that records transmitted frames for inspection.
#[derive(Clone, Default)]
pub struct RecordingLink {
    frames: Arc<Mutex<Vec<String>>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

impl RelayLink for RecordingLink {
    fn transmit(&mut self, relay: RelayId, on: bool) {
        self.frames.lock().unwrap().push(frame(relay, on));
    }
}

/// Link that logs frames instead of writing to a board.
#[derive(Debug, Default)]
pub struct LogRelayLink;

impl RelayLink for LogRelayLink {
    fn transmit(&mut self, relay: RelayId, on: bool) {
        debug!(frame = %frame(relay, on), "relay write");
    }
}
