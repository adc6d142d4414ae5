//! Control event vocabulary and the telemetry sink trait.
//!
//! Every externally observable transition in the core is expressed as a
//! `ControlEvent` and handed to an [`EventSink`]. Publication is
//! fire-and-forget: the core assumes no delivery guarantee and never blocks
//! on a sink.

use serde::Serialize;

use crate::error::SystemFault;
use crate::io::ChannelId;
use crate::relay::RelayId;
use crate::state::SequenceState;

/// An observable control-core event.
///
/// Abort and activation reasons are static strings drawn from a closed
/// vocabulary (`"timeout"`, `"new_press"`, `"pressure_threshold"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A run left the start-debounce phase and began driving the cylinder.
    RunStarted,
    /// The sequence machine moved between states.
    StageTransition {
        from: SequenceState,
        to: SequenceState,
    },
    /// A run retracted fully and returned to Idle.
    RunComplete,
    /// A run was aborted.
    RunAborted { reason: &'static str },
    /// The safety interlock engaged.
    SafetyActivated { reason: &'static str },
    /// The safety interlock cleared (hysteresis or manual).
    SafetyCleared,
    /// A relay changed commanded state.
    ActuatorChanged { relay: RelayId, on: bool },
    /// Engine stop output changed.
    EngineStop { stopped: bool },
    /// Emergency stop latched.
    EstopLatched,
    /// Emergency stop latch reset by an accepted operator command.
    EstopReset,
    /// A system fault was raised.
    FaultRaised { fault: SystemFault },
    /// A system fault was cleared.
    FaultCleared { fault: SystemFault },
    /// A debounced input channel changed.
    InputChanged { channel: ChannelId, active: bool },
    /// Periodic filtered pressure sample.
    Pressure { channel: ChannelId, psi: f32 },
}

impl ControlEvent {
    /// Stable topic-style name of the event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::StageTransition { .. } => "stage_transition",
            Self::RunComplete => "run_complete",
            Self::RunAborted { .. } => "run_aborted",
            Self::SafetyActivated { .. } => "safety_activated",
            Self::SafetyCleared => "safety_cleared",
            Self::ActuatorChanged { .. } => "actuator_changed",
            Self::EngineStop { .. } => "engine_stop",
            Self::EstopLatched => "estop_latched",
            Self::EstopReset => "estop_reset",
            Self::FaultRaised { .. } => "fault_raised",
            Self::FaultCleared { .. } => "fault_cleared",
            Self::InputChanged { .. } => "input_changed",
            Self::Pressure { .. } => "pressure",
        }
    }

    /// JSON payload for transports that carry structured bodies.
    pub fn payload_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"event\":\"{}\"}}", self.name()))
    }
}

/// Fire-and-forget telemetry/event sink.
pub trait EventSink {
    fn publish(&mut self, event: &ControlEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&mut self, _event: &ControlEvent) {}
}

/// Sink that records events in order. Used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<ControlEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any recorded event has the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name() == name)
    }

    /// Last recorded abort reason, if any.
    pub fn last_abort_reason(&self) -> Option<&'static str> {
        self.events.iter().rev().find_map(|e| match e {
            ControlEvent::RunAborted { reason } => Some(*reason),
            _ => None,
        })
    }
}

impl EventSink for MemorySink {
    fn publish(&mut self, event: &ControlEvent) {
        self.events.push(*event);
    }
}

/// Sink that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&mut self, event: &ControlEvent) {
        tracing::info!(event = event.name(), payload = %event.payload_json());
    }
}
