//! Two-stage hydraulic run sequence.
//!
//! The state machine drives one full split cycle: confirm the start button,
//! extend until the extend exit condition holds stably, retract until the
//! retract exit condition holds stably, return to Idle. Each stage's exit
//! condition is the OR of its limit switch and a pressure ceiling, so a run
//! completes even if a switch is never struck.
//!
//! A stability window rejects limit bounce: the exit condition must hold
//! continuously for `stable_ms` before it is trusted, and losing it resets
//! the window to zero.
//!
//! Aborts (new button press, start released early, external abort) recover
//! automatically. A run timeout additionally locks the machine out — it
//! refuses new starts until explicitly re-enabled, since a run that never
//! reached its limit points at a mechanical fault.

use tracing::{debug, info, warn};

use splitter_common::config::{SafetyConfig, SequenceTiming};
use splitter_common::consts::Millis;
use splitter_common::error::SystemFault;
use splitter_common::event::{ControlEvent, EventSink};
use splitter_common::io::{ChannelRole, InputSnapshot};
use splitter_common::relay::{Origin, RelayId};
use splitter_common::state::SequenceState;

use crate::fault::FaultRegistry;
use crate::input::InputChange;
use crate::relay::RelayController;

/// Whether the sequence machine claimed an input event. Unclaimed events
/// are free for the caller's fallback mapping (manual jog control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    Handled,
    NotHandled,
}

/// The sequence state machine.
pub struct SequenceController {
    state: SequenceState,
    timing: SequenceTiming,
    extend_pressure_limit_psi: f32,
    retract_pressure_limit_psi: f32,

    /// When the current state was entered.
    state_entered_at: Millis,
    /// Start of the current stage-exit stability window, if one is running.
    trigger_stable_since: Option<Millis>,
    /// Channel states captured when the run began. Distinguishes "held since
    /// start" from "new press during the run".
    run_snapshot: Option<InputSnapshot>,
    /// False after a timeout lockout; refuses new starts until re-enabled.
    enabled: bool,
}

impl SequenceController {
    pub fn new(timing: SequenceTiming, safety: &SafetyConfig) -> Self {
        Self {
            state: SequenceState::Idle,
            timing,
            extend_pressure_limit_psi: safety.extend_pressure_limit_psi,
            retract_pressure_limit_psi: safety.retract_pressure_limit_psi,
            state_entered_at: 0,
            trigger_stable_since: None,
            run_snapshot: None,
            enabled: true,
        }
    }

    // ── Accessors ──

    #[inline]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn timing(&self) -> SequenceTiming {
        self.timing
    }

    /// Time spent in the current state [ms].
    pub fn elapsed(&self, now: Millis) -> Millis {
        if self.state.is_active() {
            now.saturating_sub(self.state_entered_at)
        } else {
            0
        }
    }

    // ── Configuration ──

    /// Apply new timing. Takes effect immediately, including for a run in
    /// progress.
    pub fn set_timing(&mut self, timing: SequenceTiming) {
        self.timing = timing;
    }

    /// Apply new stage pressure ceilings.
    pub fn set_pressure_limits(&mut self, safety: &SafetyConfig) {
        self.extend_pressure_limit_psi = safety.extend_pressure_limit_psi;
        self.retract_pressure_limit_psi = safety.retract_pressure_limit_psi;
    }

    /// Re-arm (or disarm) the machine after a timeout lockout.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            info!("sequence re-enabled");
        }
        self.enabled = enabled;
    }

    // ── Event entry point ──

    /// React to a debounced input change. Called synchronously from the
    /// control loop, which runs each callback to completion before
    /// continuing — there is no re-entrancy.
    pub fn process_input_change(
        &mut self,
        change: &InputChange,
        now: Millis,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) -> InputDisposition {
        let role = change.role();

        match self.state {
            SequenceState::Idle => {
                if role == ChannelRole::Start && change.active {
                    if !self.enabled {
                        debug!("start ignored - sequence locked out");
                        return InputDisposition::Handled;
                    }
                    if relays.is_safety_blocked() {
                        debug!("start ignored - safety active");
                        return InputDisposition::Handled;
                    }
                    self.enter_state(SequenceState::WaitStartDebounce, now, sink);
                    return InputDisposition::Handled;
                }
                InputDisposition::NotHandled
            }

            SequenceState::WaitStartDebounce => {
                if role == ChannelRole::Start && !change.active {
                    self.abort("released_during_debounce", now, relays, sink);
                }
                InputDisposition::Handled
            }

            // Running: a fresh operator-button activation aborts. Limit
            // switch changes land in the snapshot and are evaluated by
            // `tick` under the stability window.
            _ => {
                if change.active && role.is_operator_button() {
                    if let Some(at_start) = self.run_snapshot {
                        if !at_start[change.channel as usize] {
                            self.abort("new_press", now, relays, sink);
                        }
                    }
                }
                InputDisposition::Handled
            }
        }
    }

    // ── Periodic entry point ──

    /// Advance time-based transitions: start confirmation, stage-exit
    /// stability windows, and the run timeout.
    pub fn tick(
        &mut self,
        now: Millis,
        pressure_psi: f32,
        inputs: &InputSnapshot,
        relays: &mut RelayController,
        faults: &mut FaultRegistry,
        sink: &mut dyn EventSink,
    ) {
        if self.state.is_active()
            && now.saturating_sub(self.state_entered_at) > self.timing.timeout_ms
        {
            self.abort("timeout", now, relays, sink);
            // Lockout: a run that never reached its limit points at a
            // jammed ram, a dead valve, or a miswired switch.
            self.enabled = false;
            faults.raise(SystemFault::SEQUENCE_TIMEOUT, now, sink);
            warn!("run timed out - sequence locked out until re-enabled");
            return;
        }

        match self.state {
            SequenceState::Idle => {}

            SequenceState::WaitStartDebounce => {
                if !inputs[ChannelRole::Start.id() as usize] {
                    self.abort("released_during_debounce", now, relays, sink);
                } else if now.saturating_sub(self.state_entered_at) >= self.timing.start_stable_ms
                {
                    self.begin_run(now, inputs, relays, sink);
                }
            }

            SequenceState::Stage1Active | SequenceState::Stage1WaitLimit => {
                let triggered = inputs[ChannelRole::LimitExtend.id() as usize]
                    || pressure_psi >= self.extend_pressure_limit_psi;
                self.advance_stage(
                    triggered,
                    now,
                    SequenceState::Stage1Active,
                    SequenceState::Stage1WaitLimit,
                    relays,
                    sink,
                );
            }

            SequenceState::Stage2Active | SequenceState::Stage2WaitLimit => {
                let triggered = inputs[ChannelRole::LimitRetract.id() as usize]
                    || pressure_psi >= self.retract_pressure_limit_psi;
                self.advance_stage(
                    triggered,
                    now,
                    SequenceState::Stage2Active,
                    SequenceState::Stage2WaitLimit,
                    relays,
                    sink,
                );
            }
        }
    }

    // ── Manual control ──

    /// Force the run down: both hydraulic relays off, back to Idle, run
    /// bookkeeping cleared, abort event emitted.
    pub fn abort(
        &mut self,
        reason: &'static str,
        now: Millis,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        info!(reason, "aborting sequence");

        relays.set(RelayId::Extend, false, Origin::Automatic, sink);
        relays.set(RelayId::Retract, false, Origin::Automatic, sink);

        self.enter_state(SequenceState::Idle, now, sink);
        self.run_snapshot = None;

        sink.publish(&ControlEvent::RunAborted { reason });
    }

    pub fn reset(&mut self, now: Millis, relays: &mut RelayController, sink: &mut dyn EventSink) {
        self.abort("manual_reset", now, relays, sink);
    }

    /// One-line status for the command interface.
    pub fn status_line(&self, now: Millis) -> String {
        format!(
            "stage={} active={} enabled={} elapsed={} stableMs={} startStableMs={} timeoutMs={}",
            self.state.stage(),
            u8::from(self.state.is_active()),
            u8::from(self.enabled),
            self.elapsed(now),
            self.timing.stable_ms,
            self.timing.start_stable_ms,
            self.timing.timeout_ms,
        )
    }

    // ── Internals ──

    fn enter_state(&mut self, to: SequenceState, now: Millis, sink: &mut dyn EventSink) {
        if self.state == to {
            return;
        }
        debug!(from = ?self.state, to = ?to, "sequence state change");
        sink.publish(&ControlEvent::StageTransition {
            from: self.state,
            to,
        });
        self.state = to;
        self.state_entered_at = now;
        self.trigger_stable_since = None;
    }

    fn begin_run(
        &mut self,
        now: Millis,
        inputs: &InputSnapshot,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        // Off-before-on preserves the hydraulic mutual exclusion.
        relays.set(RelayId::Retract, false, Origin::Automatic, sink);
        relays.set(RelayId::Extend, true, Origin::Automatic, sink);

        self.run_snapshot = Some(*inputs);
        self.enter_state(SequenceState::Stage1Active, now, sink);
        sink.publish(&ControlEvent::RunStarted);
        info!("run started - extending");
    }

    /// Shared stage-exit logic: run the stability window against the fused
    /// trigger condition, then hand over to the next stage (or finish).
    fn advance_stage(
        &mut self,
        triggered: bool,
        now: Millis,
        active_state: SequenceState,
        wait_state: SequenceState,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        if triggered {
            match self.trigger_stable_since {
                None => {
                    self.enter_state(wait_state, now, sink);
                    self.trigger_stable_since = Some(now);
                }
                Some(since) if now.saturating_sub(since) >= self.timing.stable_ms => {
                    if active_state == SequenceState::Stage1Active {
                        self.switch_to_stage2(now, relays, sink);
                    } else {
                        self.complete_run(now, relays, sink);
                    }
                }
                Some(_) => {} // window still counting
            }
        } else if self.state == wait_state {
            // Trigger lost before the window elapsed: bounce. Reset to zero.
            debug!(state = ?self.state, "stage trigger lost - stability window reset");
            self.enter_state(active_state, now, sink);
        }
    }

    fn switch_to_stage2(
        &mut self,
        now: Millis,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        relays.set(RelayId::Extend, false, Origin::Automatic, sink);
        relays.set(RelayId::Retract, true, Origin::Automatic, sink);
        self.enter_state(SequenceState::Stage2Active, now, sink);
        info!("extend limit stable - retracting");
    }

    fn complete_run(
        &mut self,
        now: Millis,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        relays.set(RelayId::Retract, false, Origin::Automatic, sink);
        self.enter_state(SequenceState::Idle, now, sink);
        self.run_snapshot = None;
        sink.publish(&ControlEvent::RunComplete);
        info!("run complete");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
