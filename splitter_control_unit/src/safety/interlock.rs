//! Over-pressure safety interlock.
//!
//! Evaluated once per cycle against the latest filtered pressure, before the
//! sequence machine is advanced — a newly detected over-pressure condition
//! aborts a run in the cycle it is seen, never one cycle late.
//!
//! Activation is level-triggered with an asymmetric band: it engages at
//! `threshold` and clears only below `threshold - hysteresis`, so the flag
//! cannot chatter at the boundary. While the cylinder sits on a travel
//! limit the threshold is elevated by `limit_tolerance`, because
//! end-of-travel pressure spikes there are expected.
//!
//! `active` is the single source of truth the relay gate consults; only
//! this module sets or clears it.

use tracing::{info, warn};

use splitter_common::config::SafetyConfig;
use splitter_common::consts::{LIMIT_CLEAR_MARGIN_PSI, Millis};
use splitter_common::event::{ControlEvent, EventSink};
use splitter_common::relay::{Origin, RelayId};

use crate::relay::RelayController;
use crate::sequence::SequenceController;

/// The safety interlock.
pub struct SafetySystem {
    config: SafetyConfig,
    active: bool,
    engine_stopped: bool,
    last_pressure: f32,
}

impl SafetySystem {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            active: false,
            engine_stopped: false,
            last_pressure: 0.0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn is_engine_stopped(&self) -> bool {
        self.engine_stopped
    }

    #[inline]
    pub fn last_pressure(&self) -> f32 {
        self.last_pressure
    }

    /// Apply new thresholds. Takes effect on the next evaluation.
    pub fn set_config(&mut self, config: SafetyConfig) {
        self.config = config;
    }

    /// Per-cycle evaluation. `at_travel_limit` is true while either cylinder
    /// limit switch is active.
    pub fn evaluate(
        &mut self,
        pressure: f32,
        at_travel_limit: bool,
        now: Millis,
        seq: &mut SequenceController,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        self.last_pressure = pressure;

        if at_travel_limit {
            let elevated = self.config.threshold_psi + self.config.limit_tolerance_psi;
            if pressure >= elevated {
                if !self.active {
                    self.activate("extreme_pressure_at_limit", now, seq, relays, sink);
                }
            } else if self.active && pressure < elevated - LIMIT_CLEAR_MARGIN_PSI {
                info!(pressure, "safety cleared: pressure acceptable at travel limit");
                self.deactivate(relays, sink);
            }
            return;
        }

        if pressure >= self.config.threshold_psi {
            if !self.active {
                self.activate("pressure_threshold", now, seq, relays, sink);
            }
        } else if self.active
            && pressure < self.config.threshold_psi - self.config.hysteresis_psi
        {
            info!(pressure, "safety cleared: pressure below threshold");
            self.deactivate(relays, sink);
        }
        // Between the two bounds: hold the current state.
    }

    /// Engage the interlock and run the emergency-stop sweep.
    pub fn activate(
        &mut self,
        reason: &'static str,
        now: Millis,
        seq: &mut SequenceController,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        if self.active {
            return;
        }
        self.active = true;
        warn!(reason, pressure = self.last_pressure, "SAFETY ACTIVATED");

        // Sweep: abort the run, close the gate to automatic activations,
        // drop every relay except board power, stop the engine. Manual
        // relay control stays available for pressure relief.
        relays.set_safety_blocked(true);
        if seq.is_active() {
            seq.abort(reason, now, relays, sink);
        }
        relays.all_off(Some(RelayId::BoardPower), sink);
        self.set_engine_stop(true, relays, sink);

        sink.publish(&ControlEvent::SafetyActivated { reason });
    }

    /// Operator-initiated clear: identical to the hysteresis clear but
    /// invocable regardless of pressure, for deliberate recovery after
    /// inspection. Does not touch the emergency-stop latch.
    pub fn clear_manual(&mut self, relays: &mut RelayController, sink: &mut dyn EventSink) {
        if !self.active {
            return;
        }
        info!("safety cleared manually");
        self.deactivate(relays, sink);
    }

    fn deactivate(&mut self, relays: &mut RelayController, sink: &mut dyn EventSink) {
        self.active = false;
        relays.set_safety_blocked(false);
        self.set_engine_stop(false, relays, sink);
        sink.publish(&ControlEvent::SafetyCleared);
    }

    /// Drive the engine-stop relay. Idempotent.
    pub fn set_engine_stop(
        &mut self,
        stopped: bool,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        if self.engine_stopped == stopped {
            return;
        }
        self.engine_stopped = stopped;
        relays.set(RelayId::EngineStop, stopped, Origin::Automatic, sink);
        info!(stopped, "engine stop output changed");
        sink.publish(&ControlEvent::EngineStop { stopped });
    }

    /// One-line status for the command interface.
    pub fn status_line(&self) -> String {
        format!(
            "safety={} engine={} pressure={:.1} threshold={:.1}",
            if self.active { "ACTIVE" } else { "OK" },
            if self.engine_stopped { "STOPPED" } else { "RUNNING" },
            self.last_pressure,
            self.config.threshold_psi,
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_common::config::{SafetyConfig, SequenceTiming};
    use splitter_common::event::MemorySink;

    use crate::relay::RelayLink;

    struct NullLink;
    impl RelayLink for NullLink {
        fn transmit(&mut self, _relay: RelayId, _on: bool) {}
    }

    fn rig() -> (SafetySystem, SequenceController, RelayController, MemorySink) {
        let config = SafetyConfig::default();
        (
            SafetySystem::new(config),
            SequenceController::new(SequenceTiming::default(), &config),
            RelayController::new(Box::new(NullLink)),
            MemorySink::new(),
        )
    }

    const THRESHOLD: f32 = 2_500.0;
    const HYST: f32 = 10.0;

    #[test]
    fn activates_at_threshold() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        safety.evaluate(THRESHOLD, false, 0, &mut seq, &mut relays, &mut sink);
        assert!(safety.is_active());
        assert!(relays.is_safety_blocked());
        assert!(safety.is_engine_stopped());
        assert!(relays.get(RelayId::EngineStop));
        assert!(sink.contains("safety_activated"));
    }

    #[test]
    fn holds_inside_hysteresis_band() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        safety.evaluate(THRESHOLD, false, 0, &mut seq, &mut relays, &mut sink);

        // Strictly between (threshold - hysteresis) and threshold: no change.
        safety.evaluate(THRESHOLD - HYST / 2.0, false, 1, &mut seq, &mut relays, &mut sink);
        assert!(safety.is_active());

        // And an inactive interlock in the band stays inactive.
        let (mut safety2, mut seq2, mut relays2, mut sink2) = rig();
        safety2.evaluate(THRESHOLD - HYST / 2.0, false, 0, &mut seq2, &mut relays2, &mut sink2);
        assert!(!safety2.is_active());
    }

    #[test]
    fn clears_below_hysteresis_band() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        safety.evaluate(THRESHOLD, false, 0, &mut seq, &mut relays, &mut sink);
        safety.evaluate(THRESHOLD - HYST - 0.1, false, 1, &mut seq, &mut relays, &mut sink);
        assert!(!safety.is_active());
        assert!(!relays.is_safety_blocked());
        assert!(!safety.is_engine_stopped());
        assert!(sink.contains("safety_cleared"));
    }

    #[test]
    fn aborts_active_run_with_pressure_reason() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        // Fake a running sequence by starting it through its public surface.
        let snapshot = [false; splitter_common::io::CHANNEL_COUNT];
        let mut start = snapshot;
        start[splitter_common::io::ChannelRole::Start.id() as usize] = true;
        let change = crate::input::InputChange {
            channel: splitter_common::io::ChannelRole::Start.id(),
            active: true,
            snapshot: start,
        };
        seq.process_input_change(&change, 0, &mut relays, &mut sink);
        let mut faults = crate::fault::FaultRegistry::new();
        seq.tick(
            SequenceTiming::default().start_stable_ms,
            0.0,
            &start,
            &mut relays,
            &mut faults,
            &mut sink,
        );
        assert!(relays.get(RelayId::Extend));

        safety.evaluate(THRESHOLD + 1.0, false, 1_000, &mut seq, &mut relays, &mut sink);
        assert!(!seq.is_active());
        assert_eq!(sink.last_abort_reason(), Some("pressure_threshold"));
        assert!(!relays.get(RelayId::Extend));
        assert!(!relays.get(RelayId::Retract));
    }

    #[test]
    fn elevated_threshold_at_travel_limit() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        let tolerance = SafetyConfig::default().limit_tolerance_psi;

        // Above the normal threshold but on a limit: expected, no trip.
        safety.evaluate(THRESHOLD + 50.0, true, 0, &mut seq, &mut relays, &mut sink);
        assert!(!safety.is_active());

        // Above the elevated threshold: trips even at the limit.
        safety.evaluate(THRESHOLD + tolerance, true, 1, &mut seq, &mut relays, &mut sink);
        assert!(safety.is_active());

        // Comes down under the elevated clear band: clears at the limit.
        safety.evaluate(
            THRESHOLD + tolerance - LIMIT_CLEAR_MARGIN_PSI - 1.0,
            true,
            2,
            &mut seq,
            &mut relays,
            &mut sink,
        );
        assert!(!safety.is_active());
    }

    #[test]
    fn manual_clear_ignores_pressure() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        safety.evaluate(THRESHOLD + 500.0, false, 0, &mut seq, &mut relays, &mut sink);
        assert!(safety.is_active());

        safety.clear_manual(&mut relays, &mut sink);
        assert!(!safety.is_active());
        assert!(!relays.is_safety_blocked());
    }

    #[test]
    fn activation_is_idempotent() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        safety.evaluate(THRESHOLD, false, 0, &mut seq, &mut relays, &mut sink);
        let events = sink.events.len();
        safety.evaluate(THRESHOLD + 100.0, false, 1, &mut seq, &mut relays, &mut sink);
        assert_eq!(sink.events.len(), events);
    }

    #[test]
    fn status_line_reports_state() {
        let (mut safety, mut seq, mut relays, mut sink) = rig();
        assert!(safety.status_line().contains("safety=OK"));
        safety.evaluate(THRESHOLD, false, 0, &mut seq, &mut relays, &mut sink);
        let line = safety.status_line();
        assert!(line.contains("safety=ACTIVE"));
        assert!(line.contains("engine=STOPPED"));
    }
}
