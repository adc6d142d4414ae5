//! Emergency-stop latch.
//!
//! Two independent booleans: `live` tracks the current assertion of the
//! dedicated e-stop channel, `latched` persists after `live` clears until an
//! explicit reset command is accepted. `live == false` never implies
//! `latched == false`.
//!
//! The e-stop edge is handled before any other input in a cycle, and an
//! asserted edge short-circuits the rest of that cycle's input handling.

use thiserror::Error;
use tracing::{info, warn};

use splitter_common::consts::Millis;
use splitter_common::event::{ControlEvent, EventSink};
use splitter_common::relay::RelayId;

use crate::relay::RelayController;
use crate::safety::interlock::SafetySystem;
use crate::sequence::SequenceController;

/// Why an e-stop reset command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstopResetError {
    /// The e-stop input is still asserted; release it first.
    #[error("e-stop input still asserted")]
    StillAsserted,
    /// Nothing to reset.
    #[error("e-stop not latched")]
    NotLatched,
}

/// The emergency-stop latch.
#[derive(Debug, Default)]
pub struct EmergencyStop {
    live: bool,
    latched: bool,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }

    #[inline]
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Whether sequence operation is inhibited (asserted or latched).
    #[inline]
    pub fn inhibits(&self) -> bool {
        self.live || self.latched
    }

    /// React to a debounced edge on the e-stop channel.
    ///
    /// A rising edge latches, aborts the run, drops every relay except
    /// board power, and stops the engine. A falling edge only clears
    /// `live` — the latch stands until `try_reset`.
    pub fn on_edge(
        &mut self,
        asserted: bool,
        now: Millis,
        seq: &mut SequenceController,
        safety: &mut SafetySystem,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) {
        self.live = asserted;

        if asserted {
            let first = !self.latched;
            self.latched = true;
            warn!("EMERGENCY STOP asserted");

            if seq.is_active() {
                seq.abort("emergency_stop", now, relays, sink);
            }
            relays.all_off(Some(RelayId::BoardPower), sink);
            safety.set_engine_stop(true, relays, sink);

            if first {
                sink.publish(&ControlEvent::EstopLatched);
            }
        } else {
            info!("e-stop input released (latch stands)");
        }
    }

    /// Operator reset. Refused while the input is still asserted.
    pub fn try_reset(
        &mut self,
        safety: &mut SafetySystem,
        relays: &mut RelayController,
        sink: &mut dyn EventSink,
    ) -> Result<(), EstopResetError> {
        if self.live {
            return Err(EstopResetError::StillAsserted);
        }
        if !self.latched {
            return Err(EstopResetError::NotLatched);
        }
        self.latched = false;
        info!("e-stop latch reset");

        // Restart the engine only if the pressure interlock is quiet; a
        // still-active safety condition keeps it stopped.
        if !safety.is_active() {
            safety.set_engine_stop(false, relays, sink);
        }

        sink.publish(&ControlEvent::EstopReset);
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_common::config::{SafetyConfig, SequenceTiming};
    use splitter_common::event::MemorySink;
    use splitter_common::io::{CHANNEL_COUNT, ChannelRole};

    use crate::fault::FaultRegistry;
    use crate::input::InputChange;
    use crate::relay::RelayLink;

    struct NullLink;
    impl RelayLink for NullLink {
        fn transmit(&mut self, _relay: RelayId, _on: bool) {}
    }

    struct Rig {
        estop: EmergencyStop,
        safety: SafetySystem,
        seq: SequenceController,
        relays: RelayController,
        sink: MemorySink,
    }

    impl Rig {
        fn new() -> Self {
            let config = SafetyConfig::default();
            Self {
                estop: EmergencyStop::new(),
                safety: SafetySystem::new(config),
                seq: SequenceController::new(SequenceTiming::default(), &config),
                relays: RelayController::new(Box::new(NullLink)),
                sink: MemorySink::new(),
            }
        }

        fn edge(&mut self, asserted: bool, now: Millis) {
            self.estop.on_edge(
                asserted,
                now,
                &mut self.seq,
                &mut self.safety,
                &mut self.relays,
                &mut self.sink,
            );
        }

        fn reset(&mut self) -> Result<(), EstopResetError> {
            self.estop
                .try_reset(&mut self.safety, &mut self.relays, &mut self.sink)
        }

        fn start_run(&mut self) {
            let mut snapshot = [false; CHANNEL_COUNT];
            snapshot[ChannelRole::Start.id() as usize] = true;
            let change = InputChange {
                channel: ChannelRole::Start.id(),
                active: true,
                snapshot,
            };
            self.seq
                .process_input_change(&change, 0, &mut self.relays, &mut self.sink);
            let mut faults = FaultRegistry::new();
            self.seq.tick(
                SequenceTiming::default().start_stable_ms,
                0.0,
                &snapshot,
                &mut self.relays,
                &mut faults,
                &mut self.sink,
            );
            assert!(self.seq.is_active());
        }
    }

    #[test]
    fn rising_edge_latches_and_sweeps() {
        let mut rig = Rig::new();
        rig.start_run();

        rig.edge(true, 1_000);
        assert!(rig.estop.is_live());
        assert!(rig.estop.is_latched());
        assert!(!rig.seq.is_active());
        assert_eq!(rig.sink.last_abort_reason(), Some("emergency_stop"));
        assert!(!rig.relays.get(RelayId::Extend));
        assert!(!rig.relays.get(RelayId::Retract));
        assert!(rig.relays.get(RelayId::EngineStop));
        assert!(rig.sink.contains("estop_latched"));
    }

    #[test]
    fn release_does_not_unlatch() {
        let mut rig = Rig::new();
        rig.edge(true, 0);
        rig.edge(false, 100);
        assert!(!rig.estop.is_live());
        assert!(rig.estop.is_latched());
        assert!(rig.estop.inhibits());
    }

    #[test]
    fn reset_refused_while_asserted() {
        let mut rig = Rig::new();
        rig.edge(true, 0);
        assert_eq!(rig.reset(), Err(EstopResetError::StillAsserted));
        assert!(rig.estop.is_latched());
    }

    #[test]
    fn reset_refused_when_not_latched() {
        let mut rig = Rig::new();
        assert_eq!(rig.reset(), Err(EstopResetError::NotLatched));
    }

    #[test]
    fn reset_after_release_clears_latch_and_restarts_engine() {
        let mut rig = Rig::new();
        rig.edge(true, 0);
        rig.edge(false, 100);
        assert_eq!(rig.reset(), Ok(()));
        assert!(!rig.estop.is_latched());
        assert!(!rig.estop.inhibits());
        assert!(!rig.safety.is_engine_stopped());
        assert!(rig.sink.contains("estop_reset"));
    }

    #[test]
    fn reset_keeps_engine_stopped_while_safety_active() {
        let mut rig = Rig::new();
        // Pressure interlock trips independently of the e-stop.
        rig.safety.evaluate(
            5_000.0,
            false,
            0,
            &mut rig.seq,
            &mut rig.relays,
            &mut rig.sink,
        );
        rig.edge(true, 10);
        rig.edge(false, 20);
        assert_eq!(rig.reset(), Ok(()));
        // Latch cleared, but the engine stays stopped under the interlock.
        assert!(rig.safety.is_engine_stopped());
    }

    #[test]
    fn second_assert_does_not_republish_latch_event() {
        let mut rig = Rig::new();
        rig.edge(true, 0);
        rig.edge(false, 10);
        rig.edge(true, 20);
        let latches = rig
            .sink
            .events
            .iter()
            .filter(|e| e.name() == "estop_latched")
            .count();
        assert_eq!(latches, 1);
    }
}
