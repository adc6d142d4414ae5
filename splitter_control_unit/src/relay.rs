//! Interlock-aware relay gate.
//!
//! `RelayController` owns the authoritative cache of every relay's commanded
//! state. All writes — sequence, safety sweep, operator commands — go
//! through [`RelayController::set`], which is the only path to the hardware
//! link. The gate is idempotent (no downstream write when the request
//! matches the cache), blocks *automatic* activations while the safety flag
//! is set, and refuses to energize a hydraulic relay while its opposite is
//! energized.
//!
//! Turning a relay off is always honored, whatever the safety state or the
//! command origin.

use tracing::{debug, warn};

use splitter_common::consts::RELAY_COUNT;
use splitter_common::event::{ControlEvent, EventSink};
use splitter_common::relay::{Origin, RelayId};

/// Fire-and-forget transport to the relay expansion board.
///
/// The core does not wait for acknowledgment; a write that is lost in
/// transit is corrected by the next state change.
pub trait RelayLink {
    fn transmit(&mut self, relay: RelayId, on: bool);
}

/// Wire frame for the board's text protocol.
pub fn frame(relay: RelayId, on: bool) -> String {
    format!("{relay} {}", if on { "ON" } else { "OFF" })
}

/// Outcome of a `set` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// State changed; hardware write issued.
    Applied,
    /// Requested state already cached; nothing sent.
    NoChange,
    /// Automatic activation refused while safety is active.
    BlockedBySafety,
    /// Activation refused: the opposing hydraulic relay is energized.
    Interlocked,
}

/// Origin-aware, idempotent relay gate.
pub struct RelayController {
    cache: [bool; RELAY_COUNT],
    safety_blocked: bool,
    link: Box<dyn RelayLink + Send>,
}

impl RelayController {
    /// Create a gate with all relays cached off.
    pub fn new(link: Box<dyn RelayLink + Send>) -> Self {
        Self {
            cache: [false; RELAY_COUNT],
            safety_blocked: false,
            link,
        }
    }

    /// Request a relay state change.
    pub fn set(
        &mut self,
        relay: RelayId,
        on: bool,
        origin: Origin,
        sink: &mut dyn EventSink,
    ) -> SetOutcome {
        if self.cache[relay.index()] == on {
            return SetOutcome::NoChange;
        }

        // Safety gate: automatic activations are blocked while safety is
        // active. OFF requests and deliberate operator commands pass;
        // power-control relays pass so the interlock can drive them.
        if on
            && self.safety_blocked
            && origin == Origin::Automatic
            && !relay.is_power_control()
        {
            warn!(%relay, "safety active - blocking automatic activation");
            return SetOutcome::BlockedBySafety;
        }

        // Hydraulic interlock: extend and retract must never be energized
        // together, no matter who asks.
        if on {
            if let Some(opposing) = relay.opposing() {
                if self.cache[opposing.index()] {
                    warn!(%relay, %opposing, "interlock - opposing relay energized");
                    return SetOutcome::Interlocked;
                }
            }
        }

        if self.safety_blocked && origin == Origin::Manual {
            debug!(%relay, on, "manual override during safety condition");
        }

        self.link.transmit(relay, on);
        self.cache[relay.index()] = on;
        debug!(%relay, on, ?origin, "relay set");
        sink.publish(&ControlEvent::ActuatorChanged { relay, on });
        SetOutcome::Applied
    }

    /// Cached commanded state of a relay.
    #[inline]
    pub fn get(&self, relay: RelayId) -> bool {
        self.cache[relay.index()]
    }

    /// Turn every relay off, optionally sparing one.
    ///
    /// Used by the safety interlock's emergency sweep. OFF is never
    /// blocked, so this succeeds in every gate state.
    pub fn all_off(&mut self, except: Option<RelayId>, sink: &mut dyn EventSink) {
        for number in 1..=RELAY_COUNT as u8 {
            // Relay numbers 1..=RELAY_COUNT always map to a RelayId.
            let Some(relay) = RelayId::from_number(number) else {
                continue;
            };
            if Some(relay) == except {
                continue;
            }
            self.set(relay, false, Origin::Automatic, sink);
        }
    }

    /// Set the safety-block flag. Only the safety interlock calls this.
    pub fn set_safety_blocked(&mut self, blocked: bool) {
        self.safety_blocked = blocked;
    }

    /// Whether automatic activations are currently blocked.
    #[inline]
    pub fn is_safety_blocked(&self) -> bool {
        self.safety_blocked
    }

    /// One-line status for the command interface.
    pub fn status_line(&self) -> String {
        let mut line = String::from("relays:");
        for number in 1..=RELAY_COUNT as u8 {
            if let Some(relay) = RelayId::from_number(number) {
                line.push_str(&format!(
                    " {relay}={}",
                    if self.get(relay) { "ON" } else { "OFF" }
                ));
            }
        }
        line.push_str(&format!(
            " safety={}",
            if self.safety_blocked { "ACTIVE" } else { "OFF" }
        ));
        line
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
