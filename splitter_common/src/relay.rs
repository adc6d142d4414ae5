//! Relay identifiers and command origin.
//!
//! Relay numbering follows the expansion board: R1/R2 drive the hydraulic
//! valve solenoids, R8 is the engine-stop relay, R9 powers the board itself.
//! R3–R7 are uncommitted.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::consts::RELAY_COUNT;

/// One controllable relay on the expansion board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayId {
    /// R1 — cylinder extend valve.
    Extend,
    /// R2 — cylinder retract valve.
    Retract,
    /// R3–R7 — uncommitted auxiliary relays.
    Aux(u8),
    /// R8 — engine stop (asserted = engine stopped).
    EngineStop,
    /// R9 — relay board power control.
    BoardPower,
}

impl RelayId {
    /// Board relay number (1-based).
    #[inline]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Extend => 1,
            Self::Retract => 2,
            Self::Aux(n) => *n,
            Self::EngineStop => 8,
            Self::BoardPower => 9,
        }
    }

    /// Convert from a board relay number. Returns `None` outside 1..=9.
    #[inline]
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Extend),
            2 => Some(Self::Retract),
            3..=7 => Some(Self::Aux(n)),
            8 => Some(Self::EngineStop),
            9 => Some(Self::BoardPower),
            _ => None,
        }
    }

    /// Cache index (0-based).
    #[inline]
    pub const fn index(&self) -> usize {
        (self.number() - 1) as usize
    }

    /// The hydraulically opposing relay, if any. Extend and retract must
    /// never be energized together.
    #[inline]
    pub const fn opposing(&self) -> Option<Self> {
        match self {
            Self::Extend => Some(Self::Retract),
            Self::Retract => Some(Self::Extend),
            _ => None,
        }
    }

    /// Power-control relays are exempt from the safety interlock's
    /// automatic-command block: the interlock itself must be able to drive
    /// them while active.
    #[inline]
    pub const fn is_power_control(&self) -> bool {
        matches!(self, Self::EngineStop | Self::BoardPower)
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.number())
    }
}

/// Provenance of a relay command.
///
/// Decides whether the safety interlock may block it: automatic
/// (sequence-driven) activations are blocked while safety is active,
/// deliberate operator commands are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Origin {
    /// Direct operator action (console, remote command interface).
    Manual = 0,
    /// Autonomous sequence or safety logic.
    Automatic = 1,
}

const _: () = assert!(RELAY_COUNT == 9);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_roundtrip() {
        for n in 1..=9u8 {
            let relay = RelayId::from_number(n).unwrap();
            assert_eq!(relay.number(), n);
            assert_eq!(relay.index(), (n - 1) as usize);
        }
        assert_eq!(RelayId::from_number(0), None);
        assert_eq!(RelayId::from_number(10), None);
    }

    #[test]
    fn hydraulic_relays_oppose_each_other() {
        assert_eq!(RelayId::Extend.opposing(), Some(RelayId::Retract));
        assert_eq!(RelayId::Retract.opposing(), Some(RelayId::Extend));
        assert_eq!(RelayId::EngineStop.opposing(), None);
        assert_eq!(RelayId::Aux(4).opposing(), None);
    }

    #[test]
    fn power_control_classification() {
        assert!(RelayId::EngineStop.is_power_control());
        assert!(RelayId::BoardPower.is_power_control());
        assert!(!RelayId::Extend.is_power_control());
    }

    #[test]
    fn display_uses_board_numbering() {
        assert_eq!(RelayId::Extend.to_string(), "R1");
        assert_eq!(RelayId::BoardPower.to_string(), "R9");
    }
}
