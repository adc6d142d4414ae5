//! Sequence state machine enum.
//!
//! `#[repr(u8)]` for compact telemetry transport. `Idle` is both the initial
//! state and the terminal state of every run: completed and aborted runs
//! alike return to it, and no state is entered twice within one run without
//! passing back through `Idle`.

use serde::{Deserialize, Serialize};

/// State of the two-stage hydraulic split/return cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SequenceState {
    /// No run in progress. Initial and terminal state of every run.
    Idle = 0,
    /// Start input seen; confirming it holds for the start window.
    WaitStartDebounce = 1,
    /// Extend valve energized, ram moving out.
    Stage1Active = 2,
    /// Extend exit condition seen; stability window counting.
    Stage1WaitLimit = 3,
    /// Retract valve energized, ram moving back.
    Stage2Active = 4,
    /// Retract exit condition seen; stability window counting.
    Stage2WaitLimit = 5,
}

impl SequenceState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::WaitStartDebounce),
            2 => Some(Self::Stage1Active),
            3 => Some(Self::Stage1WaitLimit),
            4 => Some(Self::Stage2Active),
            5 => Some(Self::Stage2WaitLimit),
            _ => None,
        }
    }

    /// Hydraulic stage this state belongs to: 1 = extending, 2 = retracting,
    /// 0 = not driving the cylinder.
    #[inline]
    pub const fn stage(&self) -> u8 {
        match self {
            Self::Stage1Active | Self::Stage1WaitLimit => 1,
            Self::Stage2Active | Self::Stage2WaitLimit => 2,
            Self::Idle | Self::WaitStartDebounce => 0,
        }
    }

    /// Whether a run is in progress (anything but `Idle`).
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::Idle
    }
}
