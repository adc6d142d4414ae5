//! Input channel roles and digital logic types.
//!
//! Channels are identified by stable logical IDs (the `ChannelRole`
//! discriminant), not by pin numbers: the wiring lives at the hardware port
//! boundary, the core only ever speaks roles. Each role carries a default
//! electrical logic (NO/NC) and debounce window; both are overridable from
//! configuration.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::consts::{
    BUTTON_DEBOUNCE_MS, ESTOP_DEBOUNCE_MS, LIMIT_SWITCH_DEBOUNCE_MS, Millis,
};

/// Number of watched digital input channels.
pub const CHANNEL_COUNT: usize = 7;

/// Stable logical channel ID — the `ChannelRole` discriminant.
pub type ChannelId = u8;

// ─── DiLogic ────────────────────────────────────────────────────────

/// Digital input logic interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiLogic {
    /// Normally Open — active when the signal is present.
    #[serde(rename = "NO")]
    NO = 0,
    /// Normally Closed — inverted (wire break reads active).
    #[serde(rename = "NC")]
    NC = 1,
}

impl Default for DiLogic {
    fn default() -> Self {
        Self::NO
    }
}

impl DiLogic {
    /// Map a raw electrical level to the logical "active" value.
    #[inline]
    pub const fn interpret(&self, level: bool) -> bool {
        match self {
            Self::NO => level,
            Self::NC => !level,
        }
    }
}

impl FromStr for DiLogic {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO" => Ok(Self::NO),
            "NC" => Ok(Self::NC),
            _ => Err(format!("unknown DiLogic: {s:?}, expected \"NO\" or \"NC\"")),
        }
    }
}

// ─── ChannelRole ────────────────────────────────────────────────────

/// Functional role of a watched digital input channel.
///
/// The discriminant doubles as the channel's logical ID, so the role table
/// is fixed at compile time while NO/NC logic and debounce windows remain
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChannelRole {
    /// Sequence start button.
    Start = 0,
    /// Cylinder fully-extended limit switch.
    LimitExtend = 1,
    /// Cylinder fully-retracted limit switch.
    LimitRetract = 2,
    /// Emergency-stop input.
    EStop = 3,
    /// Operator safety-clear button.
    SafetyClear = 4,
    /// Manual jog: extend.
    JogExtend = 5,
    /// Manual jog: retract.
    JogRetract = 6,
}

/// All roles, indexable by `ChannelId`.
pub const CHANNEL_ROLES: [ChannelRole; CHANNEL_COUNT] = [
    ChannelRole::Start,
    ChannelRole::LimitExtend,
    ChannelRole::LimitRetract,
    ChannelRole::EStop,
    ChannelRole::SafetyClear,
    ChannelRole::JogExtend,
    ChannelRole::JogRetract,
];

impl ChannelRole {
    /// Convert from a channel ID. Returns `None` for out-of-range IDs.
    #[inline]
    pub const fn from_id(id: ChannelId) -> Option<Self> {
        if (id as usize) < CHANNEL_COUNT {
            Some(CHANNEL_ROLES[id as usize])
        } else {
            None
        }
    }

    /// The channel ID this role is bound to.
    #[inline]
    pub const fn id(&self) -> ChannelId {
        *self as u8
    }

    /// Operator-button class: a fresh activation of one of these during a
    /// run is an abort trigger.
    #[inline]
    pub const fn is_operator_button(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::SafetyClear | Self::JogExtend | Self::JogRetract
        )
    }

    /// Cylinder travel limit switch class.
    #[inline]
    pub const fn is_limit_switch(&self) -> bool {
        matches!(self, Self::LimitExtend | Self::LimitRetract)
    }

    /// Default electrical logic. Limit switches and the e-stop are wired NC
    /// so a broken wire reads as asserted.
    #[inline]
    pub const fn default_logic(&self) -> DiLogic {
        match self {
            Self::LimitExtend | Self::LimitRetract | Self::EStop => DiLogic::NC,
            _ => DiLogic::NO,
        }
    }

    /// Default debounce window [ms].
    #[inline]
    pub const fn default_debounce_ms(&self) -> Millis {
        match self {
            Self::EStop => ESTOP_DEBOUNCE_MS,
            Self::LimitExtend | Self::LimitRetract => LIMIT_SWITCH_DEBOUNCE_MS,
            _ => BUTTON_DEBOUNCE_MS,
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::LimitExtend => "limit_extend",
            Self::LimitRetract => "limit_retract",
            Self::EStop => "estop",
            Self::SafetyClear => "safety_clear",
            Self::JogExtend => "jog_extend",
            Self::JogRetract => "jog_retract",
        };
        write!(f, "{name}")
    }
}

// ─── Pressure Channels ──────────────────────────────────────────────

/// Analog pressure channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PressureChannel {
    /// Main hydraulic system pressure — drives safety and sequence fusion.
    Hydraulic = 0,
    /// Hydraulic oil/filter pressure — telemetry only.
    HydraulicOil = 1,
}

/// Snapshot of all debounced channel states, indexed by `ChannelId`.
pub type InputSnapshot = [bool; CHANNEL_COUNT];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_match_table_order() {
        for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
            assert_eq!(role.id() as usize, idx);
            assert_eq!(ChannelRole::from_id(idx as u8), Some(*role));
        }
        assert_eq!(ChannelRole::from_id(CHANNEL_COUNT as u8), None);
    }

    #[test]
    fn nc_inverts_level() {
        assert!(DiLogic::NC.interpret(false));
        assert!(!DiLogic::NC.interpret(true));
        assert!(DiLogic::NO.interpret(true));
    }

    #[test]
    fn fail_safe_channels_default_nc() {
        assert_eq!(ChannelRole::LimitExtend.default_logic(), DiLogic::NC);
        assert_eq!(ChannelRole::LimitRetract.default_logic(), DiLogic::NC);
        assert_eq!(ChannelRole::EStop.default_logic(), DiLogic::NC);
        assert_eq!(ChannelRole::Start.default_logic(), DiLogic::NO);
    }

    #[test]
    fn button_classification() {
        assert!(ChannelRole::Start.is_operator_button());
        assert!(ChannelRole::JogRetract.is_operator_button());
        assert!(!ChannelRole::LimitExtend.is_operator_button());
        assert!(!ChannelRole::EStop.is_operator_button());
    }
}
