//! Latched system fault bitflags.
//!
//! Faults latch until explicitly cleared; operators may acknowledge a fault
//! to mark it as seen without clearing it. `SEQUENCE_TIMEOUT` accompanies
//! the sequence lockout and is treated as a suspected mechanical fault.

use bitflags::bitflags;

bitflags! {
    /// Latched system fault flags.
    ///
    /// Serde impls come from the bitflags `serde` feature (flags serialize
    /// as a `"A | B"` string in human-readable formats).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct SystemFault: u8 {
        /// Configuration store load failed (defaults in use).
        const STORE_LOAD       = 0x01;
        /// Configuration store save failed.
        const STORE_SAVE       = 0x02;
        /// Pressure channel returned a non-finite or out-of-range value.
        const SENSOR_FAULT     = 0x04;
        /// Configuration parameters rejected by validation.
        const CONFIG_INVALID   = 0x08;
        /// A run exceeded its timeout; sequence locked out.
        const SEQUENCE_TIMEOUT = 0x10;
        /// General hardware fault.
        const HARDWARE_FAULT   = 0x20;
    }
}

impl SystemFault {
    /// Human-readable description of a single-flag value.
    pub const fn description(&self) -> &'static str {
        match self.bits() {
            0x01 => "configuration load failed",
            0x02 => "configuration save failed",
            0x04 => "pressure sensor malfunction",
            0x08 => "configuration parameters invalid",
            0x10 => "sequence operation timeout",
            0x20 => "general hardware fault",
            _ => "unknown fault",
        }
    }
}

impl Default for SystemFault {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_cover_all_flags() {
        for fault in SystemFault::all().iter() {
            assert_ne!(fault.description(), "unknown fault", "{fault:?}");
        }
    }

    #[test]
    fn flags_are_disjoint() {
        let mut seen = 0u8;
        for fault in SystemFault::all().iter() {
            assert_eq!(seen & fault.bits(), 0);
            seen |= fault.bits();
        }
    }
}
