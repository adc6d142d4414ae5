//! Safety subsystem: over-pressure interlock and emergency-stop latch.

pub mod estop;
pub mod interlock;

pub use estop::{EmergencyStop, EstopResetError};
pub use interlock::SafetySystem;
