//! Shared constants for the LogSplitter control workspace.
//!
//! Defaults and bounds come from the machine's commissioning values; the
//! configuration layer range-checks every runtime override against the
//! `*_MIN`/`*_MAX` bounds defined here.

use static_assertions::const_assert;

/// Monotonic milliseconds since controller start.
pub type Millis = u64;

// ─── Cycle Timing ───────────────────────────────────────────────────

/// Target control cycle time [µs] (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1_000;
pub const CYCLE_TIME_US_MIN: u32 = 100;
pub const CYCLE_TIME_US_MAX: u32 = 100_000;

/// Status/telemetry publication interval [cycles].
pub const STATUS_PUBLISH_INTERVAL: u64 = 1_000;

// ─── Sequence Timing ────────────────────────────────────────────────

/// Limit-signal stability window [ms]. Short: the cylinder moves fast and
/// the switches carry real contact bounce.
pub const DEFAULT_SEQUENCE_STABLE_MS: u64 = 15;

/// Start-button confirmation window [ms].
pub const DEFAULT_SEQUENCE_START_STABLE_MS: u64 = 100;

/// Maximum time a run may spend outside Idle [ms].
pub const DEFAULT_SEQUENCE_TIMEOUT_MS: u64 = 30_000;

/// Upper bound accepted for either stability window [ms].
pub const SEQUENCE_STABLE_MS_MAX: u64 = 10_000;

/// Accepted range for the run timeout [ms].
pub const SEQUENCE_TIMEOUT_MS_MIN: u64 = 1_000;
pub const SEQUENCE_TIMEOUT_MS_MAX: u64 = 600_000;

// The timeout must dwarf both stability windows; a run that can time out
// while a window is still counting would abort every cycle.
const_assert!(DEFAULT_SEQUENCE_TIMEOUT_MS > 10 * DEFAULT_SEQUENCE_START_STABLE_MS);
const_assert!(DEFAULT_SEQUENCE_TIMEOUT_MS > 10 * DEFAULT_SEQUENCE_STABLE_MS);

// ─── Input Debounce ─────────────────────────────────────────────────

/// Debounce window for operator buttons [ms].
pub const BUTTON_DEBOUNCE_MS: u64 = 15;

/// Debounce window for cylinder limit switches [ms]. Tighter: the switch is
/// struck by a moving ram and must be trusted quickly.
pub const LIMIT_SWITCH_DEBOUNCE_MS: u64 = 10;

/// Debounce window for the emergency-stop input [ms].
pub const ESTOP_DEBOUNCE_MS: u64 = 5;

// ─── Pressure ───────────────────────────────────────────────────────

/// Interval between accepted pressure samples [ms].
pub const PRESSURE_SAMPLE_INTERVAL_MS: u64 = 100;

/// Moving-average window [samples] (1 s at the sample interval).
pub const PRESSURE_SAMPLE_WINDOW: usize = 10;

/// Over-pressure safety threshold [PSI].
pub const DEFAULT_SAFETY_THRESHOLD_PSI: f32 = 2_500.0;

/// Hysteresis below the threshold before safety clears [PSI].
pub const DEFAULT_SAFETY_HYSTERESIS_PSI: f32 = 10.0;

/// Extra tolerance above the threshold while the cylinder sits on a travel
/// limit, where end-of-travel pressure spikes are expected [PSI].
pub const DEFAULT_LIMIT_TOLERANCE_PSI: f32 = 200.0;

/// Clear margin below the elevated (at-limit) threshold [PSI].
pub const LIMIT_CLEAR_MARGIN_PSI: f32 = 50.0;

/// Pressure ceiling that counts as "extend limit reached" [PSI].
pub const DEFAULT_EXTEND_PRESSURE_LIMIT_PSI: f32 = 2_300.0;

/// Pressure ceiling that counts as "retract limit reached" [PSI].
pub const DEFAULT_RETRACT_PRESSURE_LIMIT_PSI: f32 = 2_300.0;

/// Largest plausible reading from any pressure channel [PSI].
pub const PRESSURE_PSI_MAX: f32 = 10_000.0;

// ─── Relays ─────────────────────────────────────────────────────────

/// Number of relays on the expansion board.
pub const RELAY_COUNT: usize = 9;

/// Serial baud rate of the relay expansion board.
pub const RELAY_BAUD: u32 = 115_200;
