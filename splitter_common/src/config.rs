//! Persisted controller configuration with validation.
//!
//! All config types use `serde` for TOML round-tripping. Every numeric
//! parameter is range-checked by `validate()` before acceptance; optional
//! fields use `#[serde(default)]` so older files keep loading after fields
//! are added.

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_EXTEND_PRESSURE_LIMIT_PSI, DEFAULT_LIMIT_TOLERANCE_PSI,
    DEFAULT_RETRACT_PRESSURE_LIMIT_PSI, DEFAULT_SAFETY_HYSTERESIS_PSI,
    DEFAULT_SAFETY_THRESHOLD_PSI, DEFAULT_SEQUENCE_STABLE_MS,
    DEFAULT_SEQUENCE_START_STABLE_MS, DEFAULT_SEQUENCE_TIMEOUT_MS, Millis, PRESSURE_PSI_MAX,
    SEQUENCE_STABLE_MS_MAX, SEQUENCE_TIMEOUT_MS_MAX, SEQUENCE_TIMEOUT_MS_MIN,
};
use crate::io::{CHANNEL_COUNT, CHANNEL_ROLES, ChannelRole, DiLogic};

// ─── Sequence Timing ────────────────────────────────────────────────

/// Timing parameters of the sequence state machine.
///
/// Mutable at runtime through the command interface; persisted on change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceTiming {
    /// Limit-signal debounce-before-trust duration [ms].
    #[serde(default = "default_stable_ms")]
    pub stable_ms: Millis,
    /// Start-button confirmation duration [ms].
    #[serde(default = "default_start_stable_ms")]
    pub start_stable_ms: Millis,
    /// Maximum time a run may spend outside Idle [ms].
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Millis,
}

fn default_stable_ms() -> Millis {
    DEFAULT_SEQUENCE_STABLE_MS
}
fn default_start_stable_ms() -> Millis {
    DEFAULT_SEQUENCE_START_STABLE_MS
}
fn default_timeout_ms() -> Millis {
    DEFAULT_SEQUENCE_TIMEOUT_MS
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            stable_ms: DEFAULT_SEQUENCE_STABLE_MS,
            start_stable_ms: DEFAULT_SEQUENCE_START_STABLE_MS,
            timeout_ms: DEFAULT_SEQUENCE_TIMEOUT_MS,
        }
    }
}

impl SequenceTiming {
    /// Validate parameter bounds.
    ///
    /// The timeout must exceed both stability windows by a wide margin; a
    /// window that can outlast the run timeout would abort every cycle.
    pub fn validate(&self) -> Result<(), String> {
        if self.stable_ms > SEQUENCE_STABLE_MS_MAX {
            return Err(format!(
                "stable_ms {} out of range [0, {SEQUENCE_STABLE_MS_MAX}]",
                self.stable_ms
            ));
        }
        if self.start_stable_ms > SEQUENCE_STABLE_MS_MAX {
            return Err(format!(
                "start_stable_ms {} out of range [0, {SEQUENCE_STABLE_MS_MAX}]",
                self.start_stable_ms
            ));
        }
        if self.timeout_ms < SEQUENCE_TIMEOUT_MS_MIN || self.timeout_ms > SEQUENCE_TIMEOUT_MS_MAX {
            return Err(format!(
                "timeout_ms {} out of range [{SEQUENCE_TIMEOUT_MS_MIN}, {SEQUENCE_TIMEOUT_MS_MAX}]",
                self.timeout_ms
            ));
        }
        let widest_window = self.stable_ms.max(self.start_stable_ms);
        if self.timeout_ms < widest_window.saturating_mul(10) {
            return Err(format!(
                "timeout_ms {} must be at least 10x the widest stability window ({widest_window})",
                self.timeout_ms
            ));
        }
        Ok(())
    }
}

// ─── Safety Tuning ──────────────────────────────────────────────────

/// Pressure thresholds for the safety interlock and sequence fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Over-pressure activation threshold [PSI].
    #[serde(default = "default_threshold_psi")]
    pub threshold_psi: f32,
    /// Hysteresis below the threshold before clearing [PSI].
    #[serde(default = "default_hysteresis_psi")]
    pub hysteresis_psi: f32,
    /// Extra tolerance above the threshold while on a travel limit [PSI].
    #[serde(default = "default_limit_tolerance_psi")]
    pub limit_tolerance_psi: f32,
    /// Pressure ceiling treated as "extend limit reached" [PSI].
    #[serde(default = "default_extend_pressure_limit")]
    pub extend_pressure_limit_psi: f32,
    /// Pressure ceiling treated as "retract limit reached" [PSI].
    #[serde(default = "default_retract_pressure_limit")]
    pub retract_pressure_limit_psi: f32,
}

fn default_threshold_psi() -> f32 {
    DEFAULT_SAFETY_THRESHOLD_PSI
}
fn default_hysteresis_psi() -> f32 {
    DEFAULT_SAFETY_HYSTERESIS_PSI
}
fn default_limit_tolerance_psi() -> f32 {
    DEFAULT_LIMIT_TOLERANCE_PSI
}
fn default_extend_pressure_limit() -> f32 {
    DEFAULT_EXTEND_PRESSURE_LIMIT_PSI
}
fn default_retract_pressure_limit() -> f32 {
    DEFAULT_RETRACT_PRESSURE_LIMIT_PSI
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            threshold_psi: DEFAULT_SAFETY_THRESHOLD_PSI,
            hysteresis_psi: DEFAULT_SAFETY_HYSTERESIS_PSI,
            limit_tolerance_psi: DEFAULT_LIMIT_TOLERANCE_PSI,
            extend_pressure_limit_psi: DEFAULT_EXTEND_PRESSURE_LIMIT_PSI,
            retract_pressure_limit_psi: DEFAULT_RETRACT_PRESSURE_LIMIT_PSI,
        }
    }
}

impl SafetyConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold_psi <= 0.0 || self.threshold_psi > PRESSURE_PSI_MAX {
            return Err(format!(
                "threshold_psi {} out of range (0, {PRESSURE_PSI_MAX}]",
                self.threshold_psi
            ));
        }
        if self.hysteresis_psi < 0.0 || self.hysteresis_psi >= self.threshold_psi {
            return Err(format!(
                "hysteresis_psi {} must be in [0, threshold)",
                self.hysteresis_psi
            ));
        }
        if self.limit_tolerance_psi < 0.0 || self.limit_tolerance_psi > PRESSURE_PSI_MAX {
            return Err(format!(
                "limit_tolerance_psi {} out of range [0, {PRESSURE_PSI_MAX}]",
                self.limit_tolerance_psi
            ));
        }
        for (name, value) in [
            ("extend_pressure_limit_psi", self.extend_pressure_limit_psi),
            ("retract_pressure_limit_psi", self.retract_pressure_limit_psi),
        ] {
            if value <= 0.0 || value > PRESSURE_PSI_MAX {
                return Err(format!("{name} {value} out of range (0, {PRESSURE_PSI_MAX}]"));
            }
            // Stage pressure limits sit below the safety threshold so normal
            // stage completion never rides through a safety activation.
            if value >= self.threshold_psi {
                return Err(format!("{name} {value} must be below threshold_psi"));
            }
        }
        Ok(())
    }
}

// ─── Pressure Filtering ─────────────────────────────────────────────

/// Prefilter applied to raw pressure samples before averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FilterMode {
    None = 0,
    Median3 = 1,
    Ema = 2,
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Median3
    }
}

/// Pressure channel filtering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureConfig {
    #[serde(default)]
    pub filter: FilterMode,
    /// EMA smoothing factor (only used with `FilterMode::Ema`).
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,
}

fn default_ema_alpha() -> f32 {
    0.2
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            filter: FilterMode::default(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

impl PressureConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ema_alpha <= 0.0 || self.ema_alpha > 1.0 {
            return Err(format!("ema_alpha {} out of range (0, 1]", self.ema_alpha));
        }
        Ok(())
    }
}

// ─── Channel Logic Overrides ────────────────────────────────────────

/// Electrical logic override for one input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelModeEntry {
    pub role: ChannelRole,
    pub logic: DiLogic,
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete persisted controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Echo relay board serial traffic to the debug log.
    #[serde(default = "default_relay_echo")]
    pub relay_echo: bool,
    #[serde(default)]
    pub timing: SequenceTiming,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub pressure: PressureConfig,
    /// NO/NC overrides; channels not listed keep their role default.
    #[serde(default)]
    pub channels: Vec<ChannelModeEntry>,
}

fn default_relay_echo() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timing: SequenceTiming::default(),
            safety: SafetyConfig::default(),
            pressure: PressureConfig::default(),
            channels: Vec::new(),
            relay_echo: true,
        }
    }
}

impl ControllerConfig {
    /// Validate every section and the channel override table.
    pub fn validate(&self) -> Result<(), String> {
        self.timing.validate()?;
        self.safety.validate()?;
        self.pressure.validate()?;
        let mut seen = [false; CHANNEL_COUNT];
        for entry in &self.channels {
            let idx = entry.role.id() as usize;
            if seen[idx] {
                return Err(format!("duplicate channel override for {}", entry.role));
            }
            seen[idx] = true;
        }
        Ok(())
    }

    /// Effective logic table, role defaults plus overrides.
    pub fn channel_logic(&self) -> [DiLogic; CHANNEL_COUNT] {
        let mut logic = [DiLogic::NO; CHANNEL_COUNT];
        for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
            logic[idx] = role.default_logic();
        }
        for entry in &self.channels {
            logic[entry.role.id() as usize] = entry.logic;
        }
        logic
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
