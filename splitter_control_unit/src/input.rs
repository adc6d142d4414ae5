//! Debounced digital input scanner.
//!
//! Raw electrical levels come in through [`InputPort`]; this module applies
//! NO/NC logic and a per-channel debounce window, and reports edge changes
//! with a full snapshot of all debounced channel states attached. A raw
//! flicker restarts the channel's debounce timer, so a state change is only
//! reported after the reading has held for the whole window.

use heapless::Vec;
use tracing::debug;

use splitter_common::consts::Millis;
use splitter_common::io::{
    CHANNEL_COUNT, CHANNEL_ROLES, ChannelId, ChannelRole, DiLogic, InputSnapshot,
};

/// Raw digital level source (one bool per watched channel, electrical sense).
pub trait InputPort {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT];
}

/// A debounced edge on one channel, with the post-change snapshot of all
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    pub channel: ChannelId,
    pub active: bool,
    pub snapshot: InputSnapshot,
}

impl InputChange {
    #[inline]
    pub fn role(&self) -> ChannelRole {
        // channel always originates from the fixed role table
        ChannelRole::from_id(self.channel).unwrap_or(ChannelRole::Start)
    }
}

/// Per-channel debounce state over the fixed role table.
#[derive(Debug, Clone)]
pub struct DebouncedInputs {
    logic: [DiLogic; CHANNEL_COUNT],
    debounce_ms: [Millis; CHANNEL_COUNT],
    last_reading: [bool; CHANNEL_COUNT],
    last_edge_at: [Millis; CHANNEL_COUNT],
    stable: InputSnapshot,
    primed: bool,
}

impl DebouncedInputs {
    /// Create a scanner with the given logic table and role-default
    /// debounce windows.
    pub fn new(logic: [DiLogic; CHANNEL_COUNT]) -> Self {
        let mut debounce_ms = [0; CHANNEL_COUNT];
        for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
            debounce_ms[idx] = role.default_debounce_ms();
        }
        Self {
            logic,
            debounce_ms,
            last_reading: [false; CHANNEL_COUNT],
            last_edge_at: [0; CHANNEL_COUNT],
            stable: [false; CHANNEL_COUNT],
            primed: false,
        }
    }

    /// Current debounced snapshot.
    #[inline]
    pub fn snapshot(&self) -> InputSnapshot {
        self.stable
    }

    /// Debounced state of one role.
    #[inline]
    pub fn active(&self, role: ChannelRole) -> bool {
        self.stable[role.id() as usize]
    }

    /// Scan one set of raw levels, returning the debounced changes.
    ///
    /// The first scan primes the stable states without reporting edges, so
    /// power-up wiring state never masquerades as operator action.
    pub fn scan(
        &mut self,
        levels: [bool; CHANNEL_COUNT],
        now: Millis,
    ) -> Vec<InputChange, CHANNEL_COUNT> {
        let mut changes = Vec::new();

        if !self.primed {
            for idx in 0..CHANNEL_COUNT {
                let reading = self.logic[idx].interpret(levels[idx]);
                self.last_reading[idx] = reading;
                self.stable[idx] = reading;
                self.last_edge_at[idx] = now;
            }
            self.primed = true;
            return changes;
        }

        for idx in 0..CHANNEL_COUNT {
            let reading = self.logic[idx].interpret(levels[idx]);

            if reading != self.last_reading[idx] {
                // Raw flicker: restart the debounce window.
                self.last_reading[idx] = reading;
                self.last_edge_at[idx] = now;
            }

            if self.last_reading[idx] != self.stable[idx]
                && now.saturating_sub(self.last_edge_at[idx]) >= self.debounce_ms[idx]
            {
                self.stable[idx] = self.last_reading[idx];
                debug!(
                    channel = %CHANNEL_ROLES[idx],
                    active = self.stable[idx],
                    "input change"
                );
                // Vec capacity equals CHANNEL_COUNT; push cannot fail.
                let _ = changes.push(InputChange {
                    channel: idx as ChannelId,
                    active: self.stable[idx],
                    snapshot: self.stable,
                });
            }
        }

        changes
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn default_logic() -> [DiLogic; CHANNEL_COUNT] {
        let mut logic = [DiLogic::NO; CHANNEL_COUNT];
        for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
            logic[idx] = role.default_logic();
        }
        logic
    }

    /// Raw levels that read "all inactive" under the default logic table
    /// (NC channels must be electrically high).
    fn idle_levels() -> [bool; CHANNEL_COUNT] {
        let mut levels = [false; CHANNEL_COUNT];
        for (idx, role) in CHANNEL_ROLES.iter().enumerate() {
            levels[idx] = matches!(role.default_logic(), DiLogic::NC);
        }
        levels
    }

    fn primed() -> DebouncedInputs {
        let mut inputs = DebouncedInputs::new(default_logic());
        let changes = inputs.scan(idle_levels(), 0);
        assert!(changes.is_empty());
        inputs
    }

    #[test]
    fn first_scan_primes_without_edges() {
        let inputs = primed();
        for role in CHANNEL_ROLES {
            assert!(!inputs.active(role), "{role} should prime inactive");
        }
    }

    #[test]
    fn press_reports_after_debounce_window() {
        let mut inputs = primed();
        let mut levels = idle_levels();
        levels[ChannelRole::Start.id() as usize] = true;

        // Within the window: no edge yet.
        assert!(inputs.scan(levels, 10).is_empty());
        assert!(!inputs.active(ChannelRole::Start));

        // Window elapsed.
        let changes = inputs.scan(levels, 10 + ChannelRole::Start.default_debounce_ms());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].role(), ChannelRole::Start);
        assert!(changes[0].active);
        assert!(changes[0].snapshot[ChannelRole::Start.id() as usize]);
    }

    #[test]
    fn flicker_restarts_window() {
        let mut inputs = primed();
        let mut pressed = idle_levels();
        pressed[ChannelRole::Start.id() as usize] = true;

        assert!(inputs.scan(pressed, 10).is_empty());
        // Bounce back before the window elapses.
        assert!(inputs.scan(idle_levels(), 15).is_empty());
        // Press again; the window restarts from the re-press.
        assert!(inputs.scan(pressed, 20).is_empty());
        assert!(inputs.scan(pressed, 30).is_empty());
        let changes = inputs.scan(pressed, 20 + ChannelRole::Start.default_debounce_ms());
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn nc_limit_switch_active_when_line_breaks() {
        let mut inputs = primed();
        let mut levels = idle_levels();
        // NC limit line drops (switch struck or wire broken) → active.
        levels[ChannelRole::LimitExtend.id() as usize] = false;

        let changes = inputs.scan(levels, 100 + ChannelRole::LimitExtend.default_debounce_ms());
        // First scan registers the raw edge, second confirms it.
        let changes = if changes.is_empty() {
            inputs.scan(levels, 200 + ChannelRole::LimitExtend.default_debounce_ms())
        } else {
            changes
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].role(), ChannelRole::LimitExtend);
        assert!(changes[0].active);
    }

    #[test]
    fn simultaneous_changes_all_reported() {
        let mut inputs = primed();
        let mut levels = idle_levels();
        levels[ChannelRole::Start.id() as usize] = true;
        levels[ChannelRole::JogExtend.id() as usize] = true;

        inputs.scan(levels, 10);
        let changes = inputs.scan(levels, 10 + BUTTON_WINDOW);
        assert_eq!(changes.len(), 2);
    }

    const BUTTON_WINDOW: Millis = splitter_common::consts::BUTTON_DEBOUNCE_MS;
}
