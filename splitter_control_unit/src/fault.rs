//! Latched system fault registry.
//!
//! Faults latch until explicitly cleared. Operators can acknowledge a fault
//! (mark it seen) without clearing it; clearing removes the acknowledgment
//! too. Raise/clear transitions are published to the event sink.

use tracing::{info, warn};

use splitter_common::consts::Millis;
use splitter_common::error::SystemFault;
use splitter_common::event::{ControlEvent, EventSink};

/// Active + acknowledged fault masks.
#[derive(Debug, Default)]
pub struct FaultRegistry {
    active: SystemFault,
    acknowledged: SystemFault,
    first_raised_at: Option<Millis>,
}

impl FaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a fault. Re-raising an already-active fault is a no-op.
    pub fn raise(&mut self, fault: SystemFault, now: Millis, sink: &mut dyn EventSink) {
        if self.active.contains(fault) {
            return;
        }
        if self.active.is_empty() {
            self.first_raised_at = Some(now);
        }
        self.active |= fault;
        warn!(fault = ?fault, "fault raised: {}", fault.description());
        sink.publish(&ControlEvent::FaultRaised { fault });
    }

    /// Clear a fault and its acknowledgment.
    pub fn clear(&mut self, fault: SystemFault, sink: &mut dyn EventSink) {
        if !self.active.intersects(fault) {
            return;
        }
        self.active &= !fault;
        self.acknowledged &= !fault;
        if self.active.is_empty() {
            self.first_raised_at = None;
        }
        info!(fault = ?fault, "fault cleared");
        sink.publish(&ControlEvent::FaultCleared { fault });
    }

    /// Acknowledge an active fault. Unknown or inactive faults are ignored.
    pub fn acknowledge(&mut self, fault: SystemFault) {
        let present = self.active & fault;
        self.acknowledged |= present;
    }

    /// Clear everything.
    pub fn clear_all(&mut self, sink: &mut dyn EventSink) {
        let active = self.active;
        if !active.is_empty() {
            self.clear(active, sink);
        }
    }

    #[inline]
    pub fn has(&self, fault: SystemFault) -> bool {
        self.active.contains(fault)
    }

    #[inline]
    pub fn active(&self) -> SystemFault {
        self.active
    }

    #[inline]
    pub fn unacknowledged(&self) -> SystemFault {
        self.active & !self.acknowledged
    }

    /// One-line status for the command interface.
    pub fn status_line(&self, now: Millis) -> String {
        if self.active.is_empty() {
            return "no active faults".to_string();
        }
        let age_s = self
            .first_raised_at
            .map(|t| now.saturating_sub(t) / 1_000)
            .unwrap_or(0);
        format!(
            "faults: {} active ({} unacked), age: {}s",
            self.active.iter().count(),
            self.unacknowledged().iter().count(),
            age_s
        )
    }

    /// Comma-separated listing of active faults with ack markers.
    pub fn list_active(&self) -> String {
        if self.active.is_empty() {
            return "no active faults".to_string();
        }
        let mut parts = Vec::new();
        for fault in self.active.iter() {
            let acked = if self.acknowledged.contains(fault) {
                "(ACK)"
            } else {
                ""
            };
            parts.push(format!("0x{:02X}:{}{}", fault.bits(), acked, fault.description()));
        }
        parts.join(", ")
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_common::event::MemorySink;

    #[test]
    fn raise_latches_and_publishes_once() {
        let mut reg = FaultRegistry::new();
        let mut sink = MemorySink::new();
        reg.raise(SystemFault::SEQUENCE_TIMEOUT, 100, &mut sink);
        reg.raise(SystemFault::SEQUENCE_TIMEOUT, 200, &mut sink);
        assert!(reg.has(SystemFault::SEQUENCE_TIMEOUT));
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn clear_removes_ack_too() {
        let mut reg = FaultRegistry::new();
        let mut sink = MemorySink::new();
        reg.raise(SystemFault::SENSOR_FAULT, 0, &mut sink);
        reg.acknowledge(SystemFault::SENSOR_FAULT);
        assert!(reg.unacknowledged().is_empty());
        reg.clear(SystemFault::SENSOR_FAULT, &mut sink);
        assert!(!reg.has(SystemFault::SENSOR_FAULT));
        // Re-raise arrives unacknowledged.
        reg.raise(SystemFault::SENSOR_FAULT, 0, &mut sink);
        assert_eq!(reg.unacknowledged(), SystemFault::SENSOR_FAULT);
    }

    #[test]
    fn acknowledge_only_touches_active() {
        let mut reg = FaultRegistry::new();
        reg.acknowledge(SystemFault::STORE_SAVE);
        assert!(reg.unacknowledged().is_empty());
        assert!(!reg.has(SystemFault::STORE_SAVE));
    }

    #[test]
    fn clear_all_empties_registry() {
        let mut reg = FaultRegistry::new();
        let mut sink = MemorySink::new();
        reg.raise(SystemFault::STORE_LOAD, 0, &mut sink);
        reg.raise(SystemFault::SENSOR_FAULT, 10, &mut sink);
        reg.clear_all(&mut sink);
        assert!(reg.active().is_empty());
        assert_eq!(reg.status_line(20), "no active faults");
    }

    #[test]
    fn listing_marks_acknowledged() {
        let mut reg = FaultRegistry::new();
        let mut sink = MemorySink::new();
        reg.raise(SystemFault::SEQUENCE_TIMEOUT, 0, &mut sink);
        reg.acknowledge(SystemFault::SEQUENCE_TIMEOUT);
        let listing = reg.list_active();
        assert!(listing.contains("0x10"));
        assert!(listing.contains("(ACK)"));
    }
}
