//! Dispatch counters
//!
//! Atomic counters for what happened to inbound packets, readable while
//! dispatch is running on other tasks.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Packets a handler accepted
    pub handled: AtomicU64,
    /// Packets with no registered handler
    pub unknown_opcode: AtomicU64,
    /// Packets dropped on a decode or handler error
    pub dropped: AtomicU64,
    /// Relay copies queued on recipient connections
    pub relayed: AtomicU64,
    /// Relay copies a recipient refused
    pub relay_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub handled: u64,
    pub unknown_opcode: u64,
    pub dropped: u64,
    pub relayed: u64,
    pub relay_failures: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self) {
        self.unknown_opcode.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay(&self, delivered: usize, failed: usize) {
        self.relayed.fetch_add(delivered as u64, Ordering::Relaxed);
        self.relay_failures.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            unknown_opcode: self.unknown_opcode.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
        }
    }

    /// Log the current counters at info level
    pub fn log_summary(&self) {
        let snap = self.snapshot();
        tracing::info!(
            handled = snap.handled,
            unknown_opcode = snap.unknown_opcode,
            dropped = snap.dropped,
            relayed = snap.relayed,
            relay_failures = snap.relay_failures,
            "Dispatch summary"
        );
    }
}
