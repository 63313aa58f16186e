//! Counters for the ranking engine
//!
//! Lock-free counters updated on the hot path and read as a serializable
//! snapshot for logging. Rejections are broken down by reason so an operator
//! can tell a quiet feed from a misconfigured window.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::engine::RejectReason;

/// Core metrics for the ranking engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    // Intake
    pub messages_received: AtomicU64,
    pub rejected_undecodable: AtomicU64,
    pub rejected_no_price: AtomicU64,
    pub rejected_outside_window: AtomicU64,
    pub rejected_unknown_symbol: AtomicU64,

    // State
    pub unchanged: AtomicU64,
    pub state_changes: AtomicU64,

    // Publishing
    pub top_published: AtomicU64,
    pub bottom_published: AtomicU64,
    pub intraday_published: AtomicU64,

    // Archive tap
    pub archive_dropped: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::Undecodable => &self.rejected_undecodable,
            RejectReason::NoPrice => &self.rejected_no_price,
            RejectReason::OutsideWindow => &self.rejected_outside_window,
            RejectReason::UnknownSymbol => &self.rejected_unknown_symbol,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_change(&self) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_top_published(&self) {
        self.top_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bottom_published(&self) {
        self.bottom_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intraday_published(&self) {
        self.intraday_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_drop(&self) {
        self.archive_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            rejected_undecodable: self.rejected_undecodable.load(Ordering::Relaxed),
            rejected_no_price: self.rejected_no_price.load(Ordering::Relaxed),
            rejected_outside_window: self.rejected_outside_window.load(Ordering::Relaxed),
            rejected_unknown_symbol: self.rejected_unknown_symbol.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            top_published: self.top_published.load(Ordering::Relaxed),
            bottom_published: self.bottom_published.load(Ordering::Relaxed),
            intraday_published: self.intraday_published.load(Ordering::Relaxed),
            archive_dropped: self.archive_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of `EngineMetrics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub rejected_undecodable: u64,
    pub rejected_no_price: u64,
    pub rejected_outside_window: u64,
    pub rejected_unknown_symbol: u64,
    pub unchanged: u64,
    pub state_changes: u64,
    pub top_published: u64,
    pub bottom_published: u64,
    pub intraday_published: u64,
    pub archive_dropped: u64,
}

impl MetricsSnapshot {
    pub fn total_rejected(&self) -> u64 {
        self.rejected_undecodable
            + self.rejected_no_price
            + self.rejected_outside_window
            + self.rejected_unknown_symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_counted_by_reason() {
        let m = EngineMetrics::new();
        m.record_rejected(RejectReason::NoPrice);
        m.record_rejected(RejectReason::NoPrice);
        m.record_rejected(RejectReason::OutsideWindow);
        m.record_rejected(RejectReason::UnknownSymbol);

        let s = m.snapshot();
        assert_eq!(s.rejected_no_price, 2);
        assert_eq!(s.rejected_outside_window, 1);
        assert_eq!(s.rejected_unknown_symbol, 1);
        assert_eq!(s.rejected_undecodable, 0);
        assert_eq!(s.total_rejected(), 4);
    }

    #[test]
    fn test_publish_counters() {
        let m = EngineMetrics::new();
        m.record_received();
        m.record_state_change();
        m.record_top_published();
        m.record_intraday_published();

        let s = m.snapshot();
        assert_eq!(s.messages_received, 1);
        assert_eq!(s.state_changes, 1);
        assert_eq!(s.top_published, 1);
        assert_eq!(s.bottom_published, 0);
        assert_eq!(s.intraday_published, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&EngineMetrics::new().snapshot()).unwrap();
        assert!(json.contains("\"top_published\":0"));
    }
}
