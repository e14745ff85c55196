//! Process-wide processing counters
//!
//! Allocated once at start-up and shared as `Arc<ProcessingCounters>`. Only
//! the message dispatcher increments them; the HTTP layer reads snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ProcessingCounters {
    processed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub total_messages_processed: u64,
    pub processing_errors: u64,
    pub error_rate: f64,
}

impl ProcessingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Errors per processed message; 0.0 until something was processed
    pub fn snapshot(&self) -> CounterSnapshot {
        let total_messages_processed = self.total_processed();
        let processing_errors = self.total_errors();
        let error_rate = if total_messages_processed > 0 {
            processing_errors as f64 / total_messages_processed as f64
        } else {
            0.0
        };

        CounterSnapshot {
            total_messages_processed,
            processing_errors,
            error_rate,
        }
    }
}
