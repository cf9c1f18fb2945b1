//! Outcome sinks: where finished deliveries are recorded.
//!
//! Outcomes never travel back to the dispatching caller. They are logged, and
//! optionally buffered in memory for diagnostics and tests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::core::ActionOutcome;
use crate::util::clock::now_ms;

/// A finished delivery with the caller context it was made for.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    /// Caller client identifier.
    pub client_id: String,
    /// Topics the message was published under.
    pub topics: Vec<String>,
    /// Delivery result.
    pub outcome: ActionOutcome,
    /// Timestamp milliseconds.
    pub recorded_at_ms: u128,
}

impl OutcomeRecord {
    /// Stamp an outcome with the current time.
    pub fn new(client_id: impl Into<String>, topics: Vec<String>, outcome: ActionOutcome) -> Self {
        Self {
            client_id: client_id.into(),
            topics,
            outcome,
            recorded_at_ms: now_ms(),
        }
    }
}

/// Outcome sink abstraction.
pub trait OutcomeSink: Send + Sync {
    /// Record a finished delivery.
    fn record(&self, record: OutcomeRecord);
}

fn log_outcome(record: &OutcomeRecord) {
    if record.outcome.success {
        info!(
            client_id = %record.client_id,
            topics = ?record.topics,
            detail = %record.outcome.detail,
            "Deferred message delivered"
        );
    } else {
        warn!(
            client_id = %record.client_id,
            topics = ?record.topics,
            detail = %record.outcome.detail,
            "Deferred message failed"
        );
    }
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record(&self, record: OutcomeRecord) {
        log_outcome(&record);
    }
}

/// Logs and keeps the most recent records in a bounded buffer.
pub struct InMemoryOutcomeSink {
    records: Mutex<VecDeque<OutcomeRecord>>,
    arrived: Condvar,
    max_records: usize,
}

impl InMemoryOutcomeSink {
    /// Create a sink keeping at most `max_records`.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_records)),
            arrived: Condvar::new(),
            max_records,
        }
    }

    /// Snapshot of stored records, oldest first.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Block until at least `count` records are stored or `timeout` elapses,
    /// then return the snapshot.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutcomeRecord> {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock();
        while records.len() < count {
            if self.arrived.wait_until(&mut records, deadline).timed_out() {
                break;
            }
        }
        records.iter().cloned().collect()
    }
}

impl OutcomeSink for InMemoryOutcomeSink {
    fn record(&self, record: OutcomeRecord) {
        log_outcome(&record);
        let mut records = self.records.lock();
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
        self.arrived.notify_all();
    }
}
