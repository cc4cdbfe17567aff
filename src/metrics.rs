//! Execution counters and the recent-call log
//!
//! Counters are plain atomics so the hot path never takes a lock for
//! bookkeeping. The call log is a bounded ring of recently finished
//! executions, exposed through the `metrics` ingress mode.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{Language, ReturnCode};

// ─────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────

/// Monotonic execution counters
///
/// `executed` is bumped when a run starts, before the outcome is
/// known, so it always covers in-flight work. Requests rejected at
/// validation never reach these counters.
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ExecutionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// An execution is starting
    pub fn record_start(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// An execution finished with a result
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// An execution finished with a captured error
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

// ─────────────────────────────────────────────────────────────────
// Call log
// ─────────────────────────────────────────────────────────────────

/// One finished execution, as reported by metrics
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub language: Language,
    pub outcome: ReturnCode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_req_id: Option<i64>,
}

impl CallRecord {
    pub fn new(
        language: Language,
        outcome: ReturnCode,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        app_req_id: Option<i64>,
    ) -> Self {
        Self {
            language,
            outcome,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            app_req_id,
        }
    }
}

/// Bounded ring of recently finished executions, oldest first
#[derive(Debug)]
pub struct CallLog {
    records: Mutex<VecDeque<CallRecord>>,
    capacity: usize,
}

impl CallLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when at capacity
    pub fn push(&self, record: CallRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn recent(&self) -> Vec<CallRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────

/// Full metrics view returned by the `metrics` ingress mode
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: CounterSnapshot,
    pub recent_calls: Vec<CallRecord>,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: ReturnCode) -> CallRecord {
        let now = Utc::now();
        CallRecord::new(Language::Py, outcome, now, now, None)
    }

    #[test]
    fn test_counters_track_outcomes() {
        let counters = ExecutionCounters::new();
        counters.record_start();
        counters.record_start();
        counters.record_success();
        counters.record_failure();

        let snap = counters.snapshot();
        assert_eq!(snap.executed, 2);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn test_start_counts_in_flight_work() {
        let counters = ExecutionCounters::new();
        counters.record_start();
        let snap = counters.snapshot();
        assert_eq!(snap.executed, 1);
        assert_eq!(snap.succeeded, 0);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn test_call_log_evicts_oldest() {
        let log = CallLog::new(3);
        for _ in 0..5 {
            log.push(record(ReturnCode::Success));
        }
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_call_log_keeps_order() {
        let log = CallLog::new(8);
        log.push(record(ReturnCode::Success));
        log.push(record(ReturnCode::Error));
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].outcome, ReturnCode::Success);
        assert_eq!(recent[1].outcome, ReturnCode::Error);
    }

    #[test]
    fn test_zero_capacity_log_keeps_nothing() {
        let log = CallLog::new(0);
        log.push(record(ReturnCode::Success));
        assert!(log.is_empty());
    }

    #[test]
    fn test_duration_is_computed() {
        let started = Utc::now();
        let finished = started + chrono::Duration::milliseconds(250);
        let rec = CallRecord::new(Language::C, ReturnCode::Success, started, finished, Some(7));
        assert_eq!(rec.duration_ms, 250);
    }

    #[test]
    fn test_snapshot_serializes() {
        let counters = ExecutionCounters::new();
        counters.record_start();
        counters.record_success();
        let log = CallLog::new(4);
        log.push(record(ReturnCode::Success));

        let snap = MetricsSnapshot {
            counters: counters.snapshot(),
            recent_calls: log.recent(),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["counters"]["executed"], 1);
        assert_eq!(json["recent_calls"][0]["language"], "PY");
        assert_eq!(json["recent_calls"][0]["outcome"], 0);
    }
}
