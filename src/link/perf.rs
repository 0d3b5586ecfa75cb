//! Performance records for core operations.
//!
//! Every key derivation, connection establishment, encrypt, decrypt and
//! file operation produces a `PerfRecord`. Records are pushed into a
//! `PerformanceSink` collaborator. The crate ships `MemorySink`, an
//! in-RAM sink; exporting or persisting records is up to the embedder.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::crypto::derive::KeyChoice;

/// Category of the operation that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfCategory {
    /// Chat message traffic and key derivation.
    Message,
    /// File transfer traffic.
    File,
    /// Everything else.
    Other,
}

impl PerfCategory {
    /// Stable lowercase name for display and export.
    pub fn as_str(&self) -> &'static str {
        match self {
            PerfCategory::Message => "message",
            PerfCategory::File => "file",
            PerfCategory::Other => "other",
        }
    }
}

/// One timed operation.
#[derive(Debug, Clone)]
pub struct PerfRecord {
    /// Wall-clock time the record was created.
    pub timestamp: SystemTime,
    /// Operation name, e.g. `encrypt` or `file_transfer`.
    pub operation: String,
    /// Size of the processed data in bytes.
    pub data_size: usize,
    /// Duration of the operation in milliseconds.
    pub duration_ms: f64,
    /// Key derivation strategy active for the session.
    pub key_type: KeyChoice,
    /// Operation category.
    pub category: PerfCategory,
    /// Free-form context, e.g. the peer address or file name.
    pub detail: Option<String>,
    /// Additional key/value fields specific to the operation.
    pub extra: Vec<(&'static str, String)>,
}

impl PerfRecord {
    /// Create a record for an operation that just finished.
    pub fn new(
        operation: &str,
        data_size: usize,
        elapsed: Duration,
        key_type: KeyChoice,
        category: PerfCategory,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: operation.to_string(),
            data_size,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            key_type,
            category,
            detail: None,
            extra: Vec::new(),
        }
    }

    /// Attach a free-form detail string.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach an extra key/value field.
    pub fn with_extra(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.extra.push((key, value.into()));
        self
    }
}

/// Consumer of performance records.
pub trait PerformanceSink: Send + Sync {
    /// Accept one record. Must not block the caller for long.
    fn record(&self, record: PerfRecord);
}

/// In-memory sink backed by a mutex-guarded vec.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<PerfRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.records.lock().expect("perf sink poisoned").len()
    }

    /// True when no records have been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all collected records.
    pub fn records(&self) -> Vec<PerfRecord> {
        self.records.lock().expect("perf sink poisoned").clone()
    }
}

impl PerformanceSink for MemorySink {
    fn record(&self, record: PerfRecord) {
        self.records.lock().expect("perf sink poisoned").push(record);
    }
}
