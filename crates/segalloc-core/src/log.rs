//! Structured allocator lifecycle records.
//!
//! Every public allocator operation leaves at most one record in a bounded
//! ring. Records carry a monotonic decision id, a trace id, and a snapshot of
//! the free/outstanding accounting at the time of the event.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Allocator lifecycle log level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl AllocatorLogLevel {
    /// Parse from string (case-insensitive). Unknown input maps to `Info`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "all" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" | "err" => Self::Error,
            _ => Self::Info,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Structured allocator lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    pub level: AllocatorLogLevel,
    /// API symbol (`allocate`, `allocate_contiguous`, `deallocate`, `defrag`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `free`, `double_free_detected`, ...).
    pub event: &'static str,
    pub address: Option<u64>,
    pub length: Option<u64>,
    /// Region index involved, if any.
    pub region: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: free bytes across pool and regions.
    pub free_bytes: u64,
    /// Snapshot: number of chunks in the pool.
    pub pool_chunks: usize,
    /// Snapshot: checked-out chunk count (0 when tracking is off).
    pub outstanding: usize,
}

/// The event-specific part of a record; accounting fields are filled in by
/// the allocator.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleEvent {
    pub level: AllocatorLogLevel,
    pub symbol: &'static str,
    pub event: &'static str,
    pub address: Option<u64>,
    pub length: Option<u64>,
    pub region: Option<usize>,
    pub outcome: &'static str,
}

impl LifecycleEvent {
    pub fn new(
        level: AllocatorLogLevel,
        symbol: &'static str,
        event: &'static str,
        outcome: &'static str,
    ) -> Self {
        Self {
            level,
            symbol,
            event,
            address: None,
            length: None,
            region: None,
            outcome,
        }
    }

    pub fn chunk(mut self, address: u64, length: u64) -> Self {
        self.address = Some(address);
        self.length = Some(length);
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn region(mut self, region: usize) -> Self {
        self.region = Some(region);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LifecycleLog {
    min_level: AllocatorLogLevel,
    capacity: usize,
    next_decision_id: u64,
    records: VecDeque<AllocatorLogRecord>,
}

impl LifecycleLog {
    pub fn new(min_level: AllocatorLogLevel, capacity: usize) -> Self {
        Self {
            min_level,
            capacity,
            next_decision_id: 1,
            records: VecDeque::new(),
        }
    }

    pub fn enabled(&self, level: AllocatorLogLevel) -> bool {
        self.capacity > 0 && level >= self.min_level
    }

    pub fn push(
        &mut self,
        event: LifecycleEvent,
        details: String,
        free_bytes: u64,
        pool_chunks: usize,
        outstanding: usize,
    ) {
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(AllocatorLogRecord {
            decision_id,
            trace_id: format!("segalloc::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            address: event.address,
            length: event.length,
            region: event.region,
            outcome: event.outcome,
            details,
            free_bytes,
            pool_chunks,
            outstanding,
        });
    }

    pub fn records(&self) -> impl Iterator<Item = &AllocatorLogRecord> {
        self.records.iter()
    }

    pub fn drain(&mut self) -> Vec<AllocatorLogRecord> {
        self.records.drain(..).collect()
    }
}
