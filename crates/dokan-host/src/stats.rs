//! Lock-free bridge statistics.
//!
//! Every callback bumps a per-kind counter; failures, unsupported
//! capabilities and caught panics are counted separately. The controller logs
//! a [`BridgeStatsSnapshot`] when the mount ends.
//!
//! ```
//! use dokan_host::BridgeStats;
//! use dokan_host::OperationKind;
//!
//! let stats = BridgeStats::new();
//! stats.record_call(OperationKind::Read);
//! stats.record_read(4096);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.total_calls, 1);
//! assert_eq!(snapshot.bytes_read, 4096);
//! ```

use crate::request::OperationKind;
use crate::status::NtStatus;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Counters shared by every worker thread of one mount.
#[derive(Debug)]
pub struct BridgeStats {
    calls: [AtomicU64; OperationKind::COUNT],
    failures: AtomicU64,
    not_implemented: AtomicU64,
    panics: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    open_handles: AtomicU64,
    last_activity: RwLock<Instant>,
    session_start: SystemTime,
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeStats {
    /// Fresh counters.
    pub fn new() -> Self {
        Self {
            calls: std::array::from_fn(|_| AtomicU64::new(0)),
            failures: AtomicU64::new(0),
            not_implemented: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            open_handles: AtomicU64::new(0),
            last_activity: RwLock::new(Instant::now()),
            session_start: SystemTime::now(),
        }
    }

    /// Count one callback of `kind`.
    #[inline]
    pub fn record_call(&self, kind: OperationKind) {
        self.calls[kind.index()].fetch_add(1, Ordering::Relaxed);
        *self.last_activity.write() = Instant::now();
    }

    /// Count the status a callback returned.
    #[inline]
    pub fn record_status(&self, status: NtStatus) {
        if status == NtStatus::NOT_IMPLEMENTED {
            self.not_implemented.fetch_add(1, Ordering::Relaxed);
        } else if !status.is_success() && status != NtStatus::BUFFER_OVERFLOW {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a panic caught at the callback boundary.
    #[inline]
    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to the bytes-read total.
    #[inline]
    pub fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add to the bytes-written total.
    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A handle was opened.
    #[inline]
    pub fn record_open(&self) {
        self.open_handles.fetch_add(1, Ordering::Relaxed);
    }

    /// A handle was closed.
    #[inline]
    pub fn record_close(&self) {
        let _ = self
            .open_handles
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Calls of one kind so far.
    pub fn calls(&self, kind: OperationKind) -> u64 {
        self.calls[kind.index()].load(Ordering::Relaxed)
    }

    /// Calls of every kind so far.
    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Panics caught so far.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Currently open handles.
    pub fn open_handles(&self) -> u64 {
        self.open_handles.load(Ordering::Relaxed)
    }

    /// Time since the last callback.
    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Serializable copy of the counters.
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        let per_operation = OperationKind::ALL
            .iter()
            .filter_map(|&kind| {
                let n = self.calls(kind);
                (n > 0).then(|| (kind.name().to_string(), n))
            })
            .collect();

        BridgeStatsSnapshot {
            total_calls: self.total_calls(),
            failures: self.failures.load(Ordering::Relaxed),
            not_implemented: self.not_implemented.load(Ordering::Relaxed),
            panics: self.panic_count(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            open_handles: self.open_handles(),
            per_operation,
            session_start: self.session_start,
        }
    }
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeStatsSnapshot {
    /// Callbacks of every kind.
    pub total_calls: u64,
    /// Callbacks that returned an error status other than not-implemented.
    pub failures: u64,
    /// Callbacks the filesystem did not implement.
    pub not_implemented: u64,
    /// Panics caught at the boundary.
    pub panics: u64,
    /// Bytes returned by reads.
    pub bytes_read: u64,
    /// Bytes accepted by writes.
    pub bytes_written: u64,
    /// Handles open at snapshot time.
    pub open_handles: u64,
    /// Non-zero call counts by callback name.
    pub per_operation: Vec<(String, u64)>,
    /// When the bridge was created.
    #[serde(with = "humantime_serde")]
    pub session_start: SystemTime,
}
