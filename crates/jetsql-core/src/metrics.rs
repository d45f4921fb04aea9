//! Join execution counters.
//!
//! Counters are relaxed atomics: they are read for diagnostics and tests, never
//! used to coordinate tasks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one join stage, shared by all of its tasks.
#[derive(Debug, Default)]
pub struct JoinMetrics {
    builds: AtomicU64,
    build_rows: AtomicU64,
    probes: AtomicU64,
    lookups: AtomicU64,
    scans: AtomicU64,
    rows_emitted: AtomicU64,
    null_key_skips: AtomicU64,
    residual_rejections: AtomicU64,
}

/// Point-in-time copy of [`JoinMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinMetricsSnapshot {
    /// Completed build-side materializations.
    pub builds: u64,
    /// Rows materialized across all builds.
    pub build_rows: u64,
    /// Left rows processed.
    pub probes: u64,
    /// Point lookups issued against a partitioned relation.
    pub lookups: u64,
    /// Full scans issued against a right relation.
    pub scans: u64,
    /// Joined rows produced.
    pub rows_emitted: u64,
    /// Left rows skipped because a join key component was null.
    pub null_key_skips: u64,
    /// Candidate pairs rejected by the residual or full condition.
    pub residual_rejections: u64,
}

impl JoinMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_build(&self, rows: usize) {
        self.builds.fetch_add(1, Ordering::Relaxed);
        self.build_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self, rows: usize) {
        self.rows_emitted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_null_key_skip(&self) {
        self.null_key_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_residual_rejection(&self) {
        self.residual_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> JoinMetricsSnapshot {
        JoinMetricsSnapshot {
            builds: self.builds.load(Ordering::Relaxed),
            build_rows: self.build_rows.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            null_key_skips: self.null_key_skips.load(Ordering::Relaxed),
            residual_rejections: self.residual_rejections.load(Ordering::Relaxed),
        }
    }
}
