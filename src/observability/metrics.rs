//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const ALLOCATIONS_TOTAL: &str = "pmemvol_allocations_total";
const FREES_TOTAL: &str = "pmemvol_frees_total";
const RESIZES_TOTAL: &str = "pmemvol_resizes_total";
const FAILURES_TOTAL: &str = "pmemvol_failures_total";
const MAPPED_BYTES: &str = "pmemvol_mapped_bytes";
const REAPED_FILES_TOTAL: &str = "pmemvol_reaped_files_total";
const REAP_FAILURES_TOTAL: &str = "pmemvol_reap_failures_total";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        ALLOCATIONS_TOTAL,
        Unit::Count,
        "Total number of successful allocations"
    );
    metrics::describe_counter!(FREES_TOTAL, Unit::Count, "Total number of freed allocations");
    metrics::describe_counter!(
        RESIZES_TOTAL,
        Unit::Count,
        "Total number of resized or recreated allocations"
    );
    metrics::describe_counter!(
        FAILURES_TOTAL,
        Unit::Count,
        "Failed allocator operations, by operation"
    );
    metrics::describe_gauge!(
        MAPPED_BYTES,
        Unit::Bytes,
        "Bytes currently mapped by live allocations"
    );
    metrics::describe_counter!(
        REAPED_FILES_TOTAL,
        Unit::Count,
        "Backing files removed by directory reclamation"
    );
    metrics::describe_counter!(
        REAP_FAILURES_TOTAL,
        Unit::Count,
        "Entries directory reclamation could not remove"
    );
}

/// Record the outcome of a directory reclamation.
#[inline]
pub fn record_reap(directory: &str, removed: usize, failed: usize) {
    counter!(REAPED_FILES_TOTAL, "directory" => directory.to_string()).increment(removed as u64);
    counter!(REAP_FAILURES_TOTAL, "directory" => directory.to_string()).increment(failed as u64);
}

/// Metrics for one allocator instance, labelled by backing mode.
#[derive(Clone)]
pub struct AllocatorMetrics {
    mode: &'static str,
    allocations: Counter,
    frees: Counter,
    resizes: Counter,
    mapped_bytes: Gauge,
}

impl AllocatorMetrics {
    /// Create a metrics collector for allocators in `mode`.
    pub fn new(mode: &'static str) -> Self {
        Self {
            mode,
            allocations: counter!(ALLOCATIONS_TOTAL, "mode" => mode),
            frees: counter!(FREES_TOTAL, "mode" => mode),
            resizes: counter!(RESIZES_TOTAL, "mode" => mode),
            mapped_bytes: gauge!(MAPPED_BYTES, "mode" => mode),
        }
    }

    /// Record a new allocation of `bytes`.
    #[inline]
    pub fn record_allocate(&self, bytes: usize) {
        self.allocations.increment(1);
        self.mapped_bytes.increment(bytes as f64);
    }

    /// Record an allocation of `bytes` being freed.
    #[inline]
    pub fn record_free(&self, bytes: usize) {
        self.frees.increment(1);
        self.mapped_bytes.decrement(bytes as f64);
    }

    /// Record an allocation changing size.
    #[inline]
    pub fn record_resize(&self, old: usize, new: usize) {
        self.resizes.increment(1);
        self.mapped_bytes.increment(new as f64);
        self.mapped_bytes.decrement(old as f64);
    }

    /// Record a failed operation.
    #[inline]
    pub fn record_failure(&self, op: &'static str) {
        counter!(FAILURES_TOTAL, "mode" => self.mode, "op" => op).increment(1);
    }
}
