//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `pmemvol_allocations_total` | Counter | Successful allocations |
//! | `pmemvol_frees_total` | Counter | Freed allocations |
//! | `pmemvol_resizes_total` | Counter | Resized or recreated allocations |
//! | `pmemvol_failures_total` | Counter | Failed operations, labelled by `op` |
//! | `pmemvol_mapped_bytes` | Gauge | Bytes mapped by live allocations |
//! | `pmemvol_reaped_files_total` | Counter | Files removed by reclamation |
//! | `pmemvol_reap_failures_total` | Counter | Entries reclamation could not remove |
//!
//! Without an installed recorder every call is a no-op.
//!
//! ## Tracing
//!
//! Each allocator operation runs inside a `pmem` span carrying the operation
//! name, directory and size.

mod metrics;
mod tracing_support;

pub use self::metrics::{AllocatorMetrics, init_metrics, record_reap};
pub use self::tracing_support::{
    instrument_operation, span_operation, trace_allocated, trace_error, trace_freed,
    trace_resized,
};
