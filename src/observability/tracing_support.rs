//! Tracing integration for structured logging and spans.

use std::path::Path;
use tracing::{Level, Span, span};

/// Create a span for one allocator operation.
///
/// # Example
///
/// ```rust,ignore
/// use pmemvol::observability::span_operation;
///
/// let span = span_operation("allocate", dir, 4096);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_operation(op: &'static str, directory: &Path, size: usize) -> Span {
    span!(
        Level::DEBUG,
        "pmem",
        op = op,
        directory = %directory.display(),
        size = size
    )
}

/// Enter a span for one allocator operation.
pub fn instrument_operation(
    op: &'static str,
    directory: &Path,
    size: usize,
) -> tracing::span::EnteredSpan {
    span_operation(op, directory, size).entered()
}

/// Log a completed allocation.
#[inline]
pub fn trace_allocated(addr: *const u8, size: usize, fd: i32, path: Option<&Path>) {
    tracing::debug!(
        addr = ?addr,
        size = size,
        fd = fd,
        path = ?path,
        "allocated"
    );
}

/// Log a size change.
#[inline]
pub fn trace_resized(op: &'static str, old_size: usize, new_size: usize, addr: *const u8) {
    tracing::debug!(
        op = op,
        old_size = old_size,
        new_size = new_size,
        addr = ?addr,
        "backing replaced"
    );
}

/// Log a released allocation.
#[inline]
pub fn trace_freed(addr: *const u8, size: usize) {
    tracing::debug!(addr = ?addr, size = size, "freed");
}

/// Log a failed operation.
#[inline]
pub fn trace_error(op: &'static str, error: &dyn std::error::Error) {
    tracing::warn!(op = op, error = %error, "operation failed");
}
