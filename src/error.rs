//! Error types for pmemvol.

use rustix::io::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using pmemvol's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for allocation, mapping and reclamation.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inaccessible directory, over-long path, zero size, or a
    /// malformed configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Descriptor table, memory, or device quota ran out while creating a
    /// backing file or mapping.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The handle was already released by `free`.
    #[error("allocation already freed")]
    AlreadyFreed,

    /// The handle does not describe the region it was used with.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Bulk reclamation could not remove every entry.
    #[error("partial cleanup: removed {removed} entries, {} could not be removed", .failed.len())]
    PartialCleanup {
        /// Entries successfully removed.
        removed: usize,
        /// Entries that are still present.
        failed: Vec<PathBuf>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] Errno),
}

impl Error {
    /// Whether this error belongs to the I/O failure class (sizing, mapping,
    /// unmap or unlink failures).
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::System(_))
    }

    /// Classify an errno raised while acquiring a resource.
    pub(crate) fn acquiring(context: &str, errno: Errno) -> Self {
        if is_exhaustion(errno) {
            Error::ResourceExhausted(format!("{context}: {errno}"))
        } else {
            Error::System(errno)
        }
    }

    /// Classify a `std::io::Error` raised while acquiring a resource.
    pub(crate) fn acquiring_io(context: &str, err: std::io::Error) -> Self {
        match os_errno(&err) {
            Some(errno) if is_exhaustion(errno) => {
                Error::ResourceExhausted(format!("{context}: {errno}"))
            }
            _ => Error::Io(err),
        }
    }
}

/// Find the OS error behind `err`, looking through wrapped `io::Error`s.
fn os_errno(err: &std::io::Error) -> Option<Errno> {
    if let Some(errno) = Errno::from_io_error(err) {
        return Some(errno);
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> =
        err.get_ref().map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(inner) = source {
        if let Some(errno) = inner
            .downcast_ref::<std::io::Error>()
            .and_then(Errno::from_io_error)
        {
            return Some(errno);
        }
        source = inner.source();
    }
    None
}

fn is_exhaustion(errno: Errno) -> bool {
    errno == Errno::MFILE
        || errno == Errno::NFILE
        || errno == Errno::NOMEM
        || errno == Errno::NOSPC
        || errno == Errno::DQUOT
}
