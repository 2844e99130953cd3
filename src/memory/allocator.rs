//! File-backed allocation lifecycle.
//!
//! [`Allocator::allocate`] creates a backing file, sizes it, maps it and hands
//! the caller a fully initialized [`AllocationHandle`]. If any step after the
//! file exists fails, the file is closed and unlinked before the error is
//! returned.
//!
//! [`Allocator::resize`] builds a complete new backing (file, length,
//! mapping), copies the overlapping prefix, swaps it into the handle and only
//! then releases the old one. The handle never points at an unmapped region.
//!
//! # Example
//!
//! ```rust,ignore
//! use pmemvol::memory::{Allocator, AllocatorConfig};
//!
//! let allocator = Allocator::new(AllocatorConfig::durable())?;
//! let (addr, handle) = allocator.allocate("/pmem/tmp", 1 << 20, None)?;
//!
//! unsafe { addr.as_ptr().write_bytes(b'a', 1 << 20) };
//!
//! let addr = allocator.resize(&handle, 2 << 20)?;
//! allocator.free(addr, &handle)?;
//! ```

use super::config::{AllocatorConfig, BackingMode};
use super::handle::{AllocationHandle, Backing};
use super::mapping::Mapping;
use super::sizer::FileSizer;
use super::tmpfile::TempFileFactory;
use crate::error::{Error, Result};
use crate::observability::{
    AllocatorMetrics, instrument_operation, trace_allocated, trace_error, trace_freed,
    trace_resized,
};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Creates, resizes and frees file-backed allocations.
///
/// The allocator holds no per-allocation state; every live allocation is
/// described entirely by its handle. One allocator can be shared between
/// threads.
pub struct Allocator {
    config: AllocatorConfig,
    factory: TempFileFactory,
    sizer: FileSizer,
    metrics: AllocatorMetrics,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::build(AllocatorConfig::default())
    }
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Allocator {
    /// Create an allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the configuration is invalid.
    pub fn new(config: AllocatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an allocator configured from `PMEMVOL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(AllocatorConfig::from_env()?)
    }

    fn build(config: AllocatorConfig) -> Self {
        Self {
            factory: TempFileFactory::from_config(&config),
            sizer: FileSizer::new().with_preallocate(config.preallocate),
            metrics: AllocatorMetrics::new(config.mode.as_str()),
            config,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate `size` bytes backed by a new file in `directory`.
    ///
    /// `hint` suggests where the region should be placed; the kernel may
    /// choose another address.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`]: zero size, over-long path, or a missing
    ///   or inaccessible directory.
    /// - [`Error::ResourceExhausted`]: size above the configured maximum, or
    ///   descriptors, memory or device space ran out.
    /// - [`Error::Io`] / [`Error::System`]: sizing or mapping failed.
    pub fn allocate<P: AsRef<Path>>(
        &self,
        directory: P,
        size: usize,
        hint: Option<NonNull<u8>>,
    ) -> Result<(NonNull<u8>, AllocationHandle)> {
        let directory = directory.as_ref();
        let _span = instrument_operation("allocate", directory, size);

        let result = owning_directory(directory).and_then(|directory| {
            let backing = self.create_backing(&directory, self.config.mode, size, hint)?;
            Ok((directory, backing))
        });

        let (directory, backing) = match result {
            Ok(created) => created,
            Err(e) => return Err(self.fail("allocate", e)),
        };

        let addr = backing.mapping.as_ptr();
        trace_allocated(
            addr.as_ptr(),
            size,
            backing.file.as_raw_fd(),
            backing.file.path(),
        );
        self.metrics.record_allocate(size);

        Ok((addr, AllocationHandle::new(directory, self.config.mode, backing)))
    }

    /// Change the size of an allocation, preserving its content.
    ///
    /// The first `min(old, new)` bytes are copied into a new backing file in
    /// the same directory. Returns the new start address; the previous one
    /// must no longer be used. Resizing to the current size is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyFreed`] if the handle was freed; otherwise the same
    /// errors as [`Allocator::allocate`]. On error the allocation is unchanged.
    pub fn resize(&self, handle: &AllocationHandle, new_size: usize) -> Result<NonNull<u8>> {
        self.replace_backing("resize", handle, new_size, true)
    }

    /// Replace an allocation with a fresh zero-filled backing of `new_size`
    /// bytes, discarding its content.
    ///
    /// Returns the new start address.
    pub fn recreate(&self, handle: &AllocationHandle, new_size: usize) -> Result<NonNull<u8>> {
        self.replace_backing("recreate", handle, new_size, false)
    }

    /// Release an allocation.
    ///
    /// Unmaps the region, closes the descriptor, then unlinks the backing file
    /// if it is still on disk. Every step is attempted; the first error is
    /// returned. Afterwards the handle is freed whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyFreed`] if the handle was already freed. No system
    ///   call is made.
    /// - [`Error::InvalidHandle`] if `addr` is not the start of the handle's
    ///   region. The allocation stays live.
    pub fn free(&self, addr: NonNull<u8>, handle: &AllocationHandle) -> Result<()> {
        let mut state = handle.lock();

        let size = match state.live() {
            Ok(backing) if backing.mapping.as_ptr() == addr => backing.len(),
            Ok(backing) => {
                let err = Error::InvalidHandle(format!(
                    "address {:p} is not the start of this allocation ({:p})",
                    addr.as_ptr(),
                    backing.mapping.as_ptr().as_ptr()
                ));
                return Err(self.fail("free", err));
            }
            Err(e) => return Err(self.fail("free", e)),
        };

        let _span = instrument_operation("free", handle.directory(), size);

        let backing = state.take()?;
        if self.config.sync_on_free {
            if let Err(e) = backing.mapping.sync() {
                tracing::warn!(error = %e, "msync before free failed");
            }
        }

        let result = backing.release();
        self.metrics.record_free(size);

        match result {
            Ok(()) => {
                trace_freed(addr.as_ptr(), size);
                Ok(())
            }
            Err(e) => Err(self.fail("free", e)),
        }
    }

    fn replace_backing(
        &self,
        op: &'static str,
        handle: &AllocationHandle,
        new_size: usize,
        preserve: bool,
    ) -> Result<NonNull<u8>> {
        let mut state = handle.lock();

        let old_size = match state.live() {
            Ok(backing) if preserve && backing.len() == new_size => {
                return Ok(backing.mapping.as_ptr());
            }
            Ok(backing) => backing.len(),
            Err(e) => return Err(self.fail(op, e)),
        };

        let _span = instrument_operation(op, handle.directory(), new_size);

        let fresh = match self.create_backing(handle.directory(), handle.mode(), new_size, None) {
            Ok(fresh) => fresh,
            Err(e) => return Err(self.fail(op, e)),
        };

        if preserve {
            state.live()?.mapping.copy_prefix_into(&fresh.mapping);
        }

        let addr = fresh.mapping.as_ptr();
        let old = state.replace(fresh)?;
        drop(state);

        // The handle already describes the new backing; a failure here only
        // leaves the superseded file behind.
        if let Err(e) = old.release() {
            tracing::warn!(op, error = %e, "failed to release superseded backing");
            self.metrics.record_failure("release");
        }

        self.metrics.record_resize(old_size, new_size);
        trace_resized(op, old_size, new_size, addr.as_ptr());
        Ok(addr)
    }

    /// Create, size and map a backing file, rolling back on failure.
    fn create_backing(
        &self,
        directory: &Path,
        mode: BackingMode,
        size: usize,
        hint: Option<NonNull<u8>>,
    ) -> Result<Backing> {
        self.check_size(size)?;

        let file = self.factory.create_as(directory, mode)?;

        let mapped = self
            .sizer
            .grow_to(&file, size as u64)
            .and_then(|()| Mapping::map(&file, size, hint));

        match mapped {
            Ok(mapping) => Ok(Backing { mapping, file }),
            Err(e) => {
                tracing::warn!(
                    directory = %directory.display(),
                    size,
                    error = %e,
                    "rolling back backing file"
                );
                if let Err(cleanup) = file.release() {
                    tracing::warn!(error = %cleanup, "rollback left backing file behind");
                }
                Err(e)
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "size must be greater than 0".into(),
            ));
        }
        if let Some(max) = self.config.max_size {
            if size > max {
                return Err(Error::ResourceExhausted(format!(
                    "requested {size} bytes, limit is {max}"
                )));
            }
        }
        Ok(())
    }

    fn fail(&self, op: &'static str, err: Error) -> Error {
        trace_error(op, &err);
        self.metrics.record_failure(op);
        err
    }
}

/// Absolute form of the caller's directory, without touching the filesystem.
fn owning_directory(directory: &Path) -> Result<PathBuf> {
    if directory.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("directory must not be empty".into()));
    }
    std::path::absolute(directory)
        .map_err(|e| Error::InvalidArgument(format!("directory {}: {e}", directory.display())))
}
