//! Allocation handles.
//!
//! An [`AllocationHandle`] binds one mapped region to its backing file. The
//! handle is either live (descriptor open, region mapped) or freed; the state
//! sits behind a mutex so concurrent `resize`/`free` calls on one handle are
//! serialized.

use super::config::BackingMode;
use super::mapping::Mapping;
use super::tmpfile::TempFile;
use crate::error::{Error, Result};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mapping plus the file it maps.
///
/// Field order matters: the mapping is dropped (unmapped) before the file is
/// closed and unlinked.
#[derive(Debug)]
pub(crate) struct Backing {
    pub(crate) mapping: Mapping,
    pub(crate) file: TempFile,
}

impl Backing {
    /// Unmap, close, then unlink. Every step runs even if an earlier one
    /// failed; the first error is returned.
    pub(crate) fn release(self) -> Result<()> {
        let Backing { mapping, file } = self;
        let unmapped = mapping.unmap();
        let removed = file.release();
        unmapped.and(removed)
    }

    pub(crate) fn len(&self) -> usize {
        self.mapping.len()
    }
}

#[derive(Debug)]
pub(crate) enum HandleState {
    Live(Backing),
    Freed,
}

impl HandleState {
    pub(crate) fn live(&self) -> Result<&Backing> {
        match self {
            HandleState::Live(backing) => Ok(backing),
            HandleState::Freed => Err(Error::AlreadyFreed),
        }
    }

    /// Swap in a new backing, returning the one it replaces.
    pub(crate) fn replace(&mut self, backing: Backing) -> Result<Backing> {
        match self {
            HandleState::Live(current) => Ok(std::mem::replace(current, backing)),
            HandleState::Freed => Err(Error::AlreadyFreed),
        }
    }

    /// Move the backing out, leaving the handle freed.
    pub(crate) fn take(&mut self) -> Result<Backing> {
        match std::mem::replace(self, HandleState::Freed) {
            HandleState::Live(backing) => Ok(backing),
            HandleState::Freed => Err(Error::AlreadyFreed),
        }
    }
}

/// A live file-backed allocation.
///
/// Returned by [`Allocator::allocate`](super::Allocator::allocate) fully
/// initialized. Pass it back to [`Allocator::free`](super::Allocator::free)
/// to release it; a handle dropped while still live releases its resources
/// on drop.
///
/// The handle is `Send + Sync` and can be shared (e.g. in an `Arc`) between
/// threads. Access to the mapped bytes themselves is not synchronized.
#[derive(Debug)]
pub struct AllocationHandle {
    directory: PathBuf,
    mode: BackingMode,
    state: Mutex<HandleState>,
}

impl AllocationHandle {
    pub(crate) fn new(directory: PathBuf, mode: BackingMode, backing: Backing) -> Self {
        Self {
            directory,
            mode,
            state: Mutex::new(HandleState::Live(backing)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HandleState> {
        // Every mutation is a whole-value swap, so a poisoned state is
        // still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory the backing file was created in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Naming policy of the backing file.
    pub fn mode(&self) -> BackingMode {
        self.mode
    }

    /// Whether the allocation has not been freed yet.
    pub fn is_live(&self) -> bool {
        matches!(*self.lock(), HandleState::Live(_))
    }

    /// Length of the backing file and of the mapping.
    pub fn current_size(&self) -> Result<usize> {
        Ok(self.lock().live()?.len())
    }

    /// Start of the mapped region.
    ///
    /// The address changes when the allocation is resized.
    pub fn as_ptr(&self) -> Result<NonNull<u8>> {
        Ok(self.lock().live()?.mapping.as_ptr())
    }

    /// Descriptor of the backing file.
    pub fn raw_fd(&self) -> Result<RawFd> {
        Ok(self.lock().live()?.file.as_raw_fd())
    }

    /// Path of the backing file, `None` in anonymous mode.
    pub fn backing_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.lock().live()?.file.path().map(Path::to_path_buf))
    }

    /// Flush the mapped region to the backing file.
    pub fn sync(&self) -> Result<()> {
        self.lock().live()?.mapping.sync()
    }

    /// Schedule a flush of the mapped region without waiting.
    pub fn sync_async(&self) -> Result<()> {
        self.lock().live()?.mapping.sync_async()
    }

    /// Fault in every page of the region.
    pub fn prefault(&self) -> Result<()> {
        self.lock().live()?.mapping.prefault();
        Ok(())
    }
}

impl Drop for AllocationHandle {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Ok(backing) = state.take() {
            tracing::warn!(
                directory = %self.directory.display(),
                size = backing.len(),
                "allocation dropped without free, releasing"
            );
            if let Err(e) = backing.release() {
                tracing::warn!(error = %e, "release on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::sizer::FileSizer;
    use crate::memory::tmpfile::TempFileFactory;
    use tempfile::tempdir;

    fn backing(dir: &Path, mode: BackingMode, len: usize) -> Backing {
        let file = TempFileFactory::new(mode).create(dir).unwrap();
        FileSizer::new().grow_to(&file, len as u64).unwrap();
        let mapping = Mapping::map(&file, len, None).unwrap();
        Backing { mapping, file }
    }

    #[test]
    fn test_live_accessors() {
        let dir = tempdir().unwrap();
        let handle = AllocationHandle::new(
            dir.path().to_path_buf(),
            BackingMode::Durable,
            backing(dir.path(), BackingMode::Durable, 4096),
        );

        assert!(handle.is_live());
        assert_eq!(handle.current_size().unwrap(), 4096);
        assert_eq!(handle.directory(), dir.path());
        assert_eq!(handle.mode(), BackingMode::Durable);
        assert!(handle.raw_fd().unwrap() >= 0);
        assert!(handle.backing_path().unwrap().unwrap().exists());
        handle.sync().unwrap();
        handle.sync_async().unwrap();
        handle.prefault().unwrap();
    }

    #[test]
    fn test_take_marks_freed() {
        let dir = tempdir().unwrap();
        let handle = AllocationHandle::new(
            dir.path().to_path_buf(),
            BackingMode::Anonymous,
            backing(dir.path(), BackingMode::Anonymous, 4096),
        );

        let taken = handle.lock().take().unwrap();
        taken.release().unwrap();

        assert!(!handle.is_live());
        assert!(matches!(handle.current_size(), Err(Error::AlreadyFreed)));
        assert!(matches!(handle.as_ptr(), Err(Error::AlreadyFreed)));
        assert!(matches!(handle.lock().take(), Err(Error::AlreadyFreed)));
    }

    #[test]
    fn test_replace_swaps_backing() {
        let dir = tempdir().unwrap();
        let handle = AllocationHandle::new(
            dir.path().to_path_buf(),
            BackingMode::Anonymous,
            backing(dir.path(), BackingMode::Anonymous, 4096),
        );

        let old = handle
            .lock()
            .replace(backing(dir.path(), BackingMode::Anonymous, 8192))
            .unwrap();
        assert_eq!(old.len(), 4096);
        assert_eq!(handle.current_size().unwrap(), 8192);
        old.release().unwrap();
    }

    #[test]
    fn test_drop_releases_durable_file() {
        let dir = tempdir().unwrap();
        let handle = AllocationHandle::new(
            dir.path().to_path_buf(),
            BackingMode::Durable,
            backing(dir.path(), BackingMode::Durable, 4096),
        );
        let path = handle.backing_path().unwrap().unwrap();

        drop(handle);
        assert!(!path.exists());
    }
}
