//! Shared read/write mappings over backing files.
//!
//! A [`Mapping`] covers `[0, len)` of a file with `MAP_SHARED`, so stores
//! through the mapping reach the file and every other mapping of it.
//!
//! # Example
//!
//! ```rust,ignore
//! use pmemvol::memory::Mapping;
//!
//! let mapping = Mapping::map(&fd, 4096, None)?;
//! unsafe { mapping.as_mut_slice()[..5].copy_from_slice(b"hello") };
//! mapping.sync()?;
//! mapping.unmap()?;
//! ```

use crate::error::{Error, Result};
use rustix::fd::AsFd;
use rustix::mm::{MapFlags, MsyncFlags, ProtFlags};
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// A live shared mapping of a file.
///
/// The region is unmapped when the value is dropped. Use
/// [`Mapping::unmap`] to observe `munmap` errors.
#[derive(Debug)]
pub struct Mapping {
    /// Pointer to the mmap'd region.
    ptr: NonNull<u8>,
    /// Length of the region.
    len: usize,
}

#[allow(clippy::len_without_is_empty)]
impl Mapping {
    /// Map `[0, len)` of `fd` read/write and shared.
    ///
    /// `hint` is passed to the kernel as a placement suggestion; it is not
    /// `MAP_FIXED`, so the returned address may differ.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero length,
    /// [`Error::ResourceExhausted`] when the address space or memory runs out,
    /// and [`Error::System`] for other `mmap` failures.
    pub fn map<Fd: AsFd>(fd: Fd, len: usize, hint: Option<NonNull<u8>>) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidArgument(
                "mapping length must be greater than 0".into(),
            ));
        }

        let hint: *mut c_void = hint.map_or(std::ptr::null_mut(), |p| p.as_ptr().cast());

        // SAFETY: no MAP_FIXED, so existing mappings cannot be replaced.
        let ptr = unsafe {
            rustix::mm::mmap(
                hint,
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
            .map_err(|e| Error::acquiring("mmap", e))?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::ResourceExhausted("mmap returned null".into()))?;

        Ok(Self { ptr, len })
    }

    /// Unmap exactly the region that was mapped.
    pub fn unmap(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the region was created by `map` and is unmapped once.
        unsafe {
            rustix::mm::munmap(this.ptr.as_ptr().cast(), this.len)?;
        }
        Ok(())
    }

    /// Start of the region.
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Length of the region in bytes. Never zero.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// View the region as bytes.
    ///
    /// # Safety
    ///
    /// The caller must ensure no one writes to the region for the lifetime
    /// of the slice.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: region is valid for `len` bytes; caller excludes writers.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the region as mutable bytes.
    ///
    /// # Safety
    ///
    /// The caller must ensure exclusive access to the region for the lifetime
    /// of the slice.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: region is valid for `len` bytes; caller guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copy the first `min(self.len, dst.len)` bytes into `dst`.
    pub(crate) fn copy_prefix_into(&self, dst: &Mapping) -> usize {
        let n = self.len.min(dst.len);
        // SAFETY: distinct mappings never overlap and both cover `n` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.ptr.as_ptr(), n);
        }
        n
    }

    /// Write dirty pages back to the file and wait for completion.
    pub fn sync(&self) -> Result<()> {
        // SAFETY: the range is exactly the live mapping created by `map`.
        unsafe {
            rustix::mm::msync(self.ptr.as_ptr().cast(), self.len, MsyncFlags::SYNC)?;
        }
        Ok(())
    }

    /// Schedule write-back without waiting for it.
    pub fn sync_async(&self) -> Result<()> {
        // SAFETY: the range is exactly the live mapping created by `map`.
        unsafe {
            rustix::mm::msync(self.ptr.as_ptr().cast(), self.len, MsyncFlags::ASYNC)?;
        }
        Ok(())
    }

    /// Touch every page so later accesses do not fault.
    pub fn prefault(&self) {
        let page_size = rustix::param::page_size();
        let ptr = self.ptr.as_ptr();
        for offset in (0..self.len).step_by(page_size) {
            // SAFETY: `offset < len`, so the read stays inside the mapping.
            unsafe {
                std::ptr::read_volatile(ptr.add(offset));
            }
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: the region came from `map`; `unmap` skips this via ManuallyDrop.
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

// SAFETY: a shared file mapping may be accessed from any thread; callers
// coordinate access to the bytes themselves.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}
