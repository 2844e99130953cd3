//! File-backed volatile memory.
//!
//! # Architecture
//!
//! - [`TempFileFactory`]: creates a uniquely named backing file in a directory
//! - [`FileSizer`]: sets the backing file to its exact length
//! - [`Mapping`]: shared read/write mapping of the backing file
//! - [`AllocationHandle`]: binds one mapping to its backing file
//! - [`Allocator`]: `allocate`, `resize`, `recreate` and `free`
//! - [`DirectoryReaper`]: removes leftover backing files from a directory
//!
//! # Example
//!
//! ```rust,ignore
//! use pmemvol::memory::{Allocator, AllocatorConfig, cleanup_all};
//!
//! cleanup_all("/pmem/tmp")?;
//!
//! let allocator = Allocator::new(AllocatorConfig::durable())?;
//! let (addr, handle) = allocator.allocate("/pmem/tmp", 1 << 30, None)?;
//!
//! unsafe { addr.as_ptr().copy_from_nonoverlapping(b"Hello World".as_ptr(), 11) };
//! let on_disk = std::fs::read(handle.backing_path()?.unwrap())?;
//! assert_eq!(&on_disk[..11], b"Hello World");
//!
//! allocator.free(addr, &handle)?;
//! ```

mod allocator;
mod config;
mod handle;
mod mapping;
mod reaper;
mod signal;
mod sizer;
mod tmpfile;

pub use allocator::Allocator;
pub use config::{
    AllocatorConfig, BackingMode, DEFAULT_FILE_PREFIX, DEFAULT_SUFFIX_LEN, ENV_MAX_SIZE, ENV_MODE,
    ENV_PREALLOCATE, ENV_PREFIX, ENV_SYNC_ON_FREE,
};
pub use handle::AllocationHandle;
pub use mapping::Mapping;
pub use reaper::{DirectoryReaper, cleanup_all};
pub use sizer::FileSizer;
pub use tmpfile::{PATH_LIMIT, TempFile, TempFileFactory};
