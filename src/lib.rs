//! # pmemvol
//!
//! Volatile memory emulated on a persistent-memory filesystem.
//!
//! Each allocation is a uniquely named file in a caller-chosen directory
//! (typically a DAX mount), sized to the request and mapped shared and
//! read/write into the address space. The region can be resized, which
//! remaps and copies, and is released with `free`, which unmaps, closes and
//! unlinks.
//!
//! ## Features
//!
//! - **Anonymous or durable backing**: unlink the file at creation, or keep
//!   its name so the content can be read back from disk
//! - **Explicit handles**: no global state; every allocation is its own
//!   `AllocationHandle`, serialized by its own mutex
//! - **Rollback on failure**: no descriptor, mapping or file survives a
//!   failed operation
//! - **Reclamation**: `cleanup_all` clears leftover backing files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pmemvol::prelude::*;
//!
//! let allocator = Allocator::default();
//! let (addr, handle) = allocator.allocate("/pmem/tmp", 4096, None)?;
//! let addr = allocator.resize(&handle, 8192)?;
//! allocator.free(addr, &handle)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod memory;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::memory::{
        AllocationHandle, Allocator, AllocatorConfig, BackingMode, DirectoryReaper, cleanup_all,
    };
}

pub use error::{Error, Result};
