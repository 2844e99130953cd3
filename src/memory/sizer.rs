//! Backing file sizing.

use crate::error::Result;
use rustix::fd::AsFd;
use rustix::fs::FallocateFlags;
use rustix::io::Errno;

/// Sets backing files to an exact length before they are mapped.
///
/// The sizer owns no resource: on failure the descriptor is left open for
/// the caller to close.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSizer {
    preallocate: bool,
}

impl FileSizer {
    /// Create a sizer that only sets the file length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reserve device blocks for the whole length.
    ///
    /// Without this, a sparse file on a full device only fails when a page is
    /// first written through the mapping.
    pub fn with_preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// Set the file length to exactly `size` bytes.
    ///
    /// Bytes past the previous end of file read as zero. An existing mapping
    /// of the file is not resized.
    pub fn grow_to<Fd: AsFd>(&self, fd: Fd, size: u64) -> Result<()> {
        let fd = fd.as_fd();
        rustix::fs::ftruncate(fd, size)?;

        if self.preallocate && size > 0 {
            match rustix::fs::fallocate(fd, FallocateFlags::empty(), 0, size) {
                Ok(()) => {}
                // Filesystems without fallocate keep the sparse file
                Err(Errno::OPNOTSUPP) => {
                    tracing::debug!(size, "fallocate unsupported, file left sparse");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_grow_sets_exact_length() {
        let file = tempfile().unwrap();
        FileSizer::new().grow_to(&file, 8192).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 8192);
    }

    #[test]
    fn test_shrink_sets_exact_length() {
        let file = tempfile().unwrap();
        let sizer = FileSizer::new();
        sizer.grow_to(&file, 8192).unwrap();
        sizer.grow_to(&file, 100).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 100);
    }

    #[test]
    fn test_grown_region_reads_zero() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let mut file = tempfile().unwrap();
        file.write_all(b"abc").unwrap();
        FileSizer::new().grow_to(&file, 16).unwrap();

        let mut buf = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(&buf[..3], b"abc");
        assert!(buf[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_preallocate() {
        let file = tempfile().unwrap();
        FileSizer::new()
            .with_preallocate(true)
            .grow_to(&file, 64 * 1024)
            .unwrap();
        assert_eq!(file.metadata().unwrap().len(), 64 * 1024);
    }
}
