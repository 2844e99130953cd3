//! Uniquely named backing files.
//!
//! A [`TempFileFactory`] creates one file per allocation directly under a
//! caller-supplied directory, named `<prefix><random suffix>`. Creation runs
//! with every signal blocked so an interrupted call cannot leave behind an
//! open descriptor or a file nobody tracks.
//!
//! In [`BackingMode::Anonymous`] the name is unlinked before the signal mask
//! is restored; the descriptor keeps the storage alive. In
//! [`BackingMode::Durable`] the name stays on disk until the file is released.

use super::config::{AllocatorConfig, BackingMode, DEFAULT_FILE_PREFIX, DEFAULT_SUFFIX_LEN};
use super::signal::SignalMaskGuard;
use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::{Access, FileType};
use rustix::io::Errno;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Longest path the platform accepts, including the terminating NUL.
pub const PATH_LIMIT: usize = libc::PATH_MAX as usize;

/// An open backing file.
///
/// Dropping it closes the descriptor and, if the name is still retained,
/// unlinks the file. Use [`TempFile::release`] to observe unlink errors.
#[derive(Debug)]
pub struct TempFile {
    fd: OwnedFd,
    path: Option<PathBuf>,
}

impl TempFile {
    /// Path of the file, if it was not unlinked at creation.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw descriptor number.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Unlink the name while keeping the descriptor open.
    ///
    /// On failure the path stays tracked, so dropping the file retries the
    /// unlink and logs the leftover path.
    fn unlink_now(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            unlink_if_present(path)?;
        }
        self.path = None;
        Ok(())
    }

    /// Close the descriptor, then unlink the file if it is still on disk.
    pub fn release(mut self) -> Result<()> {
        let path = self.path.take();
        drop(self);

        match path {
            Some(path) => unlink_if_present(&path),
            None => Ok(()),
        }
    }
}

impl AsFd for TempFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = unlink_if_present(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to unlink backing file");
            }
        }
        // fd is closed when OwnedFd is dropped
    }
}

/// Remove `path`, treating an already missing file as success.
pub(crate) fn unlink_if_present(path: &Path) -> Result<()> {
    match rustix::fs::unlink(path) {
        Ok(()) | Err(Errno::NOENT) => Ok(()),
        Err(e) => Err(Error::System(e)),
    }
}

/// Creates uniquely named backing files.
#[derive(Debug, Clone)]
pub struct TempFileFactory {
    prefix: String,
    suffix_len: usize,
    mode: BackingMode,
}

impl Default for TempFileFactory {
    fn default() -> Self {
        Self::new(BackingMode::default())
    }
}

impl TempFileFactory {
    /// Create a factory with the default prefix and suffix length.
    pub fn new(mode: BackingMode) -> Self {
        Self {
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            suffix_len: DEFAULT_SUFFIX_LEN,
            mode,
        }
    }

    /// Create a factory following an allocator configuration.
    pub fn from_config(config: &AllocatorConfig) -> Self {
        Self {
            prefix: config.file_prefix.clone(),
            suffix_len: config.suffix_len,
            mode: config.mode,
        }
    }

    /// Use a different file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The fixed part of generated file names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create a new, empty backing file in `directory`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the candidate path would exceed
    ///   [`PATH_LIMIT`], or `directory` does not exist, is not a directory, or
    ///   is not writable.
    /// - [`Error::ResourceExhausted`] if the descriptor table or the device is
    ///   full.
    /// - [`Error::Io`] for any other creation failure.
    ///
    /// No descriptor is leaked and no file is left on disk on any error path.
    pub fn create(&self, directory: &Path) -> Result<TempFile> {
        self.create_as(directory, self.mode)
    }

    /// Like [`TempFileFactory::create`], overriding the naming policy.
    pub fn create_as(&self, directory: &Path, mode: BackingMode) -> Result<TempFile> {
        self.check_directory(directory)?;

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&self.prefix).rand_bytes(self.suffix_len);
            builder
        };

        let _mask = SignalMaskGuard::block_all()?;

        // `make_in` hands back the open error untouched, so its errno can
        // still be classified.
        let named = builder
            .make_in(directory, |path| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(path)
            })
            .map_err(|e| Error::acquiring_io("create backing file", e))?;

        // From here on `TempFile` owns the name and unlinks it on drop.
        let (file, path) = named
            .keep()
            .map_err(|e| Error::acquiring_io("retain backing file", e.error))?;
        let mut file = TempFile {
            fd: OwnedFd::from(file),
            path: Some(path),
        };

        if !mode.retains_path() {
            file.unlink_now()?;
        }

        tracing::trace!(
            directory = %directory.display(),
            fd = file.as_raw_fd(),
            mode = mode.as_str(),
            "backing file created"
        );

        Ok(file)
    }

    fn check_directory(&self, directory: &Path) -> Result<()> {
        if directory.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("directory must not be empty".into()));
        }

        // directory + '/' + prefix + suffix + NUL
        let candidate_len =
            directory.as_os_str().len() + 1 + self.prefix.len() + self.suffix_len + 1;
        if candidate_len > PATH_LIMIT {
            return Err(Error::InvalidArgument(format!(
                "backing file path would be {candidate_len} bytes, limit is {PATH_LIMIT}"
            )));
        }

        let stat = rustix::fs::stat(directory).map_err(|e| {
            Error::InvalidArgument(format!("directory {}: {e}", directory.display()))
        })?;
        if FileType::from_raw_mode(stat.st_mode) != FileType::Directory {
            return Err(Error::InvalidArgument(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        rustix::fs::access(directory, Access::WRITE_OK | Access::EXEC_OK).map_err(|e| {
            Error::InvalidArgument(format!("directory {} not writable: {e}", directory.display()))
        })?;

        Ok(())
    }
}
