//! Bulk reclamation of leftover backing files.
//!
//! Backing files outlive their process only in durable mode, after a crash
//! or a leaked handle. [`cleanup_all`] removes every entry directly under a
//! directory; [`DirectoryReaper`] can restrict that to one name prefix.
//!
//! A failed removal does not stop the scan. Every entry is attempted and the
//! failures are reported together as [`Error::PartialCleanup`].

use crate::error::{Error, Result};
use crate::observability::record_reap;
use std::fs;
use std::path::{Path, PathBuf};

/// Remove every entry directly under `directory`.
///
/// Returns the number of entries removed. The directory itself is kept.
pub fn cleanup_all<P: AsRef<Path>>(directory: P) -> Result<usize> {
    DirectoryReaper::new(directory.as_ref()).reap()
}

/// Scans a directory and removes stray backing files.
#[derive(Debug, Clone)]
pub struct DirectoryReaper {
    directory: PathBuf,
    prefix: Option<String>,
}

impl DirectoryReaper {
    /// Reap every entry in `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: None,
        }
    }

    /// Only reap entries whose file name starts with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The directory being reaped.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Remove matching entries, each as a file.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the directory cannot be listed.
    /// - [`Error::PartialCleanup`] if at least one entry could not be removed.
    pub fn reap(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            Error::InvalidArgument(format!("directory {}: {e}", self.directory.display()))
        })?;

        let mut removed = 0;
        let mut failed = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        directory = %self.directory.display(),
                        error = %e,
                        "failed to read directory entry"
                    );
                    failed.push(self.directory.clone());
                    continue;
                }
            };

            if !self.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::trace!(path = %path.display(), "reaped");
                    removed += 1;
                }
                // Gone between listing and removal
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reap");
                    failed.push(path);
                }
            }
        }

        record_reap(&self.directory.to_string_lossy(), removed, failed.len());
        tracing::debug!(
            directory = %self.directory.display(),
            removed,
            failed = failed.len(),
            "directory reaped"
        );

        if failed.is_empty() {
            Ok(removed)
        } else {
            Err(Error::PartialCleanup { removed, failed })
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.prefix.as_deref().is_none_or(|p| name.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_all_removes_files() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("pmem.{i}")), b"stale").unwrap();
        }

        assert_eq!(cleanup_all(dir.path()).unwrap(), 5);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(cleanup_all(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_prefix_filter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pmem.aaaaaa"), b"").unwrap();
        fs::write(dir.path().join("pmem.bbbbbb"), b"").unwrap();
        fs::write(dir.path().join("keep.me"), b"").unwrap();

        let reaper = DirectoryReaper::new(dir.path()).with_prefix("pmem.");
        assert_eq!(reaper.reap().unwrap(), 2);
        assert!(dir.path().join("keep.me").exists());
        assert_eq!(reaper.directory(), dir.path());
    }

    #[test]
    fn test_subdirectory_is_reported_but_scan_continues() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();

        match cleanup_all(dir.path()) {
            Err(Error::PartialCleanup { removed, failed }) => {
                assert_eq!(removed, 2);
                assert_eq!(failed, vec![dir.path().join("nested")]);
            }
            other => panic!("expected PartialCleanup, got {other:?}"),
        }
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("b").exists());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let result = cleanup_all(dir.path().join("missing"));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
