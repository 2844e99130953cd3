//! Allocator configuration and defaults.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pmemvol::memory::{Allocator, AllocatorConfig};
//!
//! // Keep backing files visible so their content can be inspected
//! let allocator = Allocator::new(AllocatorConfig::durable().with_preallocate(true));
//! ```

use crate::error::{Error, Result};
use std::env;
use std::str::FromStr;

// =============================================================================
// Defaults
// =============================================================================

/// Default file name prefix for backing files.
pub const DEFAULT_FILE_PREFIX: &str = "pmem.";

/// Default number of random characters appended to the prefix.
pub const DEFAULT_SUFFIX_LEN: usize = 6;

/// Environment variable selecting the backing mode (`anonymous` or `durable`).
pub const ENV_MODE: &str = "PMEMVOL_MODE";

/// Environment variable overriding the backing file prefix.
pub const ENV_PREFIX: &str = "PMEMVOL_PREFIX";

/// Environment variable setting the per-allocation size ceiling in bytes.
pub const ENV_MAX_SIZE: &str = "PMEMVOL_MAX_SIZE";

/// Environment variable enabling block preallocation.
pub const ENV_PREALLOCATE: &str = "PMEMVOL_PREALLOCATE";

/// Environment variable enabling `msync` before unmapping in `free`.
pub const ENV_SYNC_ON_FREE: &str = "PMEMVOL_SYNC_ON_FREE";

/// What happens to a backing file's name after it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackingMode {
    /// Unlink the file right after creation.
    ///
    /// The descriptor and mapping stay valid, but the file is invisible in the
    /// directory. This emulates anonymous memory backed by the device.
    #[default]
    Anonymous,
    /// Keep the file name so the backing content can be read back directly.
    Durable,
}

impl BackingMode {
    /// Whether backing files keep their path in this mode.
    #[inline]
    pub fn retains_path(&self) -> bool {
        matches!(self, BackingMode::Durable)
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackingMode::Anonymous => "anonymous",
            BackingMode::Durable => "durable",
        }
    }
}

impl FromStr for BackingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" | "anon" => Ok(BackingMode::Anonymous),
            "durable" | "named" => Ok(BackingMode::Durable),
            other => Err(Error::InvalidArgument(format!(
                "unknown backing mode '{other}'"
            ))),
        }
    }
}

/// Configuration for an [`Allocator`](super::Allocator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Backing file naming policy.
    pub mode: BackingMode,
    /// Fixed part of every backing file name.
    pub file_prefix: String,
    /// Number of random characters after the prefix.
    pub suffix_len: usize,
    /// Largest size a single allocation may have.
    pub max_size: Option<usize>,
    /// Reserve device blocks with `fallocate` after sizing the file.
    pub preallocate: bool,
    /// Flush the mapping to the backing file before it is unmapped by `free`.
    pub sync_on_free: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            mode: BackingMode::Anonymous,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            suffix_len: DEFAULT_SUFFIX_LEN,
            max_size: None,
            preallocate: false,
            sync_on_free: false,
        }
    }
}

impl AllocatorConfig {
    /// Configuration whose backing files are unlinked right after creation.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Configuration whose backing files keep their names until `free`.
    pub fn durable() -> Self {
        Self {
            mode: BackingMode::Durable,
            ..Self::default()
        }
    }

    /// Build a configuration from `PMEMVOL_*` environment variables.
    ///
    /// Unset variables keep their defaults. A value that is set but cannot be
    /// parsed is reported as [`Error::InvalidArgument`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = read_env(ENV_MODE) {
            config.mode = mode.parse()?;
        }
        if let Some(prefix) = read_env(ENV_PREFIX) {
            config = config.with_prefix(prefix);
        }
        if let Some(max) = read_env(ENV_MAX_SIZE) {
            let max = max.trim().parse::<usize>().map_err(|e| {
                Error::InvalidArgument(format!("{ENV_MAX_SIZE}='{max}': {e}"))
            })?;
            config.max_size = Some(max);
        }
        if let Some(flag) = read_env(ENV_PREALLOCATE) {
            config.preallocate = parse_flag(ENV_PREALLOCATE, &flag)?;
        }
        if let Some(flag) = read_env(ENV_SYNC_ON_FREE) {
            config.sync_on_free = parse_flag(ENV_SYNC_ON_FREE, &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the backing mode.
    pub fn with_mode(mut self, mode: BackingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the backing file prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Set the number of random suffix characters.
    pub fn with_suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len;
        self
    }

    /// Cap the size of any single allocation.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Enable or disable block preallocation.
    pub fn with_preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// Enable or disable `msync` before unmapping in `free`.
    pub fn with_sync_on_free(mut self, sync: bool) -> Self {
        self.sync_on_free = sync;
        self
    }

    /// Check that the configuration can produce valid file names.
    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.contains('/') || self.file_prefix.contains('\0') {
            return Err(Error::InvalidArgument(format!(
                "file prefix '{}' must be a plain file name",
                self.file_prefix
            )));
        }
        if self.suffix_len == 0 {
            return Err(Error::InvalidArgument(
                "suffix length must be greater than 0".into(),
            ));
        }
        if self.max_size == Some(0) {
            return Err(Error::InvalidArgument(
                "max size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidArgument(format!(
            "{key}='{other}' is not a boolean"
        ))),
    }
}
