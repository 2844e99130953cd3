//! Configuration from `PMEMVOL_*` environment variables.
//!
//! The environment is process-global, so every test takes `ENV_LOCK` and
//! starts from a clean slate.

use pmemvol::Error;
use pmemvol::memory::{
    Allocator, AllocatorConfig, BackingMode, DEFAULT_FILE_PREFIX, ENV_MAX_SIZE, ENV_MODE,
    ENV_PREALLOCATE, ENV_PREFIX, ENV_SYNC_ON_FREE,
};
use std::sync::{Mutex, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ALL_VARS: [&str; 5] = [
    ENV_MODE,
    ENV_PREFIX,
    ENV_MAX_SIZE,
    ENV_PREALLOCATE,
    ENV_SYNC_ON_FREE,
];

/// Run `f` with exactly `vars` set among the `PMEMVOL_*` variables.
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    // SAFETY: ENV_LOCK serializes every environment access in this binary.
    unsafe {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
    }

    let result = f();

    // SAFETY: as above.
    unsafe {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }
    result
}

#[test]
fn test_unset_environment_gives_defaults() {
    let config = with_env(&[], AllocatorConfig::from_env).unwrap();
    assert_eq!(config, AllocatorConfig::default());
}

#[test]
fn test_every_variable_is_applied() {
    let config = with_env(
        &[
            (ENV_MODE, "durable"),
            (ENV_PREFIX, "scratch-"),
            (ENV_MAX_SIZE, " 1048576 "),
            (ENV_PREALLOCATE, "yes"),
            (ENV_SYNC_ON_FREE, "1"),
        ],
        AllocatorConfig::from_env,
    )
    .unwrap();

    assert_eq!(config.mode, BackingMode::Durable);
    assert_eq!(config.file_prefix, "scratch-");
    assert_eq!(config.max_size, Some(1 << 20));
    assert!(config.preallocate);
    assert!(config.sync_on_free);
}

#[test]
fn test_allocator_from_env() {
    let allocator = with_env(
        &[(ENV_MODE, "anon"), (ENV_MAX_SIZE, "8192")],
        Allocator::from_env,
    )
    .unwrap();

    assert_eq!(allocator.config().mode, BackingMode::Anonymous);
    assert_eq!(allocator.config().max_size, Some(8192));
    assert_eq!(allocator.config().file_prefix, DEFAULT_FILE_PREFIX);
}

#[test]
fn test_blank_value_counts_as_unset() {
    let config = with_env(&[(ENV_MODE, "  "), (ENV_MAX_SIZE, "")], AllocatorConfig::from_env)
        .unwrap();
    assert_eq!(config, AllocatorConfig::default());
}

#[test]
fn test_bad_max_size_rejected() {
    for value in ["lots", "-1", "4k"] {
        let result = with_env(&[(ENV_MAX_SIZE, value)], AllocatorConfig::from_env);
        assert!(
            matches!(result, Err(Error::InvalidArgument(_))),
            "{value}: {result:?}"
        );
    }

    // Parses, but fails validation
    let result = with_env(&[(ENV_MAX_SIZE, "0")], AllocatorConfig::from_env);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_bad_mode_rejected() {
    let result = with_env(&[(ENV_MODE, "persistent")], AllocatorConfig::from_env);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let result = with_env(&[(ENV_MODE, "persistent")], Allocator::from_env);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_bad_flags_rejected() {
    for key in [ENV_PREALLOCATE, ENV_SYNC_ON_FREE] {
        let result = with_env(&[(key, "maybe")], AllocatorConfig::from_env);
        assert!(matches!(result, Err(Error::InvalidArgument(_))), "{key}");
    }
}

#[test]
fn test_bad_prefix_rejected() {
    let result = with_env(&[(ENV_PREFIX, "a/b")], AllocatorConfig::from_env);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
