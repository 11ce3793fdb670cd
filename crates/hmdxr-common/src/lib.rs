//! Shared utilities for hmdxr: settings, logging, error types.
//!
//! This crate provides common infrastructure used by the runtime and its tools.

#![forbid(unsafe_code)]

pub mod error;
pub mod settings;

pub use error::{Error, Result};
pub use settings::{JsonSettings, MemorySettings, Settings, SettingsProvider};

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a specific default level.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
