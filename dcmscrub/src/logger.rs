// dcmscrub/src/logger.rs
//! Logger setup for the `dcmscrub` binary.
//!
//! `RUST_LOG` is honoured with an `info` default. An explicit level passed by
//! the CLI (`--quiet`, `--debug`, `--disable-debug`) overrides it for every
//! module.
//!
//! License: MIT OR Apache-2.0

use env_logger::{Builder, Env};
use log::LevelFilter;

/// The level implied by the global flags, or `None` to defer to `RUST_LOG`.
/// `--quiet` wins over `--debug`, and `--disable-debug` caps the level at `Info`.
pub fn level_for_flags(quiet: bool, debug: bool, disable_debug: bool) -> Option<LevelFilter> {
    if quiet {
        Some(LevelFilter::Off)
    } else if disable_debug {
        Some(LevelFilter::Info)
    } else if debug {
        Some(LevelFilter::Debug)
    } else {
        None
    }
}

/// Installs `env_logger`. Calling it twice is harmless.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).format_target(false);
    let _ = builder.try_init();
}
