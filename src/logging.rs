//! Logging bootstrap.
//!
//! The crate logs through the `log` facade with per-module targets
//! (`emeter::port`, `emeter::pool`, ...). Applications either install their
//! own logger or call one of the initializers below.

use log::LevelFilter;

/// Initializes the logger from the `RUST_LOG` environment with `env_logger`.
pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

/// Initializes the logger at a fixed maximum level, ignoring `RUST_LOG`.
pub fn init_logger_at(level: LevelFilter) {
    let _ = env_logger::Builder::new().filter_level(level).try_init();
}
