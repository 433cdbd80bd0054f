//! Logging setup for talen-jobs
//! `RUST_LOG` overrides the level passed in.

use log::LevelFilter;

/// Initialise env_logger. Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
