//! Commands behind the `mosaic` binary: `build`, `rebuild` and `check`
//! live in [`cmd`], logging setup in [`init_tracing`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use mosaic::cmd;
//!
//! // Build the site described by mosaic.toml into dist/
//! cmd::build::run(Path::new("mosaic.toml"), Some(Path::new("dist")), false).unwrap();
//! ```

pub mod cmd;

pub use mosaic_core::Config;
pub use mosaic_generator::{BuildStats, Builder};

/// Crates whose events follow the `-v` level; everything else stays at `warn`.
const LOG_TARGETS: [&str; 5] = [
    "mosaic",
    "mosaic_core",
    "mosaic_data",
    "mosaic_generator",
    "mosaic_render",
];

/// Filter directives for a `-v` count: 0 keeps warnings, each extra `v`
/// opens one more level on the mosaic crates.
pub fn log_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    std::iter::once("warn".to_string())
        .chain(LOG_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `MOSAIC_LOG` replaces the `-v` filter.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("MOSAIC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}
