//! CLI command implementations.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use mosaic_core::Config;

pub mod build;
pub mod check;
pub mod rebuild;

/// Load `mosaic.toml` with `MOSAIC__SECTION__KEY` overrides. A missing file
/// means all defaults.
pub(crate) fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        tracing::info!(?config_path, "no configuration file, using defaults");
    }
    Config::load_with_env(config_path).wrap_err("Failed to load configuration")
}

/// Project root: the directory holding the configuration file.
pub(crate) fn project_root(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
