//! Rebuild command - re-renders only the pages affected by changed files

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use color_eyre::eyre::{Result, WrapErr, bail};
use mosaic_generator::Builder;

use super::{load_config, project_root};

/// Run the rebuild command for the given changed paths.
pub fn run(config_path: &Path, changed: &[PathBuf]) -> Result<()> {
    if changed.is_empty() {
        bail!("No changed files given");
    }

    let start = Instant::now();
    tracing::info!(?config_path, count = changed.len(), "Starting incremental build");

    let config = load_config(config_path)?;
    let builder = Builder::from_root(config, project_root(config_path));
    let stats = builder
        .build_incremental(changed)
        .wrap_err("Incremental build failed")?;

    println!();
    println!("  Rebuilt {} file(s):", stats.files.len());
    for file in &stats.files {
        println!("    {}", file.display());
    }
    println!();
    println!("  Duration: {:.2}s", start.elapsed().as_secs_f64());
    println!();

    tracing::info!(?stats, "Incremental build completed");
    Ok(())
}
