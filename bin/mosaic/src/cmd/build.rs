//! Build command - generates the whole site

use std::{path::Path, time::Instant};

use color_eyre::eyre::{Result, WrapErr};
use mosaic_generator::Builder;

use super::{load_config, project_root};

/// Run the build command.
///
/// Renders every page of every domain into the output directory.
pub fn run(config_path: &Path, output: Option<&Path>, force: bool) -> Result<()> {
    let start = Instant::now();
    tracing::info!(?config_path, ?output, force, "Starting build");

    let mut config = load_config(config_path)?;

    // Override output directory if specified
    if let Some(output) = output {
        config.build.output_dir = output.to_string_lossy().to_string();
    }
    config.build.force |= force;

    tracing::debug!(?config, "Loaded configuration");

    let output_dir = project_root(config_path).join(&config.build.output_dir);
    let builder = Builder::from_root(config, project_root(config_path));
    let stats = builder.build().wrap_err("Build failed")?;

    let duration = start.elapsed();

    // Print build statistics
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Pages:        {}", stats.pages);
    println!("  Error pages:  {}", stats.error_pages);
    println!("  Assets:       {}", stats.assets);
    println!("  Public files: {}", stats.global_assets);
    println!();
    println!("  Duration:     {:.2}s", duration.as_secs_f64());
    println!("  Output:       {}", output_dir.display());
    println!();

    tracing::info!(?stats, ?duration, "Build completed successfully");

    Ok(())
}
