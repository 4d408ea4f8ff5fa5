//! Check command - validate configuration and sources

use std::path::Path;

use color_eyre::eyre::{Result, bail};
use mosaic_generator::{Discoverer, Script};

use super::{load_config, project_root};

/// Run the check command.
///
/// Parses every page, error page, component and layout without rendering.
pub fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "Checking configuration and sources");

    println!("Checking configuration...");
    let config = load_config(config_path)?;
    println!("  ✓ Configuration valid");

    let content_dir = project_root(config_path).join(&config.build.content_dir);
    let discovery = Discoverer::new(
        &content_dir,
        &config.build.source_extension,
        &config.build.default_domain,
    )
    .discover();

    println!("\nChecking sources...");
    let paths = discovery
        .pages
        .iter()
        .map(|page| page.path.as_path())
        .chain(discovery.error_pages.iter().map(|page| page.path.as_path()))
        .chain(discovery.components.iter().map(|t| t.path.as_path()))
        .chain(discovery.layouts.iter().map(|t| t.path.as_path()));

    let mut checked = 0;
    let mut errors = Vec::new();
    for path in paths {
        checked += 1;
        if let Err(e) = Script::load(path) {
            println!("  ✗ {e}");
            errors.push(e);
        }
    }

    println!("\nSummary:");
    println!("  Domains: {}", discovery.domains.len());
    println!("  Sources: {checked}");
    println!("  Errors:  {}", errors.len());

    if !errors.is_empty() {
        bail!("Check failed with {} error(s)", errors.len());
    }

    println!("\n✓ All checks passed!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[test]
    fn test_check_valid_sources() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "content/default/index.mosaic", "<p>{{ site.title }}</p>");
        write(dir.path(), "content/default/_layouts/main.mosaic", "@pull");

        run(&dir.path().join("mosaic.toml")).unwrap();
    }

    #[test]
    fn test_check_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "content/default/index.mosaic", "@layout main\n<p>no end</p>");

        assert!(run(&dir.path().join("mosaic.toml")).is_err());
    }
}
