//! Site configuration management.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Main configuration structure for Mosaic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    #[serde(default)]
    pub title: String,

    /// Base URL used for absolute asset URLs (e.g., "https://example.com").
    #[serde(default)]
    pub base_url: String,
}

/// Build configuration.
///
/// Directory settings are relative to the project root the builder runs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory holding `<domain>/...` page sources.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory holding collection sources.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directories copied verbatim to the output root.
    #[serde(default = "default_public_dirs")]
    pub public_dirs: Vec<String>,

    /// File extension of page, layout and component sources.
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Domain whose output lands at the output root instead of a subdirectory.
    #[serde(default = "default_domain")]
    pub default_domain: String,

    /// Directory (inside the output directory) for external stylesheets.
    #[serde(default = "default_css_dir")]
    pub css_dir: String,

    /// Public URL prefix of `css_dir`.
    #[serde(default = "default_css_url")]
    pub css_url: String,

    /// Remove the output directory before a full build.
    #[serde(default)]
    pub force: bool,
}

// Default value functions
fn default_content_dir() -> String {
    "content".to_string()
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_public_dirs() -> Vec<String> {
    vec!["public".to_string(), "static".to_string()]
}

fn default_source_extension() -> String {
    "mosaic".to_string()
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_css_dir() -> String {
    "css".to_string()
}

fn default_css_url() -> String {
    "/css".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            output_dir: default_output_dir(),
            data_dir: default_data_dir(),
            public_dirs: default_public_dirs(),
            source_extension: default_source_extension(),
            default_domain: default_domain(),
            css_dir: default_css_dir(),
            css_url: default_css_url(),
            force: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration layering `MOSAIC__SECTION__KEY` environment overrides
    /// on top of the file.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("MOSAIC").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let build = &self.build;
        if build.source_extension.is_empty() || build.source_extension.contains('.') {
            return Err(CoreError::invalid(
                "build.source_extension",
                "must be a non-empty extension without a dot",
            ));
        }
        if build.default_domain.is_empty() || build.default_domain.contains('/') {
            return Err(CoreError::invalid(
                "build.default_domain",
                "must be a single directory name",
            ));
        }
        if build.content_dir == build.output_dir {
            return Err(CoreError::invalid(
                "build.output_dir",
                "must differ from build.content_dir",
            ));
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!(base_url = %self.site.base_url, "site.base_url has a trailing slash");
        }
        Ok(())
    }

    /// Get the absolute URL for a site path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.site.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}
