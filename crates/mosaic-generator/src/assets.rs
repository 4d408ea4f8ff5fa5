//! Asset processing and management.
//!
//! Global directories are copied verbatim to the output root. Domain assets
//! under `content/<domain>/assets/` are fingerprinted with a SHA-256 content
//! hash and recorded in the manifest.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the per-domain asset directory.
pub const ASSETS_DIR: &str = "assets";

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid asset path.
    #[error("invalid asset path: {0}")]
    InvalidPath(PathBuf),

    /// Manifest could not be read or written.
    #[error("asset manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Mapping from `domain/relative/path` to the public URL of the hashed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    assets: BTreeMap<String, String>,
}

impl AssetManifest {
    /// Create a new empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a persisted manifest. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Add an asset to the manifest.
    pub fn add(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.assets.insert(key.into(), url.into());
    }

    /// Get the public URL recorded for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.assets.get(key).map(String::as_str)
    }

    /// Public URL of `name` in `domain`, or `/assets/<name>` when unknown.
    ///
    /// With a `base_url` the path is joined onto it, giving an absolute URL.
    #[must_use]
    pub fn url_for(&self, domain: &str, name: &str, base_url: Option<&str>) -> String {
        let name = name.trim_start_matches('/');
        let path = self
            .get(&format!("{domain}/{name}"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("/{ASSETS_DIR}/{name}"));
        match base_url {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => path,
        }
    }

    /// Get all assets in the manifest.
    #[must_use]
    pub fn assets(&self) -> &BTreeMap<String, String> {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Serialize manifest to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A domain asset scheduled to be written under its hashed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    pub source: PathBuf,
    /// Destination relative to the output directory.
    pub dest: PathBuf,
    pub key: String,
    pub url: String,
}

/// Plans and writes domain assets, copies global assets.
#[derive(Debug)]
pub struct AssetProcessor {
    content_dir: PathBuf,
    default_domain: String,
}

impl AssetProcessor {
    /// Create a new asset processor.
    #[must_use]
    pub fn new(content_dir: impl Into<PathBuf>, default_domain: impl Into<String>) -> Self {
        Self {
            content_dir: content_dir.into(),
            default_domain: default_domain.into(),
        }
    }

    /// Hash every domain asset and compute its destination, without writing.
    pub fn plan(&self, domains: &[String]) -> Result<Vec<PlannedAsset>> {
        let mut planned = Vec::new();

        for domain in domains {
            let source_dir = self.content_dir.join(domain).join(ASSETS_DIR);
            if !source_dir.is_dir() {
                continue;
            }

            let prefix = if *domain == self.default_domain {
                PathBuf::from(ASSETS_DIR)
            } else {
                Path::new(domain).join(ASSETS_DIR)
            };

            for path in visible_files(&source_dir) {
                let relative = path
                    .strip_prefix(&source_dir)
                    .map_err(|_| AssetError::InvalidPath(path.clone()))?;
                let hash = compute_hash(&fs::read(&path)?);
                let hashed = hashed_name(relative, &hash)
                    .ok_or_else(|| AssetError::InvalidPath(path.clone()))?;
                let dest = prefix.join(&hashed);

                planned.push(PlannedAsset {
                    key: format!("{domain}/{}", slash_path(relative)),
                    url: format!("/{}", slash_path(&dest)),
                    source: path,
                    dest,
                });
            }
        }

        debug!(count = planned.len(), "planned domain assets");
        Ok(planned)
    }

    /// Manifest of a plan.
    #[must_use]
    pub fn manifest(planned: &[PlannedAsset]) -> AssetManifest {
        let mut manifest = AssetManifest::new();
        for asset in planned {
            manifest.add(asset.key.clone(), asset.url.clone());
        }
        manifest
    }

    /// Write planned assets into the output directory.
    pub fn write(planned: &[PlannedAsset], output_dir: &Path) -> Result<usize> {
        for asset in planned {
            let dest = output_dir.join(&asset.dest);
            Self::copy_file(&asset.source, &dest)?;
            debug!(src = %asset.source.display(), dest = %dest.display(), "wrote asset");
        }
        Ok(planned.len())
    }

    /// Copy every visible file of `source_dir` into `dest_dir` unchanged.
    pub fn copy_dir(source_dir: &Path, dest_dir: &Path) -> Result<usize> {
        if !source_dir.is_dir() {
            debug!(dir = %source_dir.display(), "global asset directory missing, skipping");
            return Ok(0);
        }

        let mut count = 0;
        for path in visible_files(source_dir) {
            let relative = path
                .strip_prefix(source_dir)
                .map_err(|_| AssetError::InvalidPath(path.clone()))?;
            Self::copy_file(&path, &dest_dir.join(relative))?;
            count += 1;
        }

        info!(source = %source_dir.display(), count, "copied global assets");
        Ok(count)
    }

    /// Copy a single file, creating parent directories.
    pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        Ok(())
    }
}

/// First 8 hex characters of the SHA-256 of `bytes`.
pub fn compute_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)[..8].to_string()
}

/// `dir/name.ext` becomes `dir/name-<hash>.ext`.
fn hashed_name(relative: &Path, hash: &str) -> Option<PathBuf> {
    let stem = relative.file_stem()?.to_string_lossy();
    let name = match relative.extension() {
        Some(ext) => format!("{stem}-{hash}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{hash}"),
    };
    Some(match relative.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    })
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Files under `dir`, skipping hidden entries, in a stable order.
fn visible_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
