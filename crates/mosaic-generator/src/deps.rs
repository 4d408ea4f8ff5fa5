//! Persisted dependency graph for incremental builds.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use mosaic_render::Usage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid dependency graph: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DependencyError>;

/// What one page source used while rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub components: BTreeSet<String>,
    #[serde(default)]
    pub layouts: BTreeSet<String>,
    #[serde(default)]
    pub data: BTreeSet<String>,
}

impl From<&Usage> for Dependencies {
    fn from(usage: &Usage) -> Self {
        Self {
            components: usage.components.clone(),
            layouts: usage.layouts.clone(),
            data: usage.data.clone(),
        }
    }
}

/// Page sources keyed by content-relative path, with a reverse index from
/// data model to the pages reading it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    #[serde(default)]
    templates: BTreeMap<String, Dependencies>,
    #[serde(default)]
    data: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a persisted graph. A missing file is an empty graph.
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
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Replace the entry of `source`.
    pub fn record(&mut self, source: &str, dependencies: Dependencies) {
        self.remove(source);
        for model in &dependencies.data {
            self.data
                .entry(model.clone())
                .or_default()
                .insert(source.to_string());
        }
        self.templates.insert(source.to_string(), dependencies);
    }

    /// Drop `source` and its reverse index entries.
    pub fn remove(&mut self, source: &str) {
        if let Some(previous) = self.templates.remove(source) {
            for model in previous.data {
                if let Some(pages) = self.data.get_mut(&model) {
                    pages.remove(source);
                    if pages.is_empty() {
                        self.data.remove(&model);
                    }
                }
            }
        }
    }

    pub fn get(&self, source: &str) -> Option<&Dependencies> {
        self.templates.get(source)
    }

    /// Pages whose render included the component `name`.
    pub fn component_dependents(&self, name: &str) -> BTreeSet<String> {
        self.templates
            .iter()
            .filter(|(_, deps)| deps.components.contains(name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Pages whose render included the layout `name`.
    pub fn layout_dependents(&self, name: &str) -> BTreeSet<String> {
        self.templates
            .iter()
            .filter(|(_, deps)| deps.layouts.contains(name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Pages that read the data model `model`.
    pub fn data_dependents(&self, model: &str) -> BTreeSet<String> {
        self.data.get(model).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
