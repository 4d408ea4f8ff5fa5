//! Registry of named collections.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    collection::{Collection, Definition},
    error::{DataError, Result},
    loader,
    query::Query,
};

/// Named collections loaded from a data directory.
#[derive(Debug, Default)]
pub struct DataStore {
    data_dir: PathBuf,
    collections: BTreeMap<String, Arc<Collection>>,
    defined: HashSet<String>,
}

impl DataStore {
    /// Create an empty store reading files relative to `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            collections: BTreeMap::new(),
            defined: HashSet::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Define a collection. Redefining a name replaces it.
    pub fn define<F>(&mut self, name: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut Definition<'_>) -> Result<()>,
    {
        let mut definition = Definition::new(name, &self.data_dir);
        build(&mut definition)?;
        let collection = definition.finish();
        debug!(model = %name, records = collection.len(), "defined collection");

        self.collections
            .insert(name.to_string(), Arc::new(collection));
        self.defined.insert(name.to_string());
        Ok(())
    }

    /// Register collections found in the data directory that were not defined
    /// programmatically.
    ///
    /// A top-level file `<model>.json|yaml|yml|toml` holds an array of
    /// records; a directory `<model>/` holds one record per file. A `_data`
    /// suffix on the stem is dropped. Returns the registered model names.
    pub fn load_directory(&mut self) -> Result<Vec<String>> {
        if !self.data_dir.is_dir() {
            debug!(dir = %self.data_dir.display(), "no data directory");
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.data_dir).map_err(|e| {
            DataError::data_file(
                self.data_dir.display().to_string(),
                format!("could not be read: {e}"),
            )
        })?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();

        let mut registered = Vec::new();
        for path in paths {
            let Some(model) = model_name(&path) else {
                continue;
            };
            if self.defined.contains(&model) {
                continue;
            }

            let source = path.clone();
            let loaded = if path.is_dir() {
                self.auto_define(&model, |def| {
                    def.load(&format!("{}/*", dir_name(&source)))?;
                    Ok(())
                })
            } else if loader::is_data_file(&path) {
                self.auto_define(&model, |def| {
                    def.load_array(&dir_name(&source))?;
                    Ok(())
                })
            } else {
                continue;
            };
            loaded?;
            registered.push(model);
        }

        if !registered.is_empty() {
            info!(models = ?registered, "loaded data collections");
        }
        Ok(registered)
    }

    fn auto_define<F>(&mut self, name: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut Definition<'_>) -> Result<()>,
    {
        let mut definition = Definition::new(name, &self.data_dir);
        build(&mut definition)?;
        self.collections
            .insert(name.to_string(), Arc::new(definition.finish()));
        Ok(())
    }

    /// Start a query over a collection.
    pub fn query(&self, name: &str) -> Result<Query> {
        self.collection(name).map(Query::new)
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::UnknownCollection(name.to_string()))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Names of all collections, sorted.
    pub fn models(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Forget every collection.
    pub fn reload(&mut self) {
        self.collections.clear();
        self.defined.clear();
    }

    /// Model a changed data file belongs to: the first directory under the
    /// data directory, or the file stem without a `_data` suffix.
    pub fn model_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.data_dir).ok()?;
        let mut components = relative.components();
        let first = components.next()?;
        if components.next().is_some() {
            return Some(first.as_os_str().to_string_lossy().into_owned());
        }
        model_name(relative)
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn model_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') || stem.is_empty() {
        return None;
    }
    Some(stem.strip_suffix("_data").unwrap_or(stem).to_string())
}
