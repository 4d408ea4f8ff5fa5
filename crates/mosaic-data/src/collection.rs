//! Named collections of immutable records.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::debug;

use crate::{
    error::{DataError, Result},
    item::Item,
    loader,
    query::Query,
    value::Value,
};

/// Scope: a named query transform taking arguments.
pub type ScopeFn = Arc<dyn Fn(&Query, &[Value]) -> Result<Query> + Send + Sync>;

/// Computed method evaluated against one record.
pub type MethodFn = Arc<dyn Fn(&Item, &[Value]) -> Result<Value> + Send + Sync>;

/// One frozen record plus the memo table of its computed methods.
#[derive(Debug, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    memo: Mutex<HashMap<String, Value>>,
}

impl Record {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Field value, null when missing.
    pub fn field(&self, key: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(key).unwrap_or(&NULL)
    }

    pub(crate) fn memoized(&self, key: &str) -> Option<Value> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn memoize(&self, key: String, value: Value) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

/// A named, immutable collection.
pub struct Collection {
    name: String,
    records: Vec<Arc<Record>>,
    scopes: HashMap<String, ScopeFn>,
    methods: HashMap<String, MethodFn>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<_> = self.scopes.keys().collect();
        scopes.sort();
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("records", &self.records.len())
            .field("scopes", &scopes)
            .field("methods", &methods)
            .finish()
    }
}

/// Builder handed to [`DataStore::define`](crate::DataStore::define).
pub struct Definition<'a> {
    name: String,
    data_dir: &'a Path,
    records: Vec<BTreeMap<String, Value>>,
    scopes: HashMap<String, ScopeFn>,
    methods: HashMap<String, MethodFn>,
}

impl<'a> Definition<'a> {
    pub(crate) fn new(name: impl Into<String>, data_dir: &'a Path) -> Self {
        Self {
            name: name.into(),
            data_dir,
            records: Vec::new(),
            scopes: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// Load every file matching `pattern` under the data directory, one record
    /// per file, in sorted path order.
    pub fn load(&mut self, pattern: &str) -> Result<&mut Self> {
        let full = self.data_dir.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| DataError::data_file(full.to_string(), format!("invalid pattern: {e}")))?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                DataError::data_file(e.path().display().to_string(), e.error().to_string())
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(DataError::data_file(
                full.to_string(),
                "no files match this pattern",
            ));
        }

        self.records = files
            .iter()
            .map(|path| loader::load_record(path))
            .collect::<Result<_>>()?;
        debug!(model = %self.name, records = self.records.len(), "loaded records");
        Ok(self)
    }

    /// Load a single file holding an array of records.
    pub fn load_array(&mut self, file: &str) -> Result<&mut Self> {
        let path = self.data_dir.join(file);
        self.records = loader::load_records(&path)?;
        debug!(model = %self.name, records = self.records.len(), "loaded records");
        Ok(self)
    }

    /// Use literal values, each of which must be a map.
    pub fn from_array(&mut self, values: impl IntoIterator<Item = Value>) -> Result<&mut Self> {
        let origin = format!("from_array({})", self.name);
        self.records = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| loader::expect_map(value, &origin, index))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Register a scope.
    pub fn scope<F>(&mut self, name: &str, scope: F) -> &mut Self
    where
        F: Fn(&Query, &[Value]) -> Result<Query> + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(scope));
        self
    }

    /// Register a computed method.
    pub fn method<F>(&mut self, name: &str, method: F) -> &mut Self
    where
        F: Fn(&Item, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(method));
        self
    }

    pub(crate) fn finish(self) -> Collection {
        Collection {
            name: self.name,
            records: self
                .records
                .into_iter()
                .map(|fields| Arc::new(Record::new(fields)))
                .collect(),
            scopes: self.scopes,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_from_array_rejects_non_maps() {
        let dir = Path::new("data");
        let mut def = Definition::new("posts", dir);
        let err = def
            .from_array(vec![map(&[("title", "a".into())]), Value::Int(3)])
            .err()
            .unwrap();
        assert!(err.to_string().contains("item 2"));
    }

    #[test]
    fn test_load_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let mut def = Definition::new("posts", dir.path());
        let err = def.load("posts/*.json").err().unwrap();
        assert!(matches!(err, DataError::DataFile { .. }));
        assert!(err.to_string().contains("no files match"));
    }

    #[test]
    fn test_load_sorted_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("posts")).unwrap();
        std::fs::write(dir.path().join("posts/b.json"), r#"{"title":"B"}"#).unwrap();
        std::fs::write(dir.path().join("posts/a.yaml"), "title: A\n").unwrap();
        std::fs::write(dir.path().join("posts/c.toml"), "title = \"C\"\n").unwrap();

        let mut def = Definition::new("posts", dir.path());
        def.load("posts/*").unwrap();
        let collection = def.finish();

        let titles: Vec<_> = collection
            .records()
            .iter()
            .map(|r| r.field("title").to_string())
            .collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert!(collection.records()[0].field("missing").is_null());
    }
}
