//! Read-only record accessor returned by queries.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Serialize, Serializer};

use crate::{
    collection::{Collection, Record},
    error::{DataError, Result},
    value::Value,
};

/// One record of a collection, with its computed methods.
#[derive(Clone)]
pub struct Item {
    record: Arc<Record>,
    collection: Arc<Collection>,
}

impl Item {
    pub(crate) fn new(record: Arc<Record>, collection: Arc<Collection>) -> Self {
        Self { record, collection }
    }

    /// Model name of the owning collection.
    pub fn model(&self) -> &str {
        self.collection.name()
    }

    /// Field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.fields().get(key)
    }

    /// Field value, null when missing.
    pub fn field(&self, key: &str) -> &Value {
        self.record.field(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.record.fields().contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.record.fields().keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.record.fields().values()
    }

    /// Copy of all fields.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.record.fields().clone()
    }

    /// Records are immutable; assignment always fails.
    pub fn set(&self, key: &str, _value: impl Into<Value>) -> Result<()> {
        Err(DataError::ImmutableMutation {
            key: key.to_string(),
            model: self.model().to_string(),
        })
    }

    /// Evaluate a computed method.
    ///
    /// Results are memoized on the record per argument list, so repeated
    /// calls run the method once.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let key = format!(
            "{method}({})",
            serde_json::Value::Array(args.iter().map(Value::to_json).collect())
        );
        if let Some(value) = self.record.memoized(&key) {
            return Ok(value);
        }

        let Some(f) = self.collection.method(method).cloned() else {
            return Err(DataError::UnknownMethod {
                method: method.to_string(),
                model: self.model().to_string(),
            });
        };

        let value = f(self, args).map_err(|e| DataError::ItemMethod {
            method: method.to_string(),
            model: self.model().to_string(),
            source: Box::new(e),
        })?;
        self.record.memoize(key, value.clone());
        Ok(value)
    }

    /// Field if present, otherwise the zero-argument computed method of that
    /// name, otherwise null.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.get(name) {
            return Ok(value.clone());
        }
        if self.collection.has_method(name) {
            return self.call(name, &[]);
        }
        Ok(Value::Null)
    }

    /// Whether both items wrap the same record.
    pub fn same_record(&self, other: &Item) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("model", &self.model())
            .field("fields", self.record.fields())
            .finish()
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.record.fields().serialize(serializer)
    }
}
