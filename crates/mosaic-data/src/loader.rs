//! JSON, YAML and TOML record loaders.

use std::{collections::BTreeMap, fs, path::Path};

use crate::{
    error::{DataError, Result},
    value::Value,
};

/// Extensions recognised as data sources.
pub const DATA_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

/// Whether `path` has a data source extension.
pub fn is_data_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext))
}

/// Parse a data file into a value according to its extension.
pub fn parse_file(path: &Path) -> Result<Value> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|e| DataError::data_file(&origin, format!("could not be read: {e}")))?;

    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match ext {
        "json" => serde_json::from_str::<serde_json::Value>(&content)
            .map(Value::from)
            .map_err(|e| DataError::data_file(&origin, format!("invalid JSON: {e}"))),
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(&content)
            .map(Value::from)
            .map_err(|e| DataError::data_file(&origin, format!("invalid YAML: {e}"))),
        "toml" => toml::from_str::<toml::Table>(&content)
            .map(|table| Value::from(toml::Value::Table(table)))
            .map_err(|e| DataError::data_file(&origin, format!("invalid TOML: {e}"))),
        other => Err(DataError::data_file(
            &origin,
            format!("unsupported data format '{other}', expected json, yaml, yml or toml"),
        )),
    }
}

/// Load a file holding exactly one record.
pub fn load_record(path: &Path) -> Result<BTreeMap<String, Value>> {
    match parse_file(path)? {
        Value::Map(map) => Ok(map),
        other => Err(DataError::data_file(
            path.display().to_string(),
            format!(
                "should hold a single map of fields, found {}",
                kind_name(&other)
            ),
        )),
    }
}

/// Load a file holding an array of records.
///
/// TOML cannot hold a top-level array, so a TOML file may instead hold one
/// array of tables (`[[posts]]`) as its only key.
pub fn load_records(path: &Path) -> Result<Vec<BTreeMap<String, Value>>> {
    let origin = path.display().to_string();
    let items = match parse_file(path)? {
        Value::Array(items) => items,
        Value::Map(mut map) if map.len() == 1 && is_toml(path) => {
            match map.pop_first().map(|(_, v)| v) {
                Some(Value::Array(items)) => items,
                _ => return Err(not_an_array(&origin)),
            }
        }
        _ => return Err(not_an_array(&origin)),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| expect_map(item, &origin, index))
        .collect()
}

/// Check that one entry of an array source is a map.
pub(crate) fn expect_map(
    value: Value,
    origin: &str,
    index: usize,
) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(DataError::data_file(
            origin,
            format!(
                "item {} should be a map of fields, found {}",
                index + 1,
                kind_name(&other)
            ),
        )),
    }
}

fn not_an_array(origin: &str) -> DataError {
    DataError::data_file(origin, "should hold an array of maps")
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Int(_) | Value::Float(_) => "a number",
        Value::String(_) => "a string",
        Value::Date(_) | Value::DateTime(_) => "a date",
        Value::Array(_) => "an array",
        Value::Map(_) => "a map",
    }
}
