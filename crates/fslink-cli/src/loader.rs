//! Loading JSON record files.
//!
//! Input files hold a JSON array of flat objects. Each file becomes one
//! table, named after the file stem.

use std::path::Path;

use fslink_core::{Record, RowSet, Value};
use thiserror::Error;

/// Errors raised while reading a record file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {message}")]
    Shape { path: String, message: String },
}

/// A loaded input table.
#[derive(Debug, Clone)]
pub struct InputTable {
    pub name: String,
    pub rows: RowSet,
}

/// Load a record file as a table.
pub fn load_table(path: &Path) -> Result<InputTable, LoadError> {
    let objects = read_objects(path)?;
    let display = path.display().to_string();

    let mut columns: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(objects.len());
    for object in &objects {
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = match object.get(column) {
                Some(v) => json_to_value(v).ok_or_else(|| LoadError::Shape {
                    path: display.clone(),
                    message: format!("column `{}` holds a nested value", column),
                })?,
                None => Value::Null,
            };
            row.push(value);
        }
        rows.push(row);
    }

    Ok(InputTable {
        name: table_name(path),
        rows: RowSet::new(columns, rows),
    })
}

/// Load a record file as name-keyed records.
pub fn load_records(path: &Path) -> Result<Vec<Record>, LoadError> {
    let table = load_table(path)?;
    Ok(table.rows.records())
}

fn read_objects(path: &Path) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, LoadError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    let parsed: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: display.clone(),
            source,
        })?;

    let serde_json::Value::Array(items) = parsed else {
        return Err(LoadError::Shape {
            path: display,
            message: "expected a JSON array of records".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(LoadError::Shape {
                path: display.clone(),
                message: format!("item {} is not an object", i),
            }),
        })
        .collect()
}

/// Convert a scalar JSON value. Arrays and objects have no cell form.
fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => Some(Value::Null),
        serde_json::Value::Bool(b) => Some(Value::Integer(i64::from(*b))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real)),
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

/// Table name from the file stem, reduced to a plain identifier.
fn table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert_str(0, "t_");
    }
    name
}
