//! CLI module for Intake
//!
//! Schema commands (`check-schema`, `validate`) work on files only. Form
//! commands (`import-schema`, `assign`, `show-page`, `submit`) use the SQLite
//! database named in the configuration.

pub mod config;
pub mod error;
pub mod form;
pub mod schema;

use crate::cli::error::HelpfulError;
use anyhow::{Context, Result};
use intake::IntakeConfig;
use intake_schema::{FieldValue, SchemaField};
use intake_store::SqliteStore;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read a file holding one JSON object.
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Err(HelpfulError::file_not_found(path).into());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HelpfulError::json_parse_error(
            path,
            &format!("expected an object, found {}", json_kind(&other)),
        )
        .into()),
        Err(err) => Err(HelpfulError::json_parse_error(path, &err.to_string()).into()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Resolve a schema file argument: the path itself, else a file of that
/// name under the configured schema directory.
pub fn resolve_schema_path(file: &Path, config: &IntakeConfig) -> Result<PathBuf> {
    if file.exists() {
        return Ok(file.to_path_buf());
    }
    let in_schema_dir = config.schema_dir.join(file);
    if file.is_relative() && in_schema_dir.exists() {
        return Ok(in_schema_dir);
    }
    Err(HelpfulError::file_not_found(file)
        .with_suggestion(format!(
            "TRY: Place schema files under {}",
            config.schema_dir.display()
        ))
        .into())
}

pub fn open_store(config: &IntakeConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    Ok(Arc::new(store))
}

/// JSON description of one field, with an optional current value.
pub fn field_json(field: &SchemaField, value: Option<&FieldValue>) -> Value {
    let choices: Vec<Value> = field
        .constraints()
        .choices()
        .iter()
        .map(|c| serde_json::json!({ "value": c.value, "label": c.label }))
        .collect();
    serde_json::json!({
        "key": field.key(),
        "label": field.label(),
        "type": field.field_type().as_str(),
        "required": field.is_required(),
        "help_text": field.display_help_text(),
        "choices": choices,
        "value": value.map(FieldValue::to_json),
    })
}
