//! Form schemas: a named, ordered set of compiled fields.

use crate::error::ConfigurationError;
use crate::field::{FieldDefinition, SchemaField};
use crate::validation::{self, ResultMap, SubmittedMap};
use crate::FieldErrors;
use intake_ids::SchemaId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A schema as written by the designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SchemaId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON schema definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML schema definition: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported schema file extension: {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigurationError),
}

/// A compiled form schema.
///
/// Fields are ordered by `order`, ties keep declaration order. Keys are
/// unique.
#[derive(Debug, Clone)]
pub struct FormSchema {
    id: SchemaId,
    name: String,
    slug: String,
    description: Option<String>,
    active: bool,
    fields: Vec<SchemaField>,
}

impl FormSchema {
    pub fn new(
        id: SchemaId,
        name: impl Into<String>,
        mut fields: Vec<SchemaField>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptySchemaName);
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.key()) {
                return Err(ConfigurationError::DuplicateKey(field.key().to_string()));
            }
        }
        fields.sort_by_key(SchemaField::order);

        Ok(Self {
            id,
            slug: slugify(&name),
            name,
            description: None,
            active: true,
            fields,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = Some(description).filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Compile a definition. A definition without an id gets a fresh one.
    pub fn from_definition(def: &SchemaDefinition) -> Result<Self, ConfigurationError> {
        let fields = def
            .fields
            .iter()
            .map(FieldDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let id = def.id.clone().unwrap_or_default();
        let schema = Self::new(id, def.name.clone(), fields)?.with_active(def.active);
        Ok(match &def.description {
            Some(d) => schema.with_description(d.clone()),
            None => schema,
        })
    }

    /// The definition this schema compiles from, fields in display order.
    pub fn to_definition(&self) -> SchemaDefinition {
        SchemaDefinition {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            description: self.description.clone(),
            active: self.active,
            fields: self.fields.iter().map(|f| f.definition().clone()).collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaLoadError> {
        let def: SchemaDefinition = serde_json::from_str(json)?;
        Ok(Self::from_definition(&def)?)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, SchemaLoadError> {
        let def: SchemaDefinition = toml::from_str(toml_str)?;
        Ok(Self::from_definition(&def)?)
    }

    /// Load a `.json` or `.toml` schema definition.
    pub fn load_file(path: &Path) -> Result<Self, SchemaLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let schema = match ext.as_deref() {
            Some("json") => Self::from_json_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            _ => return Err(SchemaLoadError::UnsupportedFormat(path.to_path_buf())),
        };
        debug!(path = %path.display(), schema = %schema.slug, fields = schema.fields.len(), "loaded schema");
        Ok(schema)
    }

    pub fn id(&self) -> &SchemaId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fields in display order.
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.key() == key)
    }

    /// Validate a submission against every field of the schema.
    pub fn validate(&self, submitted: &SubmittedMap, previous: &ResultMap) -> Result<ResultMap, FieldErrors> {
        validation::validate(&self.fields, submitted, previous)
    }
}

/// Lower-case ASCII slug: runs of spaces and hyphens become one hyphen, other
/// punctuation is dropped.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }
    out.trim_matches('_').to_string()
}
