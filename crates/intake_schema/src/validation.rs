//! Whole-submission validation and merge.

use crate::coerce::ValueCoercer;
use crate::error::{FieldError, FieldErrors};
use crate::field::SchemaField;
use crate::value::{json_is_blank, FieldValue};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Stored answers of a document, keyed by field key.
pub type ResultMap = BTreeMap<String, Value>;

/// Raw answers of one submission, keyed by field key.
pub type SubmittedMap = BTreeMap<String, FieldValue>;

/// Validates submissions against a fixed set of fields, typically one page.
#[derive(Debug, Clone, Copy)]
pub struct ValidationEngine<'a> {
    fields: &'a [SchemaField],
}

impl<'a> ValidationEngine<'a> {
    pub fn new(fields: &'a [SchemaField]) -> Self {
        Self { fields }
    }

    fn field(&self, key: &str) -> Option<&'a SchemaField> {
        self.fields.iter().find(|f| f.key() == key)
    }

    /// Validate `submitted` on top of `previous`.
    ///
    /// On success returns `previous` with every submitted key replaced by its
    /// canonical stored value. On failure returns every error found and
    /// leaves `previous` untouched.
    pub fn validate(&self, submitted: &SubmittedMap, previous: &ResultMap) -> Result<ResultMap, FieldErrors> {
        let mut errors = FieldErrors::new();

        for key in submitted.keys() {
            if self.field(key).is_none() {
                errors.add(key.clone(), FieldError::UnknownField);
            }
        }

        for field in self.fields.iter().filter(|f| f.is_required()) {
            let blank = match submitted.get(field.key()) {
                Some(value) => value.is_blank(),
                None => previous.get(field.key()).map_or(true, json_is_blank),
            };
            if blank {
                errors.add(field.key(), FieldError::Required);
            }
        }

        let mut stored: Vec<(&str, Value)> = Vec::with_capacity(submitted.len());
        for (key, raw) in submitted {
            let Some(field) = self.field(key) else {
                continue;
            };
            match ValueCoercer::new(field).coerce(raw) {
                Ok(typed) => stored.push((key, typed.map_or(Value::Null, |v| v.to_json()))),
                Err(err) => errors.add(key.clone(), err),
            }
        }

        if !errors.is_empty() {
            debug!(
                error_keys = errors.len(),
                submitted = submitted.len(),
                "submission rejected"
            );
            return Err(errors);
        }

        let mut merged = previous.clone();
        for (key, value) in stored {
            merged.insert(key.to_string(), value);
        }
        debug!(submitted = submitted.len(), merged = merged.len(), "submission accepted");
        Ok(merged)
    }
}

/// Validate `submitted` against `fields` and merge it into `previous`.
pub fn validate(fields: &[SchemaField], submitted: &SubmittedMap, previous: &ResultMap) -> Result<ResultMap, FieldErrors> {
    ValidationEngine::new(fields).validate(submitted, previous)
}

/// Decode a JSON object into a submission map.
pub fn submitted_from_json(value: &Value) -> Option<SubmittedMap> {
    match value {
        Value::Object(map) => Some(
            map.iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
        ),
        _ => None,
    }
}
