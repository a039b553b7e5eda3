//! Error types for schema definition and value validation.

use crate::field::FieldType;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// An inconsistent schema or field definition.
///
/// Raised only while compiling definitions, never while validating
/// submissions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("field '{key}': {problem}")]
    Field { key: String, problem: FieldConfigProblem },

    #[error("duplicate field key '{0}'")]
    DuplicateKey(String),

    #[error("schema name cannot be empty")]
    EmptySchemaName,
}

impl ConfigurationError {
    pub(crate) fn field(key: &str, problem: FieldConfigProblem) -> Self {
        ConfigurationError::Field {
            key: key.to_string(),
            problem,
        }
    }
}

/// What is wrong with a single field definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldConfigProblem {
    #[error("key must be a valid slug (letters, numbers, underscores or hyphens, at most 100 characters)")]
    InvalidKey,

    #[error("label cannot be empty")]
    EmptyLabel,

    #[error("min_length cannot be greater than max_length")]
    LengthBounds,

    #[error("min_value cannot be greater than max_value")]
    ValueBounds,

    #[error("choices must be set for choice and multichoice fields")]
    MissingChoices,

    #[error("choices contain an empty value")]
    EmptyChoice,

    #[error("duplicate choice value '{0}'")]
    DuplicateChoice(String),

    #[error("file_extensions cannot be empty when extension checking is enabled")]
    EmptyExtensions,

    #[error("regex pattern cannot be empty")]
    EmptyPattern,

    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),

    #[error("unsupported regex flags: {0:#x}")]
    UnsupportedFlags(u32),

    #[error("{constraint} does not apply to {field_type} fields")]
    NotApplicable {
        constraint: &'static str,
        field_type: FieldType,
    },
}

/// A single failed rule for one submitted value.
///
/// `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("This field is required.")]
    Required,

    #[error("Unknown field key for this form.")]
    UnknownField,

    #[error("{}", .0.invalid_message())]
    InvalidType(FieldType),

    #[error("Select a valid choice.")]
    InvalidChoice,

    #[error("Enter a list of choices.")]
    NotAList,

    #[error("One or more selected choices are invalid.")]
    InvalidChoices { invalid: Vec<String> },

    #[error("Ensure this value has at least {limit} characters (it has {actual}).")]
    TooShort { limit: usize, actual: usize },

    #[error("Ensure this value has at most {limit} characters (it has {actual}).")]
    TooLong { limit: usize, actual: usize },

    #[error("Ensure this value is greater than or equal to {limit}.")]
    BelowMinimum { limit: Decimal },

    #[error("Ensure this value is less than or equal to {limit}.")]
    AboveMaximum { limit: Decimal },

    #[error("{message}")]
    PatternMismatch { message: String },

    #[error("Enter a valid email address.")]
    InvalidEmail,

    #[error("Enter a valid URL.")]
    InvalidUrl,

    #[error("File extension “{extension}” is not allowed. Allowed extensions are: {allowed}.")]
    ExtensionNotAllowed { extension: String, allowed: String },
}

/// All field errors of one submission, keyed by field key.
///
/// Serializes as `{ "key": ["message", ...] }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `key`. The same error is recorded once per key.
    pub fn add(&mut self, key: impl Into<String>, error: FieldError) {
        let entry = self.errors.entry(key.into()).or_default();
        if !entry.contains(&error) {
            entry.push(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of keys with at least one error.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, key: &str) -> &[FieldError] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str, error: &FieldError) -> bool {
        self.get(key).contains(error)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldError])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Messages keyed by field, the shape callers display.
    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.errors
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().map(ToString::to_string).collect()))
            .collect()
    }

    pub fn into_result<T>(self, ok: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(ok)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, errors) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: ", key)?;
            for (i, err) in errors.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", err)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.messages().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_match_user_facing_text() {
        assert_eq!(FieldError::Required.to_string(), "This field is required.");
        assert_eq!(
            FieldError::InvalidType(FieldType::Integer).to_string(),
            "Enter a whole number."
        );
        assert_eq!(
            FieldError::TooShort { limit: 3, actual: 1 }.to_string(),
            "Ensure this value has at least 3 characters (it has 1)."
        );
        assert_eq!(
            FieldError::BelowMinimum { limit: Decimal::from(18) }.to_string(),
            "Ensure this value is greater than or equal to 18."
        );
    }

    #[test]
    fn test_add_deduplicates_per_key() {
        let mut errors = FieldErrors::new();
        errors.add("age", FieldError::Required);
        errors.add("age", FieldError::Required);
        errors.add("name", FieldError::Required);
        assert_eq!(errors.get("age").len(), 1);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_serializes_as_message_map() {
        let mut errors = FieldErrors::new();
        errors.add("not_a_field", FieldError::UnknownField);
        errors.add("age", FieldError::InvalidType(FieldType::Integer));

        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            value,
            json!({
                "age": ["Enter a whole number."],
                "not_a_field": ["Unknown field key for this form."]
            })
        );
    }

    #[test]
    fn test_display_lists_every_key() {
        let mut errors = FieldErrors::new();
        errors.add("a", FieldError::Required);
        errors.add("b", FieldError::InvalidChoice);
        let text = errors.to_string();
        assert!(text.contains("a: This field is required."));
        assert!(text.contains("b: Select a valid choice."));
    }
}
