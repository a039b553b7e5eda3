//! Field definitions.
//!
//! A designer writes a [`FieldDefinition`] (JSON or TOML). Compiling it
//! checks the constraint set once and produces an immutable [`SchemaField`]
//! with the regex compiled and the choice domain normalized. Submissions only
//! ever see compiled fields.

use crate::coerce::{rules_for, ValueShape};
use crate::error::{ConfigurationError, FieldConfigProblem};
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

const MAX_KEY_LEN: usize = 100;

/// The closed set of field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Email,
    Url,
    Date,
    Datetime,
    Choice,
    Multichoice,
    File,
}

impl FieldType {
    pub const ALL: [FieldType; 11] = [
        FieldType::Text,
        FieldType::Integer,
        FieldType::Decimal,
        FieldType::Boolean,
        FieldType::Email,
        FieldType::Url,
        FieldType::Date,
        FieldType::Datetime,
        FieldType::Choice,
        FieldType::Multichoice,
        FieldType::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Choice => "choice",
            FieldType::Multichoice => "multichoice",
            FieldType::File => "file",
        }
    }

    /// Human label of the expected input, shown next to help text.
    pub fn label(&self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Integer => "Integer",
            FieldType::Decimal => "Decimal number",
            FieldType::Boolean => "Yes / No",
            FieldType::Email => "Email address",
            FieldType::Url => "URL",
            FieldType::Date => "Date (YYYY-MM-DD)",
            FieldType::Datetime => "Date & time",
            FieldType::Choice => "Single choice",
            FieldType::Multichoice => "Multiple choice",
            FieldType::File => "File",
        }
    }

    /// Message used when a value cannot be coerced to this type.
    pub fn invalid_message(&self) -> &'static str {
        match self {
            FieldType::Text => "Enter a valid text value.",
            FieldType::Integer => "Enter a whole number.",
            FieldType::Decimal => "Enter a valid number.",
            FieldType::Boolean => "Enter a valid boolean.",
            FieldType::Email => "Enter a valid email address.",
            FieldType::Url => "Enter a valid URL.",
            FieldType::Date => "Enter a valid date (YYYY-MM-DD).",
            FieldType::Datetime => "Enter a valid datetime (ISO 8601).",
            FieldType::Choice => "Select a valid choice.",
            FieldType::Multichoice => "Enter a list of choices.",
            FieldType::File => "Enter a valid file name.",
        }
    }

    pub fn has_choices(&self) -> bool {
        matches!(self, FieldType::Choice | FieldType::Multichoice)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        FieldType::ALL
            .iter()
            .copied()
            .find(|ft| ft.as_str() == lower)
            .ok_or_else(|| format!("unknown field type '{}'", s))
    }
}

/// Bit flags accepted in [`RegexDefinition::flags`].
pub mod regex_flags {
    pub const IGNORECASE: u32 = 2;
    pub const MULTILINE: u32 = 8;
    pub const DOTALL: u32 = 16;
    /// Accepted for compatibility; Unicode matching is the default.
    pub const UNICODE: u32 = 32;
    pub const VERBOSE: u32 = 64;
    pub const ASCII: u32 = 256;

    pub const SUPPORTED: u32 = IGNORECASE | MULTILINE | DOTALL | UNICODE | VERBOSE | ASCII;
}

/// Regex constraint as written by the designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexDefinition {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub flags: u32,
}

/// One entry of a choice domain as written by the designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceEntry {
    Value(String),
    Labeled {
        value: String,
        #[serde(default)]
        label: Option<String>,
    },
}

/// A choice domain: a list of entries or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceSpec {
    Csv(String),
    Items(Vec<ChoiceEntry>),
}

/// Canonical choice item, produced once when the field is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceItem {
    pub value: String,
    pub label: String,
}

/// Constraint toggles as written by the designer. An absent entry is off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexDefinition>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub email_format: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub url_format: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extensions: Option<Vec<String>>,
    #[serde(default, alias = "choice_domain", skip_serializing_if = "Option::is_none")]
    pub choices: Option<ChoiceSpec>,
}

/// A field as written by the designer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub help_text: String,
    #[serde(rename = "type", alias = "field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub constraints: ConstraintDefinition,
}

impl FieldDefinition {
    pub fn new(key: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            help_text: String::new(),
            field_type,
            required: false,
            order: 0,
            constraints: ConstraintDefinition::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.constraints.min_length = min;
        self.constraints.max_length = max;
        self
    }

    pub fn with_value_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.constraints.min_value = min;
        self.constraints.max_value = max;
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>, message: Option<&str>, flags: u32) -> Self {
        self.constraints.regex = Some(RegexDefinition {
            pattern: pattern.into(),
            message: message.map(str::to_string),
            flags,
        });
        self
    }

    pub fn with_email_format(mut self) -> Self {
        self.constraints.email_format = true;
        self
    }

    pub fn with_url_format(mut self) -> Self {
        self.constraints.url_format = true;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.file_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.choices = Some(ChoiceSpec::Items(
            choices.into_iter().map(|c| ChoiceEntry::Value(c.into())).collect(),
        ));
        self
    }

    /// Check the definition and build the immutable field.
    pub fn compile(&self) -> Result<SchemaField, ConfigurationError> {
        let key = self.key.as_str();
        let err = |problem| ConfigurationError::field(key, problem);

        if !is_slug(key) {
            return Err(err(FieldConfigProblem::InvalidKey));
        }
        if self.label.trim().is_empty() {
            return Err(err(FieldConfigProblem::EmptyLabel));
        }

        let c = &self.constraints;
        let shape = rules_for(self.field_type).shape;
        let not_applicable = |constraint: &'static str| {
            err(FieldConfigProblem::NotApplicable {
                constraint,
                field_type: self.field_type,
            })
        };

        if (c.min_length.is_some() || c.max_length.is_some()) && shape != ValueShape::Text {
            return Err(not_applicable("length bounds"));
        }
        if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
            if min > max {
                return Err(err(FieldConfigProblem::LengthBounds));
            }
        }

        if (c.min_value.is_some() || c.max_value.is_some()) && shape != ValueShape::Numeric {
            return Err(not_applicable("value bounds"));
        }
        if let (Some(min), Some(max)) = (c.min_value, c.max_value) {
            if min > max {
                return Err(err(FieldConfigProblem::ValueBounds));
            }
        }

        let regex = match &c.regex {
            Some(_) if shape != ValueShape::Text => return Err(not_applicable("regex")),
            Some(def) => Some(RegexRule::compile(def).map_err(err)?),
            None => None,
        };

        if c.email_format && shape != ValueShape::Text {
            return Err(not_applicable("email format"));
        }
        if c.url_format && shape != ValueShape::Text {
            return Err(not_applicable("url format"));
        }

        let file_extensions = match &c.file_extensions {
            Some(_) if self.field_type != FieldType::File => {
                return Err(not_applicable("file extensions"))
            }
            Some(raw) => Some(normalize_extensions(raw).map_err(err)?),
            None => None,
        };

        let choices = match (&c.choices, self.field_type.has_choices()) {
            (Some(_), false) => return Err(not_applicable("choices")),
            (Some(spec), true) => normalize_choices(spec).map_err(err)?,
            (None, true) => return Err(err(FieldConfigProblem::MissingChoices)),
            (None, false) => Vec::new(),
        };

        Ok(SchemaField {
            definition: self.clone(),
            constraints: Constraints {
                min_length: c.min_length,
                max_length: c.max_length,
                min_value: c.min_value.map(|d| d.normalize()),
                max_value: c.max_value.map(|d| d.normalize()),
                regex,
                email_format: c.email_format,
                url_format: c.url_format,
                file_extensions,
                choices,
            },
        })
    }
}

fn is_slug(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

fn normalize_extensions(raw: &[String]) -> Result<Vec<String>, FieldConfigProblem> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for ext in raw {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !out.contains(&ext) {
            out.push(ext);
        }
    }
    if out.is_empty() {
        return Err(FieldConfigProblem::EmptyExtensions);
    }
    Ok(out)
}

fn normalize_choices(spec: &ChoiceSpec) -> Result<Vec<ChoiceItem>, FieldConfigProblem> {
    let items: Vec<ChoiceItem> = match spec {
        ChoiceSpec::Csv(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| ChoiceItem {
                value: v.to_string(),
                label: v.to_string(),
            })
            .collect(),
        ChoiceSpec::Items(entries) => {
            let mut items = Vec::with_capacity(entries.len());
            for entry in entries {
                let (value, label) = match entry {
                    ChoiceEntry::Value(v) => (v.clone(), None),
                    ChoiceEntry::Labeled { value, label } => (value.clone(), label.clone()),
                };
                if value.trim().is_empty() {
                    return Err(FieldConfigProblem::EmptyChoice);
                }
                let label = label
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| value.clone());
                items.push(ChoiceItem { value, label });
            }
            items
        }
    };

    if items.is_empty() {
        return Err(FieldConfigProblem::MissingChoices);
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in &items {
        if !seen.insert(item.value.as_str()) {
            return Err(FieldConfigProblem::DuplicateChoice(item.value.clone()));
        }
    }
    Ok(items)
}

/// A compiled regex constraint.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    message: Option<String>,
}

impl RegexRule {
    fn compile(def: &RegexDefinition) -> Result<Self, FieldConfigProblem> {
        if def.pattern.is_empty() {
            return Err(FieldConfigProblem::EmptyPattern);
        }
        let unsupported = def.flags & !regex_flags::SUPPORTED;
        if unsupported != 0 {
            return Err(FieldConfigProblem::UnsupportedFlags(unsupported));
        }

        let regex = RegexBuilder::new(&def.pattern)
            .case_insensitive(def.flags & regex_flags::IGNORECASE != 0)
            .multi_line(def.flags & regex_flags::MULTILINE != 0)
            .dot_matches_new_line(def.flags & regex_flags::DOTALL != 0)
            .ignore_whitespace(def.flags & regex_flags::VERBOSE != 0)
            .unicode(def.flags & regex_flags::ASCII == 0)
            .build()
            .map_err(|e| FieldConfigProblem::InvalidPattern(e.to_string()))?;

        Ok(Self {
            regex,
            message: def.message.clone().filter(|m| !m.trim().is_empty()),
        })
    }

    /// Search semantics: the pattern may match anywhere in the value.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("Enter a valid value.")
    }
}

/// Compiled constraint set of a field.
#[derive(Debug, Clone)]
pub struct Constraints {
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) min_value: Option<Decimal>,
    pub(crate) max_value: Option<Decimal>,
    pub(crate) regex: Option<RegexRule>,
    pub(crate) email_format: bool,
    pub(crate) url_format: bool,
    pub(crate) file_extensions: Option<Vec<String>>,
    pub(crate) choices: Vec<ChoiceItem>,
}

impl Constraints {
    pub fn choices(&self) -> &[ChoiceItem] {
        &self.choices
    }

    pub fn file_extensions(&self) -> Option<&[String]> {
        self.file_extensions.as_deref()
    }

    pub fn has_choice(&self, value: &str) -> bool {
        self.choices.iter().any(|c| c.value == value)
    }
}

/// A compiled, immutable field.
#[derive(Debug, Clone)]
pub struct SchemaField {
    definition: FieldDefinition,
    constraints: Constraints,
}

impl SchemaField {
    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn label(&self) -> &str {
        &self.definition.label
    }

    pub fn help_text(&self) -> &str {
        &self.definition.help_text
    }

    pub fn field_type(&self) -> FieldType {
        self.definition.field_type
    }

    pub fn is_required(&self) -> bool {
        self.definition.required
    }

    pub fn order(&self) -> i64 {
        self.definition.order
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// The definition this field was compiled from.
    pub fn definition(&self) -> &FieldDefinition {
        &self.definition
    }

    /// Help text with the expected type appended.
    pub fn display_help_text(&self) -> String {
        let type_label = self.field_type().label();
        if self.help_text().is_empty() {
            format!("Expected type: {}", type_label)
        } else {
            format!("{} | {}", self.help_text(), type_label)
        }
    }
}
