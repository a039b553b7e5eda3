//! Form schemas and submission validation.
//!
//! A [`FormSchema`] is a named, ordered list of typed fields. A submission is
//! a map of raw values; [`validate`] coerces each value to its field's type,
//! checks the field's constraints and merges the result into the answers a
//! subject already gave.
//!
//! ```
//! use intake_schema::{FieldDefinition, FieldType, FormSchema, ResultMap, SubmittedMap};
//! use intake_ids::SchemaId;
//!
//! let age = FieldDefinition::new("age", "Age", FieldType::Integer)
//!     .required()
//!     .compile()
//!     .unwrap();
//! let schema = FormSchema::new(SchemaId::new(), "Screening", vec![age]).unwrap();
//!
//! let mut submitted = SubmittedMap::new();
//! submitted.insert("age".to_string(), "42".into());
//! let merged = schema.validate(&submitted, &ResultMap::new()).unwrap();
//! assert_eq!(merged["age"], serde_json::json!(42));
//! ```

pub mod coerce;
pub mod error;
pub mod field;
pub mod schema;
pub mod temporal;
pub mod validation;
pub mod validators;
pub mod value;

pub use coerce::{parse_decimal, ValueCoercer};
pub use error::{ConfigurationError, FieldConfigProblem, FieldError, FieldErrors};
pub use field::{
    regex_flags, ChoiceEntry, ChoiceItem, ChoiceSpec, ConstraintDefinition, Constraints, FieldDefinition, FieldType,
    RegexDefinition, RegexRule, SchemaField,
};
pub use schema::{slugify, FormSchema, SchemaDefinition, SchemaLoadError};
pub use temporal::{parse_iso_date, parse_iso_datetime};
pub use validation::{submitted_from_json, validate, ResultMap, SubmittedMap, ValidationEngine};
pub use value::{json_is_blank, DateTimeValue, FieldValue};
