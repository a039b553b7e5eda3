//! Type coercion for submitted values.
//!
//! Every [`FieldType`] has one row in a static table: how to coerce a raw
//! value, which format check it always runs, and which constraint family
//! applies to it. [`ValueCoercer`] drives the row for one field.

use crate::error::FieldError;
use crate::field::{FieldType, SchemaField};
use crate::temporal::{parse_iso_date, parse_iso_datetime};
use crate::validators;
use crate::value::FieldValue;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

type CoerceFn = fn(&SchemaField, &FieldValue) -> Result<FieldValue, FieldError>;

/// Which constraint family a field type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueShape {
    /// Length, regex, email, URL (and extensions for files).
    Text,
    /// Value bounds.
    Numeric,
    Other,
}

/// Format check a type always runs, toggled or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FormatCheck {
    Email,
    Url,
}

pub(crate) struct TypeRules {
    pub(crate) coerce: CoerceFn,
    pub(crate) default_format: Option<FormatCheck>,
    pub(crate) shape: ValueShape,
}

static TEXT: TypeRules = TypeRules {
    coerce: coerce_string,
    default_format: None,
    shape: ValueShape::Text,
};
static EMAIL: TypeRules = TypeRules {
    coerce: coerce_string,
    default_format: Some(FormatCheck::Email),
    shape: ValueShape::Text,
};
static URL: TypeRules = TypeRules {
    coerce: coerce_string,
    default_format: Some(FormatCheck::Url),
    shape: ValueShape::Text,
};
static INTEGER: TypeRules = TypeRules {
    coerce: coerce_integer,
    default_format: None,
    shape: ValueShape::Numeric,
};
static DECIMAL: TypeRules = TypeRules {
    coerce: coerce_decimal,
    default_format: None,
    shape: ValueShape::Numeric,
};
static BOOLEAN: TypeRules = TypeRules {
    coerce: coerce_boolean,
    default_format: None,
    shape: ValueShape::Other,
};
static DATE: TypeRules = TypeRules {
    coerce: coerce_date,
    default_format: None,
    shape: ValueShape::Other,
};
static DATETIME: TypeRules = TypeRules {
    coerce: coerce_datetime,
    default_format: None,
    shape: ValueShape::Other,
};
static CHOICE: TypeRules = TypeRules {
    coerce: coerce_choice,
    default_format: None,
    shape: ValueShape::Text,
};
static MULTICHOICE: TypeRules = TypeRules {
    coerce: coerce_multichoice,
    default_format: None,
    shape: ValueShape::Text,
};
static FILE: TypeRules = TypeRules {
    coerce: coerce_file,
    default_format: None,
    shape: ValueShape::Text,
};

pub(crate) fn rules_for(field_type: FieldType) -> &'static TypeRules {
    match field_type {
        FieldType::Text => &TEXT,
        FieldType::Email => &EMAIL,
        FieldType::Url => &URL,
        FieldType::Integer => &INTEGER,
        FieldType::Decimal => &DECIMAL,
        FieldType::Boolean => &BOOLEAN,
        FieldType::Date => &DATE,
        FieldType::Datetime => &DATETIME,
        FieldType::Choice => &CHOICE,
        FieldType::Multichoice => &MULTICHOICE,
        FieldType::File => &FILE,
    }
}

/// Coerces and validates raw values for one field.
#[derive(Debug, Clone, Copy)]
pub struct ValueCoercer<'a> {
    field: &'a SchemaField,
}

impl<'a> ValueCoercer<'a> {
    pub fn new(field: &'a SchemaField) -> Self {
        Self { field }
    }

    /// Blank check, then coercion, then constraints.
    ///
    /// `Ok(None)` means an accepted blank on an optional field. A success
    /// carries the typed value, whose JSON form is what gets stored.
    pub fn coerce(&self, raw: &FieldValue) -> Result<Option<FieldValue>, FieldError> {
        if raw.is_blank() {
            return if self.field.is_required() {
                Err(FieldError::Required)
            } else {
                Ok(None)
            };
        }

        let rules = rules_for(self.field.field_type());
        let typed = (rules.coerce)(self.field, raw)?;
        validators::run(self.field, rules.shape, rules.default_format, &typed)?;
        Ok(Some(typed))
    }
}

fn invalid(field: &SchemaField) -> FieldError {
    FieldError::InvalidType(field.field_type())
}

fn coerce_string(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    match raw {
        FieldValue::Text(_) => Ok(raw.clone()),
        _ => Err(invalid(field)),
    }
}

fn coerce_integer(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    let n = match raw {
        FieldValue::Integer(i) => Some(*i),
        FieldValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        FieldValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            // i64::MAX is not representable as f64; exclude the rounded bound.
            if *f >= -9_223_372_036_854_775_808.0 && *f < 9_223_372_036_854_775_808.0 {
                Some(*f as i64)
            } else {
                None
            }
        }
        FieldValue::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    n.map(FieldValue::Integer).ok_or_else(|| invalid(field))
}

fn coerce_decimal(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    let d = match raw {
        FieldValue::Integer(i) => Some(Decimal::from(*i)),
        FieldValue::Decimal(d) => Some(*d),
        FieldValue::Float(f) if f.is_finite() => parse_decimal(&f.to_string()),
        FieldValue::Text(s) => parse_decimal(s.trim()),
        _ => None,
    };
    d.map(FieldValue::Decimal).ok_or_else(|| invalid(field))
}

/// Plain (`12.50`) or scientific (`1.2e3`) notation.
///
/// Input that does not fit a [`Decimal`] exactly is rejected, never rounded.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() || s.contains('_') {
        return None;
    }
    match s.find(['e', 'E']) {
        None => Decimal::from_str_exact(s).ok(),
        Some(at) => parse_scientific_exact(&s[..at], &s[at + 1..]),
    }
}

const MAX_DECIMAL_SCALE: i64 = 28;

fn parse_scientific_exact(mantissa: &str, exponent: &str) -> Option<Decimal> {
    let mantissa = Decimal::from_str_exact(mantissa).ok()?.normalize();
    let exponent: i64 = exponent.parse().ok()?;
    let scale = i64::from(mantissa.scale()).checked_sub(exponent)?;
    if scale > MAX_DECIMAL_SCALE {
        return None;
    }
    let mut value = mantissa;
    if scale >= 0 {
        value.set_scale(u32::try_from(scale).ok()?).ok()?;
        return Some(value);
    }
    // Positive net exponent: scale to zero, then multiply out.
    value.set_scale(0).ok()?;
    let mut factor = Decimal::ONE;
    for _ in 0..(-scale) {
        factor = factor.checked_mul(Decimal::TEN)?;
    }
    value.checked_mul(factor)
}

const TRUE_TOKENS: [&str; 5] = ["true", "1", "yes", "y", "on"];
const FALSE_TOKENS: [&str; 5] = ["false", "0", "no", "n", "off"];

pub(crate) fn parse_bool_token(s: &str) -> Option<bool> {
    let token = s.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn coerce_boolean(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    let b = match raw {
        FieldValue::Bool(b) => Some(*b),
        FieldValue::Text(s) => parse_bool_token(s),
        _ => None,
    };
    b.map(FieldValue::Bool).ok_or_else(|| invalid(field))
}

fn coerce_date(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    match raw {
        FieldValue::Date(_) => Ok(raw.clone()),
        FieldValue::Text(s) => parse_iso_date(s)
            .map(FieldValue::Date)
            .ok_or_else(|| invalid(field)),
        _ => Err(invalid(field)),
    }
}

fn coerce_datetime(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    match raw {
        FieldValue::DateTime(_) => Ok(raw.clone()),
        FieldValue::Text(s) => parse_iso_datetime(s)
            .map(FieldValue::DateTime)
            .ok_or_else(|| invalid(field)),
        _ => Err(invalid(field)),
    }
}

fn coerce_choice(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    match raw {
        FieldValue::Text(s) if field.constraints().has_choice(s) => Ok(raw.clone()),
        _ => Err(FieldError::InvalidChoice),
    }
}

fn coerce_multichoice(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    let FieldValue::List(items) = raw else {
        return Err(FieldError::NotAList);
    };
    let constraints = field.constraints();
    let invalid: Vec<String> = items
        .iter()
        .filter(|item| !matches!(item, FieldValue::Text(s) if constraints.has_choice(s)))
        .map(ToString::to_string)
        .collect();
    if !invalid.is_empty() {
        return Err(FieldError::InvalidChoices { invalid });
    }
    Ok(raw.clone())
}

/// A file is a name string or an object. Objects without a name are kept as
/// metadata and skip the name validators.
fn coerce_file(field: &SchemaField, raw: &FieldValue) -> Result<FieldValue, FieldError> {
    match raw {
        FieldValue::Text(_) | FieldValue::Object(_) => Ok(raw.clone()),
        _ => Err(invalid(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{regex_flags, FieldDefinition};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::str::FromStr;

    fn field(def: FieldDefinition) -> SchemaField {
        def.compile().unwrap()
    }

    fn coerce(field: &SchemaField, raw: serde_json::Value) -> Result<Option<FieldValue>, FieldError> {
        ValueCoercer::new(field).coerce(&FieldValue::from_json(&raw))
    }

    #[test]
    fn test_blank_handling() {
        let optional = field(FieldDefinition::new("note", "Note", FieldType::Text));
        let required = field(FieldDefinition::new("note", "Note", FieldType::Text).required());

        for blank in [json!(null), json!(""), json!([]), json!({})] {
            assert_eq!(coerce(&optional, blank.clone()), Ok(None));
            assert_eq!(coerce(&required, blank), Err(FieldError::Required));
        }
    }

    #[test]
    fn test_text_requires_string() {
        let f = field(FieldDefinition::new("note", "Note", FieldType::Text));
        assert_eq!(coerce(&f, json!(5)), Err(FieldError::InvalidType(FieldType::Text)));
        assert_eq!(coerce(&f, json!(" hi ")), Ok(Some(FieldValue::from(" hi "))));
    }

    #[test]
    fn test_integer_coercion() {
        let f = field(FieldDefinition::new("age", "Age", FieldType::Integer));
        assert_eq!(coerce(&f, json!(" 42 ")), Ok(Some(FieldValue::Integer(42))));
        assert_eq!(coerce(&f, json!("-7")), Ok(Some(FieldValue::Integer(-7))));
        assert_eq!(coerce(&f, json!(3.0)), Ok(Some(FieldValue::Integer(3))));
        assert_eq!(coerce(&f, json!(3.5)), Err(FieldError::InvalidType(FieldType::Integer)));
        assert_eq!(coerce(&f, json!(true)), Err(FieldError::InvalidType(FieldType::Integer)));
        assert_eq!(coerce(&f, json!("4.0")), Err(FieldError::InvalidType(FieldType::Integer)));
        assert_eq!(coerce(&f, json!(u64::MAX)), Err(FieldError::InvalidType(FieldType::Integer)));
    }

    #[test]
    fn test_decimal_coercion() {
        let f = field(FieldDefinition::new("weight", "Weight", FieldType::Decimal));
        assert_eq!(
            coerce(&f, json!("12.50")),
            Ok(Some(FieldValue::Decimal(Decimal::from_str("12.50").unwrap())))
        );
        assert_eq!(
            coerce(&f, json!(0.1)),
            Ok(Some(FieldValue::Decimal(Decimal::from_str("0.1").unwrap())))
        );
        assert_eq!(
            coerce(&f, json!("1.5e2")),
            Ok(Some(FieldValue::Decimal(Decimal::from(150))))
        );
        assert_eq!(coerce(&f, json!("NaN")), Err(FieldError::InvalidType(FieldType::Decimal)));
        assert_eq!(coerce(&f, json!(false)), Err(FieldError::InvalidType(FieldType::Decimal)));
    }

    #[test]
    fn test_decimal_rejects_instead_of_rounding() {
        let f = field(FieldDefinition::new("weight", "Weight", FieldType::Decimal));
        let invalid = Err(FieldError::InvalidType(FieldType::Decimal));
        assert_eq!(coerce(&f, json!("0.00000000000000000000000000000001")), invalid);
        assert_eq!(coerce(&f, json!("0.12345678901234567890123456789")), invalid);
        assert_eq!(coerce(&f, json!("12345678901234567890123456789012")), invalid);
        assert_eq!(coerce(&f, json!(1e-30)), invalid);
        assert_eq!(coerce(&f, json!(1e300)), invalid);
        assert_eq!(coerce(&f, json!("1e-30")), invalid);
        assert_eq!(coerce(&f, json!("1e40")), invalid);

        assert_eq!(parse_decimal("2.5e-3"), Decimal::from_str("0.0025").ok());
        assert_eq!(parse_decimal("2.50E2"), Some(Decimal::from(250)));
        assert_eq!(parse_decimal("1e-28"), Decimal::from_str("0.0000000000000000000000000001").ok());
        assert_eq!(parse_decimal("-7e0"), Some(Decimal::from(-7)));
        assert_eq!(parse_decimal("1e"), None);
    }

    #[test]
    fn test_value_bounds() {
        let f = field(
            FieldDefinition::new("age", "Age", FieldType::Integer)
                .with_value_range(Some(Decimal::from(18)), Some(Decimal::from(120))),
        );
        assert_eq!(
            coerce(&f, json!(17)),
            Err(FieldError::BelowMinimum { limit: Decimal::from(18) })
        );
        assert_eq!(
            coerce(&f, json!("121")),
            Err(FieldError::AboveMaximum { limit: Decimal::from(120) })
        );
        assert!(coerce(&f, json!(18)).is_ok());
    }

    #[test]
    fn test_boolean_tokens() {
        let f = field(FieldDefinition::new("smoker", "Smoker", FieldType::Boolean));
        assert_eq!(coerce(&f, json!(" YES ")), Ok(Some(FieldValue::Bool(true))));
        assert_eq!(coerce(&f, json!("off")), Ok(Some(FieldValue::Bool(false))));
        assert_eq!(coerce(&f, json!(false)), Ok(Some(FieldValue::Bool(false))));
        assert_eq!(coerce(&f, json!(1)), Err(FieldError::InvalidType(FieldType::Boolean)));
        assert_eq!(coerce(&f, json!("maybe")), Err(FieldError::InvalidType(FieldType::Boolean)));
    }

    #[test]
    fn test_date_granularity() {
        let f = field(FieldDefinition::new("dob", "DOB", FieldType::Date));
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(coerce(&f, json!("2024-01-01")), Ok(Some(FieldValue::Date(d))));
        assert_eq!(ValueCoercer::new(&f).coerce(&FieldValue::Date(d)), Ok(Some(FieldValue::Date(d))));
        let dt = d.and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(
            ValueCoercer::new(&f).coerce(&FieldValue::from(dt)),
            Err(FieldError::InvalidType(FieldType::Date))
        );
        assert_eq!(coerce(&f, json!("01/01/2024")), Err(FieldError::InvalidType(FieldType::Date)));

        let g = field(FieldDefinition::new("seen", "Seen", FieldType::Datetime));
        assert_eq!(
            ValueCoercer::new(&g).coerce(&FieldValue::Date(d)),
            Err(FieldError::InvalidType(FieldType::Datetime))
        );
        assert!(coerce(&g, json!("2024-01-01T10:00:00+01:00")).is_ok());
    }

    #[test]
    fn test_choice_membership() {
        let f = field(FieldDefinition::new("sex", "Sex", FieldType::Choice).with_choices(["male", "female"]));
        assert_eq!(coerce(&f, json!("other")), Err(FieldError::InvalidChoice));
        assert_eq!(coerce(&f, json!("male")), Ok(Some(FieldValue::from("male"))));

        let m = field(
            FieldDefinition::new("symptoms", "Symptoms", FieldType::Multichoice).with_choices(["fever", "cough"]),
        );
        assert_eq!(coerce(&m, json!("fever")), Err(FieldError::NotAList));
        assert_eq!(
            coerce(&m, json!(["fever", "rash", 3])),
            Err(FieldError::InvalidChoices {
                invalid: vec!["rash".to_string(), "3".to_string()]
            })
        );
        assert!(coerce(&m, json!(["cough"])).is_ok());
    }

    #[test]
    fn test_multichoice_runs_string_validators_per_element() {
        let m = field(
            FieldDefinition::new("codes", "Codes", FieldType::Multichoice)
                .with_choices(["ab", "abcdef"])
                .with_length(None, Some(3)),
        );
        assert_eq!(
            coerce(&m, json!(["ab", "abcdef"])),
            Err(FieldError::TooLong { limit: 3, actual: 6 })
        );
    }

    #[test]
    fn test_email_and_url_types_check_format() {
        let e = field(FieldDefinition::new("contact", "Contact", FieldType::Email));
        assert_eq!(coerce(&e, json!("not-an-email")), Err(FieldError::InvalidEmail));
        assert_eq!(coerce(&e, json!(12)), Err(FieldError::InvalidType(FieldType::Email)));
        assert!(coerce(&e, json!("nurse@clinic.org")).is_ok());

        let u = field(FieldDefinition::new("site", "Site", FieldType::Url));
        assert_eq!(coerce(&u, json!("javascript:alert(1)")), Err(FieldError::InvalidUrl));
    }

    #[test]
    fn test_regex_search_semantics() {
        let f = field(
            FieldDefinition::new("mrn", "MRN", FieldType::Text).with_regex(r"\d{3}", Some("Need digits."), 0),
        );
        assert!(coerce(&f, json!("MRN-123-X")).is_ok());
        assert_eq!(
            coerce(&f, json!("MRN")),
            Err(FieldError::PatternMismatch {
                message: "Need digits.".to_string()
            })
        );

        let g = field(FieldDefinition::new("code", "Code", FieldType::Text).with_regex(
            "^a.b$",
            None,
            regex_flags::DOTALL,
        ));
        assert!(coerce(&g, json!("a\nb")).is_ok());
    }

    #[test]
    fn test_length_counts_characters() {
        let f = field(FieldDefinition::new("name", "Name", FieldType::Text).with_length(Some(3), None));
        assert_eq!(
            coerce(&f, json!("é")),
            Err(FieldError::TooShort { limit: 3, actual: 1 })
        );
        assert!(coerce(&f, json!("héé")).is_ok());
    }

    #[test]
    fn test_file_values() {
        let f = field(FieldDefinition::new("scan", "Scan", FieldType::File).with_extensions(["pdf"]));
        assert!(coerce(&f, json!("scan.PDF")).is_ok());
        assert_eq!(
            coerce(&f, json!({"name": "scan.exe"})),
            Err(FieldError::ExtensionNotAllowed {
                extension: "exe".to_string(),
                allowed: "pdf".to_string()
            })
        );
        assert_eq!(
            coerce(&f, json!({"size": 10})),
            Ok(Some(FieldValue::from_json(&json!({"size": 10}))))
        );
        assert_eq!(coerce(&f, json!(10)), Err(FieldError::InvalidType(FieldType::File)));
        assert_eq!(
            FieldError::ExtensionNotAllowed {
                extension: "exe".to_string(),
                allowed: "pdf, png".to_string()
            }
            .to_string(),
            "File extension “exe” is not allowed. Allowed extensions are: pdf, png."
        );
    }
}
