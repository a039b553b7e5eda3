//! Constraint validators applied after type coercion.
//!
//! The order is fixed: length bounds, value bounds, regex, email format,
//! URL format, file extensions. The first failure is returned.

use crate::coerce::{FormatCheck, ValueShape};
use crate::error::FieldError;
use crate::field::{Constraints, FieldType, SchemaField};
use crate::value::FieldValue;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv6Addr};
use url::{Host, Url};

const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];
const MAX_URL_LEN: usize = 2048;
const MAX_EMAIL_LEN: usize = 320;

static EMAIL_USER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^[-!#$%&'*+/=?^_`{}|~0-9A-Z]+(?:\.[-!#$%&'*+/=?^_`{}|~0-9A-Z]+)*$|^"(?:[\x01-\x08\x0b\x0c\x0e-\x1f!#-\[\]-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*"$"#,
    )
    .expect("valid email user regex")
});

static EMAIL_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z0-9-]{1,62}[A-Z0-9]$")
        .expect("valid email domain regex")
});

static TLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z\x{00a1}-\x{ffff}]{2,63}|xn--[a-z0-9]{1,59})$").expect("valid tld regex")
});

/// Run every toggled validator, plus the type's default format check,
/// against an already coerced value.
pub(crate) fn run(
    field: &SchemaField,
    shape: ValueShape,
    default_format: Option<FormatCheck>,
    typed: &FieldValue,
) -> Result<(), FieldError> {
    let c = field.constraints();
    match shape {
        ValueShape::Numeric => {
            if let Some(n) = numeric_of(typed) {
                check_value_bounds(c, n)?;
            }
            Ok(())
        }
        ValueShape::Text => {
            for s in text_subjects(field.field_type(), typed) {
                check_text(c, default_format, s)?;
            }
            Ok(())
        }
        ValueShape::Other => Ok(()),
    }
}

fn numeric_of(typed: &FieldValue) -> Option<Decimal> {
    match typed {
        FieldValue::Integer(i) => Some(Decimal::from(*i)),
        FieldValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// The strings the text validators look at: the value itself, each selected
/// choice, or the resolved file name.
fn text_subjects(field_type: FieldType, typed: &FieldValue) -> Vec<&str> {
    match (field_type, typed) {
        (FieldType::File, value) => resolve_file_name(value).into_iter().collect(),
        (_, FieldValue::Text(s)) => vec![s.as_str()],
        (_, FieldValue::List(items)) => items.iter().filter_map(FieldValue::as_str).collect(),
        _ => Vec::new(),
    }
}

/// File name carried by a file value: the trimmed string, or the first
/// non-empty `name`, `filename` or `path` entry of an object.
pub fn resolve_file_name(value: &FieldValue) -> Option<&str> {
    match value {
        FieldValue::Text(s) => Some(s.trim()).filter(|s| !s.is_empty()),
        FieldValue::Object(map) => ["name", "filename", "path"].iter().find_map(|k| {
            map.get(*k)
                .and_then(FieldValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        }),
        _ => None,
    }
}

fn check_text(c: &Constraints, default_format: Option<FormatCheck>, s: &str) -> Result<(), FieldError> {
    let actual = s.chars().count();
    if let Some(limit) = c.min_length {
        if actual < limit {
            return Err(FieldError::TooShort { limit, actual });
        }
    }
    if let Some(limit) = c.max_length {
        if actual > limit {
            return Err(FieldError::TooLong { limit, actual });
        }
    }
    if let Some(rule) = &c.regex {
        if !rule.is_match(s) {
            return Err(FieldError::PatternMismatch {
                message: rule.message().to_string(),
            });
        }
    }
    if (c.email_format || default_format == Some(FormatCheck::Email)) && !is_valid_email(s) {
        return Err(FieldError::InvalidEmail);
    }
    if (c.url_format || default_format == Some(FormatCheck::Url)) && !is_valid_url(s) {
        return Err(FieldError::InvalidUrl);
    }
    if let Some(allowed) = &c.file_extensions {
        let extension = file_extension(s);
        if !allowed.iter().any(|a| *a == extension) {
            return Err(FieldError::ExtensionNotAllowed {
                extension,
                allowed: allowed.join(", "),
            });
        }
    }
    Ok(())
}

fn check_value_bounds(c: &Constraints, n: Decimal) -> Result<(), FieldError> {
    if let Some(limit) = c.min_value {
        if n < limit {
            return Err(FieldError::BelowMinimum { limit });
        }
    }
    if let Some(limit) = c.max_value {
        if n > limit {
            return Err(FieldError::AboveMaximum { limit });
        }
    }
    Ok(())
}

/// Lower-cased suffix of the last path component, without the dot.
fn file_extension(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

pub fn is_valid_email(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_EMAIL_LEN {
        return false;
    }
    let Some((user, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if !EMAIL_USER_RE.is_match(user) {
        return false;
    }
    if domain.eq_ignore_ascii_case("localhost") || EMAIL_DOMAIN_RE.is_match(domain) {
        return true;
    }
    match domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        Some(literal) => match literal.strip_prefix("IPv6:") {
            Some(v6) => v6.parse::<Ipv6Addr>().is_ok(),
            None => literal.parse::<IpAddr>().is_ok(),
        },
        None => false,
    }
}

pub fn is_valid_url(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_URL_LEN || value.chars().any(char::is_whitespace) {
        return false;
    }
    let Ok(url) = Url::parse(value) else {
        return false;
    };
    if !URL_SCHEMES.contains(&url.scheme()) {
        return false;
    }
    match url.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain == "localhost" {
                return true;
            }
            match domain.rsplit_once('.') {
                Some((rest, tld)) => !rest.is_empty() && TLD_RE.is_match(tld),
                None => false,
            }
        }
        None => false,
    }
}
