//! Fixed-size pages over a schema's ordered fields.
//!
//! Pages are 1-indexed. Page `p` holds fields `[(p-1)*size, p*size)`; the
//! last page may be short.

use intake_schema::{
    parse_decimal, parse_iso_date, parse_iso_datetime, FieldType, FieldValue, FormSchema, ResultMap,
    SchemaField,
};
use intake_store::ResponseDocument;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Initial values for one page, keyed by field key.
pub type InitialValues = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("Page size must be at least 1")]
    ZeroPageSize,

    #[error("Page {page} is out of range (schema has {total_pages} pages)")]
    OutOfRange { page: usize, total_pages: usize },
}

/// Number of pages for `field_count` fields. No fields means no pages.
pub fn total_pages(field_count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    field_count.div_ceil(page_size)
}

/// One page of a schema.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub number: usize,
    pub total_pages: usize,
    pub fields: &'a [SchemaField],
}

impl<'a> Page<'a> {
    pub fn is_last(&self) -> bool {
        self.number == self.total_pages
    }

    /// The page after this one, if any.
    pub fn next_page(&self) -> Option<usize> {
        if self.is_last() {
            None
        } else {
            Some(self.number + 1)
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().map(SchemaField::key)
    }
}

/// Slice page `page` out of `schema`.
pub fn build_page_schema(schema: &FormSchema, page: usize, page_size: usize) -> Result<Page<'_>, PageError> {
    if page_size == 0 {
        return Err(PageError::ZeroPageSize);
    }
    let fields = schema.fields();
    let total = total_pages(fields.len(), page_size);
    if page == 0 || page > total {
        return Err(PageError::OutOfRange {
            page,
            total_pages: total,
        });
    }

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(fields.len());
    Ok(Page {
        number: page,
        total_pages: total,
        fields: &fields[start..end],
    })
}

/// Current document values for `page_fields`, typed for display.
///
/// Keys the document has no value for are left out.
pub fn initial_values_for_page(document: &ResponseDocument, page_fields: &[SchemaField]) -> InitialValues {
    initial_values(&document.result, page_fields)
}

/// [`initial_values_for_page`] over a bare result map.
pub fn initial_values(result: &ResultMap, page_fields: &[SchemaField]) -> InitialValues {
    page_fields
        .iter()
        .filter_map(|field| {
            let stored = result.get(field.key())?;
            Some((field.key().to_string(), typed_initial(field.field_type(), stored)))
        })
        .collect()
}

// Values that no longer parse under the field's type come back as stored.
fn typed_initial(field_type: FieldType, stored: &Value) -> FieldValue {
    let parsed = match (field_type, stored) {
        (FieldType::Date, Value::String(s)) => parse_iso_date(s).map(FieldValue::Date),
        (FieldType::Datetime, Value::String(s)) => parse_iso_datetime(s).map(FieldValue::DateTime),
        (FieldType::Decimal, Value::String(s)) => parse_decimal(s).map(FieldValue::Decimal),
        _ => None,
    };
    parsed.unwrap_or_else(|| FieldValue::from_json(stored))
}
