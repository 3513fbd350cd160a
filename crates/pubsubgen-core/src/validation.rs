use std::collections::BTreeSet;

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};

use crate::error::{Error, Result};
use crate::schema::{DomainSpec, FieldSpec, Schema};

/// Validate internal consistency of a field schema.
///
/// This checks:
/// - the schema has at least one field
/// - field names are non-empty and unique
/// - every value domain can produce a value
pub fn validate_schema(schema: &Schema) -> Result<()> {
    if schema.is_empty() {
        return Err(Error::InvalidSchema(
            "schema must declare at least one field".to_string(),
        ));
    }

    let mut names = BTreeSet::new();
    for field in &schema.fields {
        if field.name.trim().is_empty() {
            return Err(Error::InvalidSchema("field name is empty".to_string()));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate field name: {}",
                field.name
            )));
        }
        validate_domain(field)?;
    }

    Ok(())
}

fn validate_domain(field: &FieldSpec) -> Result<()> {
    match &field.domain {
        DomainSpec::IntRange { min, max } => {
            if min > max {
                return Err(Error::InvalidSchema(format!(
                    "{}: int_range min must be <= max",
                    field.name
                )));
            }
        }
        DomainSpec::FloatRange { min, max, .. } => {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(Error::InvalidSchema(format!(
                    "{}: float_range bounds must be finite with min <= max",
                    field.name
                )));
            }
        }
        DomainSpec::OneOf { values } => {
            if values.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "{}: one_of requires at least one value",
                    field.name
                )));
            }
        }
        DomainSpec::DateRange { min, max, format } => {
            let min = parse_bound(&field.name, min)?;
            let max = parse_bound(&field.name, max)?;
            if min > max {
                return Err(Error::InvalidSchema(format!(
                    "{}: date_range min must be <= max",
                    field.name
                )));
            }
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(Error::InvalidSchema(format!(
                    "{}: invalid date format '{format}'",
                    field.name
                )));
            }
        }
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` bound of a `date_range` domain.
pub fn parse_date_bound(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_bound(field: &str, value: &str) -> Result<NaiveDate> {
    parse_date_bound(value).ok_or_else(|| {
        Error::InvalidSchema(format!(
            "{field}: date bound '{value}' is not a YYYY-MM-DD date"
        ))
    })
}
