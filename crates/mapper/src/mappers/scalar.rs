//! Scalar field strategies.
//!
//! Raw formats follow the store conventions: checkboxes are `"1"` or empty,
//! dates are compact ISO (`20240131T093000Z`), guids are braced upper-case.
//! A missing or blank raw value reads as `Null` and `Null` writes back as an
//! empty string, so a construct/save/construct cycle is stable.

use chrono::{NaiveDateTime, TimeZone, Utc};

use common::{MapperError, MapperResult};
use domain::{ItemId, CHECKBOX_FALSE, CHECKBOX_TRUE, DATE_TIME_FORMAT};

use super::{DataMapper, ReadContext, WriteContext};
use crate::config::{PropertyConfiguration, PropertyDeclaration, PropertyKind, ValueType};
use crate::object::Value;

/// Accepted when the trailing zone designator is missing
const DATE_TIME_FORMAT_LOCAL: &str = "%Y%m%dT%H%M%S";

/// Maps one raw field to one built-in scalar type.
#[derive(Debug, Clone)]
pub struct ScalarFieldMapper {
    value_type: ValueType,
    name: &'static str,
}

impl ScalarFieldMapper {
    /// `None` for custom value types, which need a registered strategy
    pub fn new(value_type: ValueType) -> Option<Self> {
        let name = match value_type {
            ValueType::Text => "text_field",
            ValueType::Integer => "integer_field",
            ValueType::Float => "float_field",
            ValueType::Boolean => "boolean_field",
            ValueType::DateTime => "date_time_field",
            ValueType::Guid => "guid_field",
            ValueType::Custom(_) => return None,
        };
        Some(Self { value_type, name })
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }
}

impl DataMapper for ScalarFieldMapper {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(&property.kind, PropertyKind::Field { value_type, .. } if *value_type == self.value_type)
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let field = field_of(property)?;
        let raw = ctx.field(field)?;
        parse_scalar(&self.value_type, raw.as_deref()).map_err(|e| {
            MapperError::mapping(format!("{}.{}: {}", ctx.type_key(), property.name(), e))
        })
    }

    fn write(
        &self,
        ctx: &WriteContext<'_>,
        property: &PropertyConfiguration,
        value: &Value,
    ) -> MapperResult<()> {
        let field = field_of(property)?;
        let raw = format_scalar(&self.value_type, value).map_err(|e| {
            MapperError::mapping(format!("{}.{}: {}", ctx.type_key(), property.name(), e))
        })?;
        ctx.write_field(field, &raw)
    }
}

fn field_of(property: &PropertyConfiguration) -> MapperResult<&str> {
    property
        .source_field()
        .ok_or_else(|| MapperError::mapping(format!("{} is not bound to a field", property.name())))
}

/// Convert a raw field value to a typed value
pub fn parse_scalar(value_type: &ValueType, raw: Option<&str>) -> MapperResult<Value> {
    let raw = raw.unwrap_or_default();
    if let ValueType::Text = value_type {
        // Text is kept byte-exact so an unchanged value saves back unchanged
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(Value::Text(raw.to_string()));
    }
    let raw = raw.trim();

    if *value_type == ValueType::Boolean {
        return Ok(Value::Boolean(raw == CHECKBOX_TRUE));
    }
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    match value_type {
        ValueType::Text => Ok(Value::Text(raw.to_string())),
        ValueType::Integer => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| MapperError::mapping(format!("'{}' is not an integer", raw))),
        ValueType::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| MapperError::mapping(format!("'{}' is not a number", raw))),
        ValueType::DateTime => NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_LOCAL))
            .map(|naive| Value::DateTime(Utc.from_utc_datetime(&naive)))
            .map_err(|_| MapperError::mapping(format!("'{}' is not a date", raw))),
        ValueType::Guid => ItemId::parse(raw)
            .map(Value::Guid)
            .map_err(|_| MapperError::mapping(format!("'{}' is not a guid", raw))),
        ValueType::Boolean => Ok(Value::Boolean(raw == CHECKBOX_TRUE)),
        ValueType::Custom(name) => Err(MapperError::mapping(format!(
            "no built-in format for '{}'",
            name
        ))),
    }
}

/// Convert a typed value to its raw field representation
pub fn format_scalar(value_type: &ValueType, value: &Value) -> MapperResult<String> {
    let raw = match (value_type, value) {
        (_, Value::Null) => String::new(),
        (ValueType::Text, Value::Text(s)) => s.clone(),
        (ValueType::Integer, Value::Integer(i)) => i.to_string(),
        (ValueType::Float, Value::Float(f)) => f.to_string(),
        (ValueType::Float, Value::Integer(i)) => i.to_string(),
        (ValueType::Boolean, Value::Boolean(b)) => {
            let raw = if *b { CHECKBOX_TRUE } else { CHECKBOX_FALSE };
            raw.to_string()
        }
        (ValueType::DateTime, Value::DateTime(d)) => d.format(DATE_TIME_FORMAT).to_string(),
        (ValueType::Guid, Value::Guid(id)) => id.to_string(),
        (expected, actual) => {
            return Err(MapperError::mapping(format!(
                "expected {:?}, got {}",
                expected,
                actual.type_name()
            )))
        }
    };
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_custom_value_types_have_no_scalar_mapper() {
        assert!(ScalarFieldMapper::new(ValueType::Custom("rich_text".into())).is_none());
        assert_eq!(
            ScalarFieldMapper::new(ValueType::Integer).unwrap().name(),
            "integer_field"
        );
    }

    #[test]
    fn test_blank_reads_as_null() {
        for value_type in [ValueType::Integer, ValueType::DateTime, ValueType::Guid] {
            assert_eq!(parse_scalar(&value_type, None).unwrap(), Value::Null);
            assert_eq!(parse_scalar(&value_type, Some("  ")).unwrap(), Value::Null);
        }
        assert_eq!(parse_scalar(&ValueType::Text, None).unwrap(), Value::Null);
        assert_eq!(parse_scalar(&ValueType::Text, Some("")).unwrap(), Value::Null);
    }

    #[test]
    fn test_text_keeps_surrounding_whitespace() {
        assert_eq!(
            parse_scalar(&ValueType::Text, Some("  Hello  ")).unwrap(),
            Value::Text("  Hello  ".into())
        );
        assert_eq!(
            parse_scalar(&ValueType::Text, Some("   ")).unwrap(),
            Value::Text("   ".into())
        );
        let raw = format_scalar(&ValueType::Text, &Value::Text("  Hello  ".into())).unwrap();
        assert_eq!(raw, "  Hello  ");
        assert_eq!(parse_scalar(&ValueType::Integer, Some(" 42 ")).unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_checkbox_format() {
        assert_eq!(
            parse_scalar(&ValueType::Boolean, Some("1")).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            parse_scalar(&ValueType::Boolean, None).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            format_scalar(&ValueType::Boolean, &Value::Boolean(true)).unwrap(),
            "1"
        );
        assert_eq!(
            format_scalar(&ValueType::Boolean, &Value::Boolean(false)).unwrap(),
            ""
        );
    }

    #[test]
    fn test_date_accepts_both_forms() {
        let zoned = parse_scalar(&ValueType::DateTime, Some("20240131T093000Z")).unwrap();
        let local = parse_scalar(&ValueType::DateTime, Some("20240131T093000")).unwrap();
        assert_eq!(zoned, local);

        let date = zoned.as_date_time().unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 31));
        assert_eq!(
            format_scalar(&ValueType::DateTime, &zoned).unwrap(),
            "20240131T093000Z"
        );
    }

    #[test]
    fn test_guid_writes_braced_upper_case() {
        let value = parse_scalar(
            &ValueType::Guid,
            Some("6f1c2b9e-4d1a-4c3b-9a55-0e2f7a1b3c4d"),
        )
        .unwrap();
        assert_eq!(
            format_scalar(&ValueType::Guid, &value).unwrap(),
            "{6F1C2B9E-4D1A-4C3B-9A55-0E2F7A1B3C4D}"
        );
    }

    #[test]
    fn test_malformed_raw_values_fail() {
        assert!(matches!(
            parse_scalar(&ValueType::Integer, Some("twelve")),
            Err(MapperError::Mapping(_))
        ));
        assert!(parse_scalar(&ValueType::Float, Some("1.5.2")).is_err());
        assert!(parse_scalar(&ValueType::DateTime, Some("yesterday")).is_err());
        assert!(parse_scalar(&ValueType::Guid, Some("not-a-guid")).is_err());
    }

    #[test]
    fn test_type_mismatch_on_write() {
        let err = format_scalar(&ValueType::Integer, &Value::Text("12".into())).unwrap_err();
        assert!(err.to_string().contains("got text"));
        assert_eq!(
            format_scalar(&ValueType::Float, &Value::Integer(3)).unwrap(),
            "3"
        );
        assert_eq!(format_scalar(&ValueType::Text, &Value::Null).unwrap(), "");
    }
}
