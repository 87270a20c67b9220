//! Record transformation between extract and load.
//!
//! Applies field renames, type conversions, and optional field projection as
//! described by a pipeline's [`TransformationConfig`]. Conversion failures are
//! reported as [`ErrorKind::ConversionError`] and handled by the caller under
//! the pipeline's error policy.

use serde_json::Value;

use crate::error::{EngineResult, ErrorKind};
use crate::types::{Record, TransformationConfig, TypeConversion};

/// Applies `transformation` to `record`, producing the record to load.
///
/// Renames run first, then conversions keyed by post-rename field name, then
/// projection. A `None` or empty transformation returns the record unchanged.
pub fn apply(transformation: Option<&TransformationConfig>, record: Record) -> EngineResult<Record> {
    let Some(transformation) = transformation else {
        return Ok(record);
    };
    if transformation.is_empty() {
        return Ok(record);
    }

    let mut fields = serde_json::Map::with_capacity(record.fields.len());
    for (name, value) in record.fields {
        let name = transformation
            .renames
            .get(&name)
            .cloned()
            .unwrap_or(name);
        fields.insert(name, value);
    }

    for (name, conversion) in &transformation.conversions {
        if let Some(value) = fields.remove(name) {
            let converted = convert_value(&record.id, name, value, *conversion)?;
            fields.insert(name.clone(), converted);
        }
    }

    if let Some(include) = &transformation.include_fields {
        fields.retain(|name, _| include.iter().any(|kept| kept == name));
    }

    Ok(Record::new(record.id, fields))
}

/// Converts a single field value to the requested type.
///
/// Null values pass through unconverted so optional fields survive conversion.
fn convert_value(
    record_id: &str,
    field: &str,
    value: Value,
    conversion: TypeConversion,
) -> EngineResult<Value> {
    if value.is_null() {
        return Ok(value);
    }

    let converted = match conversion {
        TypeConversion::String => Some(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
        TypeConversion::Integer => match &value {
            Value::Number(n) => n.as_i64().map(Value::from),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            Value::Bool(b) => Some(Value::from(*b as i64)),
            _ => None,
        },
        TypeConversion::Float => match &value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
            _ => None,
        },
        TypeConversion::Boolean => match &value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| Value::Bool(n != 0)),
            _ => None,
        },
    };

    converted.ok_or_else(|| {
        engine_error!(
            ErrorKind::ConversionError,
            "field conversion failed",
            format!("record `{record_id}`: field `{field}` cannot convert to {conversion:?}")
        )
    })
}
