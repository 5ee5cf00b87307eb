// SPDX-License-Identifier: Apache-2.0
//! Mapping between native values and the per-type attribute columns.

use chrono::DateTime;
use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use trac_error::{ErrorKind, TracError};
use trac_metadata::codec;
use trac_metadata::typesystem::BasicType;
use trac_metadata::value::Value;

/// A bound SQL parameter.
#[derive(Debug, Clone)]
pub enum SqlValue {
    /// INTEGER affinity.
    Integer(i64),
    /// REAL affinity.
    Real(f64),
    /// TEXT affinity.
    Text(String),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Integer(i) => i.to_sql(),
            Self::Real(f) => f.to_sql(),
            Self::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

/// The `tag_attr` column holding values of a primitive type.
pub fn value_column(basic_type: BasicType) -> &'static str {
    match basic_type {
        BasicType::Boolean => "value_boolean",
        BasicType::Integer => "value_integer",
        BasicType::Float => "value_float",
        BasicType::Decimal => "value_decimal",
        BasicType::String => "value_string",
        BasicType::Date => "value_date",
        BasicType::Datetime => "value_datetime",
        // Composites never reach a value column; arrays store their
        // elements and maps are not valid attribute values.
        BasicType::Array | BasicType::Map => "value_string",
    }
}

/// Encode one primitive value as a bound parameter for its column.
///
/// # Errors
///
/// Returns an internal error for composite values; callers flatten arrays
/// before encoding.
pub fn value_param(value: &Value) -> Result<SqlValue, TracError> {
    match value {
        Value::Boolean(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Integer(i) => Ok(SqlValue::Integer(*i)),
        Value::Float(f) => Ok(SqlValue::Real(*f)),
        Value::Decimal(d) => Ok(SqlValue::Text(codec::decimal_to_canonical(d))),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Date(d) => Ok(SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        Value::Datetime(dt) => Ok(SqlValue::Integer(dt.timestamp_micros())),
        Value::Array(_) | Value::Map(_) => Err(TracError::new(
            ErrorKind::Internal,
            "composite values cannot be bound to a single attribute column",
        )),
    }
}

/// Decode one attribute row back into a primitive value.
///
/// # Errors
///
/// Returns an internal error when the stored column contents do not match
/// the recorded attribute type (an invariant breach, not client input).
pub fn decode_attr_row(
    attr_type: &str,
    row: &rusqlite::Row<'_>,
    first_value_column: usize,
) -> Result<Value, TracError> {
    let internal = |what: &str| TracError::new(ErrorKind::Internal, format!("corrupt attribute row: {what}"));

    // Column order matches the DDL: boolean, integer, float, decimal,
    // string, date, datetime.
    let col = |offset: usize| first_value_column + offset;

    let value = match attr_type {
        "BOOLEAN" => {
            let raw: i64 = row.get(col(0)).map_err(|_| internal("boolean"))?;
            Value::Boolean(raw != 0)
        }
        "INTEGER" => Value::Integer(row.get(col(1)).map_err(|_| internal("integer"))?),
        "FLOAT" => Value::Float(row.get(col(2)).map_err(|_| internal("float"))?),
        "DECIMAL" => {
            let raw: String = row.get(col(3)).map_err(|_| internal("decimal"))?;
            Value::Decimal(codec::parse_decimal(&raw).map_err(|_| internal("decimal text"))?)
        }
        "STRING" => Value::String(row.get(col(4)).map_err(|_| internal("string"))?),
        "DATE" => {
            let raw: String = row.get(col(5)).map_err(|_| internal("date"))?;
            Value::Date(codec::parse_date(&raw).map_err(|_| internal("date text"))?)
        }
        "DATETIME" => {
            let micros: i64 = row.get(col(6)).map_err(|_| internal("datetime"))?;
            Value::Datetime(
                DateTime::from_timestamp_micros(micros).ok_or_else(|| internal("datetime range"))?,
            )
        }
        other => return Err(internal(&format!("unknown attribute type [{other}]"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_primitive_has_its_own_column() {
        let primitives = [
            BasicType::Boolean,
            BasicType::Integer,
            BasicType::Float,
            BasicType::Decimal,
            BasicType::String,
            BasicType::Date,
            BasicType::Datetime,
        ];
        let mut seen = std::collections::HashSet::new();
        for ty in primitives {
            assert!(seen.insert(value_column(ty)), "column reused for {ty}");
        }
    }

    #[test]
    fn params_take_the_expected_affinity() {
        assert!(matches!(
            value_param(&Value::Boolean(true)).unwrap(),
            SqlValue::Integer(1)
        ));
        assert!(matches!(
            value_param(&Value::String("x".into())).unwrap(),
            SqlValue::Text(_)
        ));
        let dt = codec::parse_datetime("2024-06-01T10:00:00Z").unwrap();
        assert!(matches!(
            value_param(&Value::Datetime(dt)).unwrap(),
            SqlValue::Integer(_)
        ));
    }

    #[test]
    fn composite_params_are_rejected() {
        let arr = Value::Array(vec![Value::Integer(1)]);
        assert!(value_param(&arr).is_err());
    }
}
