// SPDX-License-Identifier: Apache-2.0
//! Wire codec: tagged JSON form ↔ native values.
//!
//! The wire form of a value is `{"type": KIND, "value": …}`, with an
//! additional `"elementType"` for composites so that empty arrays and maps
//! round-trip their element kind. Round-trips are exact for all primitives
//! except `FLOAT`, where bit-for-bit equality is not guaranteed across
//! encoders.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::typesystem::BasicType;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while encoding or decoding wire values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Decimal text was not in canonical form or did not parse.
    #[error("invalid decimal [{0}]")]
    InvalidDecimal(String),

    /// Date text did not match `YYYY-MM-DD`.
    #[error("invalid date [{0}]")]
    InvalidDate(String),

    /// Datetime text was not an ISO datetime with optional offset.
    #[error("invalid datetime [{0}]")]
    InvalidDatetime(String),

    /// The JSON payload did not match the declared type.
    #[error("wire value does not match declared type {expected}")]
    TypeMismatch {
        /// The type the wire form declared.
        expected: BasicType,
    },

    /// Non-finite doubles have no JSON representation.
    #[error("non-finite float values cannot be encoded")]
    NonFiniteFloat,

    /// Composite wire form without an element type, or with a composite
    /// element type (nesting is one level).
    #[error("composite value must declare a primitive element type")]
    BadElementType,
}

// ---------------------------------------------------------------------------
// Parsing primitives
// ---------------------------------------------------------------------------

/// Parse canonical decimal text.
///
/// Canonical form is an optional leading `-`, an integer part with no
/// superfluous leading zero, and an optional fractional part. Signs other
/// than `-`, exponent notation, and empty parts are rejected.
pub fn parse_decimal(text: &str) -> Result<BigDecimal, CodecError> {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let int_ok = !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && (int_part.len() == 1 || !int_part.starts_with('0'));
    let frac_ok = frac_part.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));

    if !int_ok || !frac_ok {
        return Err(CodecError::InvalidDecimal(text.to_string()));
    }

    BigDecimal::from_str(text).map_err(|_| CodecError::InvalidDecimal(text.to_string()))
}

/// Canonical text for a decimal value (plain notation, scale preserved).
pub fn decimal_to_canonical(value: &BigDecimal) -> String {
    value.to_string()
}

/// Parse an ISO local date. Offsets are not accepted.
pub fn parse_date(text: &str) -> Result<NaiveDate, CodecError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| CodecError::InvalidDate(text.to_string()))
}

/// Parse an ISO datetime with optional offset; no offset means UTC.
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>, CodecError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| CodecError::InvalidDatetime(text.to_string()))
}

/// Render a datetime in the canonical wire form (UTC, microseconds, `Z`).
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// The tagged JSON representation of a [`Value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireValue {
    /// The declared kind.
    #[serde(rename = "type")]
    pub basic_type: BasicType,

    /// Element kind for `ARRAY` / `MAP`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<BasicType>,

    /// The payload: a plain JSON scalar for primitives, an array or object
    /// of plain scalars for composites.
    pub value: serde_json::Value,
}

/// Encode a native value into its wire form.
pub fn encode_value(value: &Value) -> Result<WireValue, CodecError> {
    let wire = match value {
        Value::Array(items) => WireValue {
            basic_type: BasicType::Array,
            element_type: value.element_type(),
            value: serde_json::Value::Array(
                items
                    .iter()
                    .map(encode_primitive)
                    .collect::<Result<_, _>>()?,
            ),
        },
        Value::Map(entries) => WireValue {
            basic_type: BasicType::Map,
            element_type: value.element_type(),
            value: serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), encode_primitive(v)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
        },
        primitive => WireValue {
            basic_type: primitive.basic_type(),
            element_type: None,
            value: encode_primitive(primitive)?,
        },
    };
    Ok(wire)
}

/// Decode a wire form back into a native value.
pub fn decode_value(wire: &WireValue) -> Result<Value, CodecError> {
    match wire.basic_type {
        BasicType::Array => {
            let element = composite_element(wire)?;
            let items = wire
                .value
                .as_array()
                .ok_or(CodecError::TypeMismatch {
                    expected: BasicType::Array,
                })?
                .iter()
                .map(|item| decode_primitive(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        BasicType::Map => {
            let element = composite_element(wire)?;
            let entries = wire
                .value
                .as_object()
                .ok_or(CodecError::TypeMismatch {
                    expected: BasicType::Map,
                })?
                .iter()
                .map(|(k, v)| Ok((k.clone(), decode_primitive(element, v)?)))
                .collect::<Result<BTreeMap<_, _>, CodecError>>()?;
            Ok(Value::Map(entries))
        }
        primitive => decode_primitive(primitive, &wire.value),
    }
}

fn composite_element(wire: &WireValue) -> Result<BasicType, CodecError> {
    match wire.element_type {
        Some(el) if el.is_primitive() => Ok(el),
        _ => Err(CodecError::BadElementType),
    }
}

fn encode_primitive(value: &Value) -> Result<serde_json::Value, CodecError> {
    use serde_json::Value as Json;
    match value {
        Value::Boolean(b) => Ok(Json::Bool(*b)),
        Value::Integer(i) => Ok(Json::Number((*i).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or(CodecError::NonFiniteFloat),
        Value::Decimal(d) => Ok(Json::String(decimal_to_canonical(d))),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Date(d) => Ok(Json::String(d.format("%Y-%m-%d").to_string())),
        Value::Datetime(dt) => Ok(Json::String(format_datetime(dt))),
        Value::Array(_) | Value::Map(_) => Err(CodecError::BadElementType),
    }
}

fn decode_primitive(expected: BasicType, json: &serde_json::Value) -> Result<Value, CodecError> {
    let mismatch = || CodecError::TypeMismatch { expected };
    match expected {
        BasicType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        BasicType::Integer => json.as_i64().map(Value::Integer).ok_or_else(mismatch),
        BasicType::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
        BasicType::Decimal => {
            let text = json.as_str().ok_or_else(mismatch)?;
            parse_decimal(text).map(Value::Decimal)
        }
        BasicType::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        BasicType::Date => {
            let text = json.as_str().ok_or_else(mismatch)?;
            parse_date(text).map(Value::Date)
        }
        BasicType::Datetime => {
            let text = json.as_str().ok_or_else(mismatch)?;
            parse_datetime(text).map(Value::Datetime)
        }
        BasicType::Array | BasicType::Map => Err(CodecError::BadElementType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let wire = encode_value(&value).unwrap();
        let json = serde_json::to_string(&wire).unwrap();
        let back: WireValue = serde_json::from_str(&json).unwrap();
        decode_value(&back).unwrap()
    }

    #[test]
    fn primitive_roundtrips_are_exact() {
        assert_eq!(roundtrip(Value::Boolean(true)), Value::Boolean(true));
        assert_eq!(roundtrip(Value::Integer(-42)), Value::Integer(-42));
        assert_eq!(
            roundtrip(Value::String("région".into())),
            Value::String("région".into())
        );
        let d = parse_date("2024-02-29").unwrap();
        assert_eq!(roundtrip(Value::Date(d)), Value::Date(d));
    }

    #[test]
    fn decimal_roundtrip_preserves_scale() {
        let dec = parse_decimal("10.250").unwrap();
        let wire = encode_value(&Value::Decimal(dec.clone())).unwrap();
        assert_eq!(wire.value, serde_json::json!("10.250"));
        assert_eq!(roundtrip(Value::Decimal(dec.clone())), Value::Decimal(dec));
    }

    #[test]
    fn canonical_decimal_accepted() {
        for text in ["0", "-0.5", "123.456", "1000000000000000000000.000001"] {
            assert!(parse_decimal(text).is_ok(), "rejected {text}");
        }
    }

    #[test]
    fn non_canonical_decimal_rejected() {
        for text in ["+1", "1e5", "1E5", ".5", "01", "1.", "", "-", "1,5", " 1"] {
            assert!(parse_decimal(text).is_err(), "accepted {text}");
        }
    }

    #[test]
    fn date_with_offset_rejected() {
        assert!(parse_date("2024-01-01+01:00").is_err());
        assert!(parse_date("2024-01-01T00:00:00").is_err());
    }

    #[test]
    fn datetime_accepts_offset_and_normalises_to_utc() {
        let with_offset = parse_datetime("2024-06-01T12:00:00+02:00").unwrap();
        let utc = parse_datetime("2024-06-01T10:00:00Z").unwrap();
        assert_eq!(with_offset, utc);
    }

    #[test]
    fn datetime_without_offset_is_utc() {
        let naive = parse_datetime("2024-06-01T10:30:00.25").unwrap();
        let explicit = parse_datetime("2024-06-01T10:30:00.25Z").unwrap();
        assert_eq!(naive, explicit);
    }

    #[test]
    fn datetime_garbage_rejected() {
        assert!(parse_datetime("yesterday").is_err());
        assert!(parse_datetime("2024-06-01").is_err());
    }

    #[test]
    fn array_roundtrip_keeps_element_type() {
        let v = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let wire = encode_value(&v).unwrap();
        assert_eq!(wire.element_type, Some(BasicType::Integer));
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn composite_without_element_type_rejected() {
        let wire = WireValue {
            basic_type: BasicType::Array,
            element_type: None,
            value: serde_json::json!([1, 2]),
        };
        assert!(matches!(
            decode_value(&wire),
            Err(CodecError::BadElementType)
        ));
    }

    #[test]
    fn map_roundtrip() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), Value::String("x".into()));
        entries.insert("b".to_string(), Value::String("y".into()));
        let v = Value::Map(entries);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn integer_does_not_accept_float_json() {
        let wire = WireValue {
            basic_type: BasicType::Integer,
            element_type: None,
            value: serde_json::json!(1.5),
        };
        assert!(decode_value(&wire).is_err());
    }

    #[test]
    fn non_finite_float_rejected_on_encode() {
        assert!(matches!(
            encode_value(&Value::Float(f64::NAN)),
            Err(CodecError::NonFiniteFloat)
        ));
    }
}
