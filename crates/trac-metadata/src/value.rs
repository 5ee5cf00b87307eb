// SPDX-License-Identifier: Apache-2.0
//! Canonical metadata values.
//!
//! [`Value`] is the native form of everything that can appear as a tag
//! attribute or a search literal. Its serde representation is the tagged
//! wire form defined by [`crate::codec`], so a `Value` serialises
//! identically wherever it appears.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::codec;
use crate::typesystem::{BasicType, TypeDescriptor};

/// A metadata value: primitive, one-level array, or string-keyed map.
///
/// Equality is structural except for `DECIMAL`, where it is numerical
/// (`1.10 == 1.1`), and `FLOAT`, where `==` on doubles is permitted but
/// unreliable across encoders.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// True / false.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    /// UTF-8 string.
    String(String),
    /// ISO local date.
    Date(NaiveDate),
    /// UTC datetime (offsets are normalised on input).
    Datetime(DateTime<Utc>),
    /// Homogeneous one-level array of primitives.
    Array(Vec<Value>),
    /// String-keyed map of primitives.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The kind of this value.
    pub fn basic_type(&self) -> BasicType {
        match self {
            Self::Boolean(_) => BasicType::Boolean,
            Self::Integer(_) => BasicType::Integer,
            Self::Float(_) => BasicType::Float,
            Self::Decimal(_) => BasicType::Decimal,
            Self::String(_) => BasicType::String,
            Self::Date(_) => BasicType::Date,
            Self::Datetime(_) => BasicType::Datetime,
            Self::Array(_) => BasicType::Array,
            Self::Map(_) => BasicType::Map,
        }
    }

    /// Returns `true` for primitive values.
    pub fn is_primitive(&self) -> bool {
        self.basic_type().is_primitive()
    }

    /// Element kind for arrays and maps, if the composite is non-empty and
    /// homogeneous. Empty composites report `None`.
    pub fn element_type(&self) -> Option<BasicType> {
        let elements: Vec<&Value> = match self {
            Self::Array(items) => items.iter().collect(),
            Self::Map(entries) => entries.values().collect(),
            _ => return None,
        };
        let first = elements.first()?.basic_type();
        elements
            .iter()
            .all(|v| v.basic_type() == first)
            .then_some(first)
    }

    /// Full type descriptor, including composite element types where known.
    pub fn type_descriptor(&self) -> TypeDescriptor {
        match self {
            Self::Array(_) => match self.element_type() {
                Some(el) => TypeDescriptor::array_of(el),
                None => TypeDescriptor::primitive(BasicType::Array),
            },
            Self::Map(_) => match self.element_type() {
                Some(el) => TypeDescriptor::map_of(el),
                None => TypeDescriptor::primitive(BasicType::Map),
            },
            _ => TypeDescriptor::primitive(self.basic_type()),
        }
    }

    /// A value is a well-formed tag attribute value when it is primitive, or
    /// a non-empty homogeneous array of primitives. Maps, nested arrays and
    /// mixed-type arrays are not.
    pub fn is_valid_attr_value(&self) -> bool {
        match self {
            Self::Map(_) => false,
            Self::Array(items) => {
                !items.is_empty()
                    && self.element_type().is_some_and(|el| el.is_primitive())
                    && items.iter().all(|v| v.is_primitive())
            }
            _ => true,
        }
    }
}

// Serde delegates to the wire codec so the tagged form is the one and only
// JSON representation of a value.

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = codec::encode_value(self).map_err(serde::ser::Error::custom)?;
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = codec::WireValue::deserialize(deserializer)?;
        codec::decode_value(&wire).map_err(D::Error::custom)
    }
}
