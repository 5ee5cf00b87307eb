// SPDX-License-Identifier: Apache-2.0
//! Primitive and composite type descriptors.
//!
//! The catalog's value space is small and closed: seven primitive kinds,
//! one-level homogeneous arrays and string-keyed maps. [`BasicType`] names a
//! kind; [`TypeDescriptor`] carries the element type for composites.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// BasicType
// ---------------------------------------------------------------------------

/// The kind of a metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BasicType {
    /// True / false.
    Boolean,
    /// 64-bit signed integer.
    Integer,
    /// IEEE-754 double.
    Float,
    /// Arbitrary-precision decimal, text-encoded on the wire.
    Decimal,
    /// UTF-8 string.
    String,
    /// ISO local date, no offset.
    Date,
    /// ISO datetime, optional offset on input, stored as UTC.
    Datetime,
    /// Homogeneous one-level array of primitives.
    Array,
    /// String-keyed map of primitives. Not allowed as a tag value.
    Map,
}

impl BasicType {
    /// Returns `true` for the seven primitive kinds.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Array | Self::Map)
    }

    /// Returns `true` for kinds that support ordered comparison in search.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::Decimal | Self::String | Self::Date | Self::Datetime
        )
    }

    /// Stable wire name, e.g. `"DATETIME"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Decimal => "DECIMAL",
            Self::String => "STRING",
            Self::Date => "DATE",
            Self::Datetime => "DATETIME",
            Self::Array => "ARRAY",
            Self::Map => "MAP",
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TypeDescriptor
// ---------------------------------------------------------------------------

/// Full description of a value type, including composite element types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    /// The kind of the described type.
    pub basic_type: BasicType,

    /// Element type for `ARRAY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_of: Option<Box<TypeDescriptor>>,

    /// Value type for `MAP` (keys are always `STRING`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_of: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    /// Descriptor for a primitive kind.
    pub fn primitive(basic_type: BasicType) -> Self {
        Self {
            basic_type,
            array_of: None,
            map_of: None,
        }
    }

    /// Descriptor for a one-level array of the given primitive kind.
    pub fn array_of(element: BasicType) -> Self {
        Self {
            basic_type: BasicType::Array,
            array_of: Some(Box::new(Self::primitive(element))),
            map_of: None,
        }
    }

    /// Descriptor for a string-keyed map of the given primitive kind.
    pub fn map_of(value: BasicType) -> Self {
        Self {
            basic_type: BasicType::Map,
            array_of: None,
            map_of: Some(Box::new(Self::primitive(value))),
        }
    }

    /// Whether the descriptor is structurally valid: composites carry their
    /// element type, primitives carry none, and nesting is one level deep.
    pub fn is_well_formed(&self) -> bool {
        match self.basic_type {
            BasicType::Array => match (&self.array_of, &self.map_of) {
                (Some(el), None) => el.basic_type.is_primitive() && el.is_well_formed(),
                _ => false,
            },
            BasicType::Map => match (&self.array_of, &self.map_of) {
                (None, Some(el)) => el.basic_type.is_primitive() && el.is_well_formed(),
                _ => false,
            },
            _ => self.array_of.is_none() && self.map_of.is_none(),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.basic_type {
            BasicType::Array => match &self.array_of {
                Some(el) => write!(f, "ARRAY<{el}>"),
                None => f.write_str("ARRAY<?>"),
            },
            BasicType::Map => match &self.map_of {
                Some(el) => write!(f, "MAP<STRING, {el}>"),
                None => f.write_str("MAP<STRING, ?>"),
            },
            basic => basic.fmt(f),
        }
    }
}
