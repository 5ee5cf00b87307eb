// SPDX-License-Identifier: Apache-2.0
//! Attribute search expressions.
//!
//! A search is a tree whose interior nodes are AND / OR / NOT and whose
//! leaves compare one attribute against a literal. Searches see only the
//! attribute index; object payloads are opaque to the search engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::object::ObjectType;
use crate::typesystem::BasicType;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison operators for search terms.
///
/// On multi-valued attributes, EQ / IN and the ordered operators match when
/// *any* element matches, except that ordered operators never match
/// multi-valued attributes at all; NE matches only when *no* element does.
/// An absent attribute matches NE and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Equal to any of a list of literals.
    In,
}

impl SearchOperator {
    /// Whether this operator requires an ordered attribute type.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

impl fmt::Display for SearchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::In => "IN",
        };
        f.write_str(s)
    }
}

/// Combinators for interior expression nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOperator {
    /// All sub-expressions must match.
    And,
    /// Any sub-expression must match.
    Or,
    /// The single sub-expression must not match.
    Not,
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

/// A leaf comparison: `attr OP literal` or `attr IN [literals]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTerm {
    /// Attribute name to compare.
    pub attr_name: String,
    /// Declared attribute type; ordered comparisons require exact agreement
    /// with the stored type.
    pub attr_type: BasicType,
    /// Comparison operator.
    pub operator: SearchOperator,
    /// The literal; for IN, an array of literals of the declared type.
    pub search_value: Value,
}

/// An interior node combining sub-expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalExpression {
    /// The combinator.
    pub operator: LogicalOperator,
    /// Sub-expressions; NOT takes exactly one.
    pub expr: Vec<SearchExpression>,
}

/// A search expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchExpression {
    /// A leaf comparison.
    Term(SearchTerm),
    /// A logical combination.
    Logical(LogicalExpression),
}

impl SearchExpression {
    /// Leaf shorthand.
    pub fn term(
        attr_name: impl Into<String>,
        attr_type: BasicType,
        operator: SearchOperator,
        search_value: Value,
    ) -> Self {
        Self::Term(SearchTerm {
            attr_name: attr_name.into(),
            attr_type,
            operator,
            search_value,
        })
    }

    /// Conjunction shorthand.
    pub fn and(exprs: Vec<SearchExpression>) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::And,
            expr: exprs,
        })
    }

    /// Disjunction shorthand.
    pub fn or(exprs: Vec<SearchExpression>) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::Or,
            expr: exprs,
        })
    }

    /// Negation shorthand.
    pub fn not(expr: SearchExpression) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::Not,
            expr: vec![expr],
        })
    }
}

// ---------------------------------------------------------------------------
// SearchParameters
// ---------------------------------------------------------------------------

/// A complete search request against one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameters {
    /// The object type to search.
    pub object_type: ObjectType,
    /// The expression tree.
    pub search: SearchExpression,
    /// Include superseded object versions.
    #[serde(default)]
    pub prior_versions: bool,
    /// Include superseded tag versions.
    #[serde(default)]
    pub prior_tags: bool,
    /// Historical cutoff; latest semantics are recomputed within the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_as_of: Option<DateTime<Utc>>,
}

impl SearchParameters {
    /// A latest-only search with the given expression.
    pub fn new(object_type: ObjectType, search: SearchExpression) -> Self {
        Self {
            object_type,
            search,
            prior_versions: false,
            prior_tags: false,
            search_as_of: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_operator_classification() {
        assert!(SearchOperator::Gt.is_ordered());
        assert!(SearchOperator::Le.is_ordered());
        assert!(!SearchOperator::Eq.is_ordered());
        assert!(!SearchOperator::In.is_ordered());
    }

    #[test]
    fn expression_tree_roundtrip() {
        let expr = SearchExpression::and(vec![
            SearchExpression::term(
                "region",
                BasicType::String,
                SearchOperator::Eq,
                Value::String("Scotland".into()),
            ),
            SearchExpression::not(SearchExpression::term(
                "rows",
                BasicType::Integer,
                SearchOperator::Gt,
                Value::Integer(100),
            )),
        ]);
        let params = SearchParameters::new(ObjectType::Data, expr);
        let json = serde_json::to_string(&params).unwrap();
        let back: SearchParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn defaults_are_latest_only() {
        let params = SearchParameters::new(
            ObjectType::Model,
            SearchExpression::term(
                "stage",
                BasicType::String,
                SearchOperator::Eq,
                Value::String("prod".into()),
            ),
        );
        assert!(!params.prior_versions);
        assert!(!params.prior_tags);
        assert!(params.search_as_of.is_none());
    }
}
