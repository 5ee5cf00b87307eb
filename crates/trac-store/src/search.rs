// SPDX-License-Identifier: Apache-2.0
//! Translation of search expressions into SQL over the attribute index.
//!
//! Only the attribute table is searched; object payloads are opaque. Terms
//! become EXISTS subqueries against `tag_attr`, so multi-valued attributes
//! match when any element matches. NE is a NOT EXISTS, which also makes an
//! absent attribute match. Ordered comparisons additionally require
//! `attr_index = -1`, so they never match multi-valued attributes, and
//! they require exact type agreement through the `attr_type` column.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use trac_error::{ErrorKind, TracError};
use trac_metadata::identifiers::TagHeader;
use trac_metadata::search::{
    LogicalOperator, SearchExpression, SearchOperator, SearchParameters, SearchTerm,
};
use trac_metadata::tag::Tag;
use trac_metadata::typesystem::BasicType;
use trac_metadata::value::Value;

use crate::dialect::SqlDialect;
use crate::store::load_attrs;
use crate::values::{SqlValue, value_column, value_param};

fn internal(message: &str) -> impl Fn(rusqlite::Error) -> TracError + '_ {
    move |e| TracError::new(ErrorKind::Internal, message).with_source(e)
}

/// Run a search against one tenant.
pub(crate) fn search_conn(
    conn: &Connection,
    dialect: &dyn SqlDialect,
    tenant: &str,
    parameters: &SearchParameters,
) -> Result<Vec<Tag>, TracError> {
    let mut sql = String::from(
        "SELECT o.object_id, d.object_version, d.object_timestamp, d.is_latest,
                t.tag_version, t.tag_timestamp, t.is_latest, t.tag_pk
         FROM tag t
         JOIN object_definition d ON t.definition_fk = d.definition_pk
         JOIN object o ON d.object_fk = o.object_pk
         WHERE o.tenant_code = ? AND o.object_type = ?",
    );
    let mut params: Vec<SqlValue> = vec![
        SqlValue::Text(tenant.to_string()),
        SqlValue::Text(parameters.object_type.as_str().to_string()),
    ];

    version_scope(&mut sql, &mut params, parameters);
    sql.push_str(" AND ");
    translate_expression(&mut sql, &mut params, dialect, &parameters.search)?;
    sql.push_str(" ORDER BY o.object_id, d.object_version, t.tag_version");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(internal("failed to prepare the search query"))?;

    struct SearchRow {
        object_id: String,
        object_version: u32,
        object_timestamp: i64,
        is_latest_object: bool,
        tag_version: u32,
        tag_timestamp: i64,
        is_latest_tag: bool,
        tag_pk: i64,
    }

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(SearchRow {
                object_id: row.get(0)?,
                object_version: row.get(1)?,
                object_timestamp: row.get(2)?,
                is_latest_object: row.get(3)?,
                tag_version: row.get(4)?,
                tag_timestamp: row.get(5)?,
                is_latest_tag: row.get(6)?,
                tag_pk: row.get(7)?,
            })
        })
        .map_err(internal("failed to run the search query"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(internal("failed to read search rows"))?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let object_id = row
            .object_id
            .parse()
            .map_err(|_| TracError::new(ErrorKind::Internal, "stored object id is not a UUID"))?;
        let attributes = load_attrs(conn, row.tag_pk)?;
        results.push(Tag {
            header: TagHeader {
                object_type: parameters.object_type,
                object_id,
                object_version: row.object_version,
                object_timestamp: micros(row.object_timestamp)?,
                is_latest_object: row.is_latest_object,
                tag_version: row.tag_version,
                tag_timestamp: micros(row.tag_timestamp)?,
                is_latest_tag: row.is_latest_tag,
            },
            // Search results omit the definition.
            definition: None,
            attributes,
        });
    }
    Ok(results)
}

fn micros(value: i64) -> Result<DateTime<Utc>, TracError> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| TracError::new(ErrorKind::Internal, "stored timestamp is out of range"))
}

/// Latest / prior / as-of scoping for the version and tag rows.
///
/// With a cutoff, latest semantics are recomputed *within the window*: the
/// chosen version is the greatest one committed at or before the cutoff,
/// and likewise for tags inside the chosen version.
fn version_scope(sql: &mut String, params: &mut Vec<SqlValue>, parameters: &SearchParameters) {
    match parameters.search_as_of {
        None => {
            if !parameters.prior_versions {
                sql.push_str(" AND d.is_latest = 1");
            }
            if !parameters.prior_tags {
                sql.push_str(" AND t.is_latest = 1");
            }
        }
        Some(as_of) => {
            let cutoff = as_of.timestamp_micros();

            sql.push_str(" AND d.object_timestamp <= ? AND t.tag_timestamp <= ?");
            params.push(SqlValue::Integer(cutoff));
            params.push(SqlValue::Integer(cutoff));

            if !parameters.prior_versions {
                sql.push_str(
                    " AND d.object_version = (SELECT MAX(d2.object_version)
                        FROM object_definition d2
                        WHERE d2.object_fk = d.object_fk AND d2.object_timestamp <= ?)",
                );
                params.push(SqlValue::Integer(cutoff));
            }
            if !parameters.prior_tags {
                sql.push_str(
                    " AND t.tag_version = (SELECT MAX(t2.tag_version)
                        FROM tag t2
                        WHERE t2.definition_fk = t.definition_fk AND t2.tag_timestamp <= ?)",
                );
                params.push(SqlValue::Integer(cutoff));
            }
        }
    }
}

fn translate_expression(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    dialect: &dyn SqlDialect,
    expression: &SearchExpression,
) -> Result<(), TracError> {
    match expression {
        SearchExpression::Term(term) => translate_term(sql, params, dialect, term),
        SearchExpression::Logical(logical) => {
            let joiner = match logical.operator {
                LogicalOperator::And => " AND ",
                LogicalOperator::Or => " OR ",
                LogicalOperator::Not => {
                    let inner = logical.expr.first().ok_or_else(|| {
                        TracError::new(ErrorKind::Internal, "NOT with no operand survived validation")
                    })?;
                    sql.push_str("NOT (");
                    translate_expression(sql, params, dialect, inner)?;
                    sql.push(')');
                    return Ok(());
                }
            };

            sql.push('(');
            for (index, sub) in logical.expr.iter().enumerate() {
                if index > 0 {
                    sql.push_str(joiner);
                }
                translate_expression(sql, params, dialect, sub)?;
            }
            sql.push(')');
            Ok(())
        }
    }
}

fn translate_term(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    dialect: &dyn SqlDialect,
    term: &SearchTerm,
) -> Result<(), TracError> {
    let column = format!("a.{}", value_column(term.attr_type));
    let attr_filter = "a.tag_fk = t.tag_pk AND a.attr_name = ? AND a.attr_type = ?";
    let push_attr_params = |params: &mut Vec<SqlValue>| {
        params.push(SqlValue::Text(term.attr_name.clone()));
        params.push(SqlValue::Text(term.attr_type.as_str().to_string()));
    };

    // Decimal columns hold canonical text; ordering and equality go
    // through the dialect's numeric rendering.
    let operand = |expr: &str| -> String {
        if term.attr_type == BasicType::Decimal {
            dialect.decimal_compare_expr(expr)
        } else {
            expr.to_string()
        }
    };

    match term.operator {
        SearchOperator::Eq => {
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM tag_attr a WHERE {attr_filter} AND {} = {})",
                operand(&column),
                operand("?"),
            ));
            push_attr_params(params);
            params.push(value_param(&term.search_value)?);
        }
        SearchOperator::Ne => {
            sql.push_str(&format!(
                "NOT EXISTS (SELECT 1 FROM tag_attr a WHERE {attr_filter} AND {} = {})",
                operand(&column),
                operand("?"),
            ));
            push_attr_params(params);
            params.push(value_param(&term.search_value)?);
        }
        SearchOperator::Gt | SearchOperator::Ge | SearchOperator::Lt | SearchOperator::Le => {
            let op = match term.operator {
                SearchOperator::Gt => ">",
                SearchOperator::Ge => ">=",
                SearchOperator::Lt => "<",
                SearchOperator::Le => "<=",
                _ => unreachable!(),
            };
            // attr_index = -1: ordered comparison never matches arrays.
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM tag_attr a
                  WHERE {attr_filter} AND a.attr_index = -1 AND {} {op} {})",
                operand(&column),
                operand("?"),
            ));
            push_attr_params(params);
            params.push(value_param(&term.search_value)?);
        }
        SearchOperator::In => {
            let Value::Array(items) = &term.search_value else {
                return Err(TracError::new(
                    ErrorKind::Internal,
                    "IN without a literal list survived validation",
                ));
            };
            let placeholders = vec![operand("?"); items.len()].join(", ");
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM tag_attr a WHERE {attr_filter} AND {} IN ({placeholders}))",
                operand(&column),
            ));
            push_attr_params(params);
            for item in items {
                params.push(value_param(item)?);
            }
        }
    }
    Ok(())
}
