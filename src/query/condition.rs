use std::cmp::Ordering;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::core::{DbError, Result, Row, Value};

/// A single predicate of a query. Raw conditions are opaque to the query
/// algebra and are handed to the gateway untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Raw { sql: String, bindings: Vec<Value> },
}

impl Condition {
    /// Field the condition constrains; `None` for raw fragments.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Eq(field, _)
            | Self::Ne(field, _)
            | Self::Gt(field, _)
            | Self::Gte(field, _)
            | Self::Lt(field, _)
            | Self::Lte(field, _)
            | Self::In(field, _) => Some(field),
            Self::Raw { .. } => None,
        }
    }

    /// Applies `cast` to every typed operand, keeping the structure.
    pub fn map_values<F>(&self, mut cast: F) -> Result<Self>
    where
        F: FnMut(&str, &Value) -> Result<Value>,
    {
        Ok(match self {
            Self::Eq(field, value) => Self::Eq(field.clone(), cast(field, value)?),
            Self::Ne(field, value) => Self::Ne(field.clone(), cast(field, value)?),
            Self::Gt(field, value) => Self::Gt(field.clone(), cast(field, value)?),
            Self::Gte(field, value) => Self::Gte(field.clone(), cast(field, value)?),
            Self::Lt(field, value) => Self::Lt(field.clone(), cast(field, value)?),
            Self::Lte(field, value) => Self::Lte(field.clone(), cast(field, value)?),
            Self::In(field, values) => Self::In(
                field.clone(),
                values
                    .iter()
                    .map(|value| cast(field, value))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Raw { .. } => self.clone(),
        })
    }

    pub fn matches(&self, row: &Row) -> Result<bool> {
        let lookup = |field: &str| row.get(field).cloned().unwrap_or(Value::Null);
        Ok(match self {
            Self::Eq(field, value) => lookup(field) == *value,
            Self::Ne(field, value) => lookup(field) != *value,
            Self::Gt(field, value) => compare_present(&lookup(field), value) == Some(Ordering::Greater),
            Self::Gte(field, value) => matches!(
                compare_present(&lookup(field), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(field, value) => compare_present(&lookup(field), value) == Some(Ordering::Less),
            Self::Lte(field, value) => matches!(
                compare_present(&lookup(field), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In(field, values) => {
                let actual = lookup(field);
                values.iter().any(|value| *value == actual)
            }
            Self::Raw { sql, bindings } => RawCondition::parse(sql, bindings)?.matches(row),
        })
    }
}

/// Ordering comparisons never match NULL operands.
fn compare_present(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    left.compare(right).ok()
}

// ============================================================================
// Raw condition fragments
// ============================================================================

lazy_static! {
    static ref AND_SPLIT: Regex = Regex::new(r"(?i)\s+and\s+").expect("valid AND pattern");
    static ref CLAUSE: Regex = Regex::new(
        r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(=|==|!=|<>|<=|>=|<|>|is\s+not\s+null|is\s+null)\s*(\?)?\s*$"
    )
    .expect("valid clause pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
}

/// The subset of SQL fragments the in-process gateway can evaluate:
/// `<field> <op> ?` clauses joined by `AND`.
#[derive(Debug, Clone)]
pub struct RawCondition {
    clauses: Vec<(String, RawOperator, Option<Value>)>,
}

impl RawCondition {
    pub fn parse(sql: &str, bindings: &[Value]) -> Result<Self> {
        let mut clauses = Vec::new();
        let mut remaining = bindings.iter();

        for fragment in AND_SPLIT.split(sql.trim()) {
            let captures = CLAUSE.captures(fragment).ok_or_else(|| {
                DbError::ParseError(format!("unsupported raw condition fragment '{}'", fragment))
            })?;
            let field = captures[1].to_string();
            let normalized = captures[2]
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_lowercase();
            let operator = match normalized.as_str() {
                "=" | "==" => RawOperator::Eq,
                "!=" | "<>" => RawOperator::Ne,
                "<" => RawOperator::Lt,
                "<=" => RawOperator::Lte,
                ">" => RawOperator::Gt,
                ">=" => RawOperator::Gte,
                "is null" => RawOperator::IsNull,
                "is not null" => RawOperator::IsNotNull,
                other => {
                    return Err(DbError::ParseError(format!("unsupported operator '{}'", other)));
                }
            };

            let operand = if captures.get(3).is_some() {
                let value = remaining.next().ok_or_else(|| {
                    DbError::ParseError(format!("missing binding for '{}'", fragment))
                })?;
                Some(value.clone())
            } else if matches!(operator, RawOperator::IsNull | RawOperator::IsNotNull) {
                None
            } else {
                return Err(DbError::ParseError(format!(
                    "expected a '?' placeholder in '{}'",
                    fragment
                )));
            };

            clauses.push((field, operator, operand));
        }

        if remaining.next().is_some() {
            return Err(DbError::ParseError(format!(
                "too many bindings for raw condition '{}'",
                sql
            )));
        }

        Ok(Self { clauses })
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|(field, operator, operand)| {
            let actual = row.get(field).cloned().unwrap_or(Value::Null);
            let expected = operand.clone().unwrap_or(Value::Null);
            match operator {
                RawOperator::Eq => actual == expected,
                RawOperator::Ne => actual != expected,
                RawOperator::Lt => compare_present(&actual, &expected) == Some(Ordering::Less),
                RawOperator::Lte => matches!(
                    compare_present(&actual, &expected),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                RawOperator::Gt => compare_present(&actual, &expected) == Some(Ordering::Greater),
                RawOperator::Gte => matches!(
                    compare_present(&actual, &expected),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                RawOperator::IsNull => actual.is_null(),
                RawOperator::IsNotNull => !actual.is_null(),
            }
        })
    }
}
