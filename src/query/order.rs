// ============================================================================
// Ordering directives and the row comparator built from them
// ============================================================================
//
// NULL handling follows SQL: NULLS LAST for ascending, NULLS FIRST for
// descending. Sorting is stable, so rows equal under every directive keep
// their storage order.
//
// ============================================================================

use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use crate::core::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// A single ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            field: self.field.clone(),
            direction: self.direction.reversed(),
        }
    }

    /// Compares two values under this directive. `Value::sort_cmp` already
    /// puts NULL last, and flipping it for DESC yields NULLS FIRST.
    pub fn compare_values(&self, left: &Value, right: &Value) -> Ordering {
        let ordering = left.sort_cmp(right);
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Compares rows by a list of directives; missing fields compare as NULL.
pub struct RowComparator<'a> {
    order: &'a [Order],
}

impl<'a> RowComparator<'a> {
    pub fn new(order: &'a [Order]) -> Self {
        Self { order }
    }

    pub fn compare(&self, left: &Row, right: &Row) -> Ordering {
        for directive in self.order {
            let left_value = left.get(&directive.field).unwrap_or(&Value::Null);
            let right_value = right.get(&directive.field).unwrap_or(&Value::Null);
            match directive.compare_values(left_value, right_value) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    pub fn sort(&self, rows: &mut [Row]) {
        rows.sort_by(|left, right| self.compare(left, right));
    }
}
