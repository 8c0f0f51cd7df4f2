//! Immutable descriptions of a selection and their narrowing algebra.

pub mod condition;
pub mod options;
pub mod order;

pub use condition::{Condition, RawCondition};
pub use options::QueryOptions;
pub use order::{Direction, Order, RowComparator};

use serde::{Deserialize, Serialize};
use crate::core::{Attributes, DbError, Result, Row};
use crate::schema::Model;

/// Target model, projection, conditions, ordering and window of a selection.
///
/// Two queries are equal iff every component is equal, including the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    repository: String,
    model: String,
    fields: Vec<String>,
    conditions: Vec<Condition>,
    order: Vec<Order>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    /// Builds a root query for `model`: default fields, key order, no window.
    pub fn new(repository: impl Into<String>, model: &Model) -> Self {
        Self {
            repository: repository.into(),
            model: model.name().to_string(),
            fields: model.default_fields(),
            conditions: Vec::new(),
            order: model.key_fields().into_iter().map(Order::asc).collect(),
            limit: None,
            offset: 0,
        }
    }

    /// Root query narrowed by `options` (resolved against `model` first).
    pub fn with_options(
        repository: impl Into<String>,
        model: &Model,
        options: &QueryOptions,
    ) -> Result<Self> {
        Self::new(repository, model).narrow(&options.resolve(model)?)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order(&self) -> &[Order] {
        &self.order
    }

    /// True when limit or offset restrict the selection.
    pub fn is_windowed(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Combines this scope with `options`.
    ///
    /// Offsets add up; the limit is clipped to what is left of the parent
    /// window. Asking for an offset at or past the end of a limited parent is
    /// a `RangeError`, never an empty result.
    pub fn narrow(&self, options: &QueryOptions) -> Result<Self> {
        let mut query = self.clone();
        query.conditions.extend(options.conditions.iter().cloned());

        if let Some(fields) = &options.fields {
            query.fields = fields.clone();
        }
        if let Some(order) = &options.order {
            query.order = order.clone();
        }

        let offset = options.offset.unwrap_or(0);
        query.limit = match self.limit {
            Some(parent_limit) => {
                if offset > 0 && offset >= parent_limit {
                    return Err(DbError::RangeError(format!(
                        "offset {} with parent limit {}",
                        offset, parent_limit
                    )));
                }
                let remaining = parent_limit - offset;
                Some(options.limit.map_or(remaining, |limit| limit.min(remaining)))
            }
            None => options.limit,
        };
        query.offset = self.offset + offset;

        Ok(query)
    }

    /// Relative window: `limit` rows starting `offset` rows into this scope.
    pub fn slice(&self, offset: usize, limit: usize) -> Result<Self> {
        self.narrow(&QueryOptions::new().offset(offset).limit(limit))
    }

    /// Same conditions in the opposite order. The window is not adjusted, so
    /// on a windowed query this selects different rows.
    pub fn reverse(&self) -> Self {
        let mut query = self.clone();
        query.order = self.order.iter().map(Order::reversed).collect();
        query
    }

    /// Query used by `reload(options)`: conditions are appended and the
    /// requested fields are added to the current projection.
    pub fn merge_for_reload(&self, options: &QueryOptions) -> Self {
        let mut query = self.clone();
        query.conditions.extend(options.conditions.iter().cloned());
        if let Some(fields) = &options.fields {
            for field in fields {
                if !query.fields.contains(field) {
                    query.fields.push(field.clone());
                }
            }
        }
        query
    }

    /// Query used by `reload_with(other)`: the projection is replaced by
    /// `other`'s and its conditions are appended.
    pub fn replace_fields(&self, other: &Query) -> Self {
        let mut query = self.clone();
        query.fields = other.fields.clone();
        for condition in &other.conditions {
            if !query.conditions.contains(condition) {
                query.conditions.push(condition.clone());
            }
        }
        query
    }

    /// Equality conditions double as default attribute values for resources
    /// built inside this scope.
    pub fn default_attributes(&self) -> Attributes {
        self.conditions
            .iter()
            .filter_map(|condition| match condition {
                Condition::Eq(field, value) => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Evaluates every condition against `row`.
    pub fn matches(&self, row: &Row) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.matches(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Applies order and window to rows that already satisfy the conditions.
    pub fn apply_window(&self, mut rows: Vec<Row>) -> Vec<Row> {
        RowComparator::new(&self.order).sort(&mut rows);
        let iter = rows.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}
