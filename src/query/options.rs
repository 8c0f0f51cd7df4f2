use crate::core::{Attributes, Result, Value};
use crate::schema::Model;
use super::{Condition, Order, RawCondition};

/// Additional constraints applied when narrowing a scope.
///
/// `fields` and `order` replace the parent's when present; conditions are
/// appended; `limit` and `offset` are relative to the parent window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub conditions: Vec<Condition>,
    pub fields: Option<Vec<String>>,
    pub order: Option<Vec<Order>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.fields.is_none()
            && self.order.is_none()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Eq(field.into(), value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Ne(field.into(), value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Gt(field.into(), value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Gte(field.into(), value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Lt(field.into(), value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(Condition::Lte(field.into(), value.into()))
    }

    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.condition(Condition::In(field.into(), values))
    }

    /// Opaque SQL-ish fragment with `?` placeholders, passed to the gateway as is.
    pub fn raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.condition(Condition::Raw {
            sql: sql.into(),
            bindings,
        })
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.get_or_insert_with(Vec::new).push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Checks every referenced field against `model`, typecasts operands, and
    /// makes sure an explicit projection still carries the key.
    pub fn resolve(&self, model: &Model) -> Result<Self> {
        let conditions = self
            .conditions
            .iter()
            .map(|condition| {
                if let Some(field) = condition.field() {
                    model.require_property(field)?;
                }
                if let Condition::Raw { sql, bindings } = condition {
                    RawCondition::parse(sql, bindings)?;
                }
                condition.map_values(|field, value| model.typecast_attribute(field, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let fields = match &self.fields {
            Some(fields) => {
                for field in fields {
                    model.require_property(field)?;
                }
                let mut resolved = model.key_fields();
                for field in fields {
                    if !resolved.contains(field) {
                        resolved.push(field.clone());
                    }
                }
                Some(resolved)
            }
            None => None,
        };

        if let Some(order) = &self.order {
            for directive in order {
                model.require_property(&directive.field)?;
            }
        }

        Ok(Self {
            conditions,
            fields,
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
        })
    }
}

impl From<Attributes> for QueryOptions {
    /// Every attribute becomes an equality condition.
    fn from(attributes: Attributes) -> Self {
        attributes
            .into_iter()
            .fold(Self::new(), |options, (field, value)| options.eq(field, value))
    }
}
