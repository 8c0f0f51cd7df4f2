use crate::core::{DbError, Result, Value};
use crate::query::{Query, QueryOptions};
use crate::schema::{Delegate, Model, Relationship};
use super::Collection;

/// Result of a delegated call.
#[derive(Debug, Clone)]
pub enum Delegated {
    /// Returned by a model-level method.
    Value(Value),
    /// Relationship scoped to the collection's members.
    Collection(Collection),
}

impl Delegated {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Collection(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            Self::Value(_) => None,
        }
    }
}

/// Operations a collection implements itself.
const PRIMITIVES: &[&str] = &[
    "add", "all", "at", "clear", "concat", "contains", "create", "delete", "delete_at",
    "delete_if", "destroy", "destroy_unchecked", "entries", "first", "first_or_create",
    "first_or_new", "get", "get_required", "insert", "inspect", "is_empty", "is_loaded", "last",
    "len", "map_in_place", "new_resource", "pop", "push", "query", "reject", "reload",
    "reload_with", "replace", "reverse", "save", "set", "shift", "slice", "slice_remove", "sort",
    "sort_by", "splice", "unshift", "update", "update_unchecked",
];

impl Collection {
    /// True for collection primitives and for every name in the model's
    /// dispatch table.
    pub fn responds_to(&self, name: &str) -> bool {
        PRIMITIVES.contains(&name) || self.model().delegate(name).is_some()
    }

    /// Calls a model method or evaluates a relationship over every member.
    ///
    /// Relationships come back as lazy collections on the target model,
    /// further narrowed by `options`. Unsaved members take part like any
    /// other member.
    pub fn dispatch(&self, name: &str, options: &QueryOptions) -> Result<Delegated> {
        let model = self.model();
        match model.delegate(name).cloned() {
            Some(Delegate::ModelMethod(method)) => Ok(Delegated::Value(method(&model))),
            Some(Delegate::Relationship(relationship)) => self
                .relationship(&model, name, &relationship, options)
                .map(Delegated::Collection),
            None => Err(DbError::NoSuchMethod {
                model: model.name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn relationship(
        &self,
        model: &Model,
        called: &str,
        name: &str,
        options: &QueryOptions,
    ) -> Result<Collection> {
        let relationship = model.relationship(name).ok_or_else(|| DbError::NoSuchMethod {
            model: model.name().to_string(),
            name: called.to_string(),
        })?;
        let target = self.repository.model(relationship.target())?;
        let members = self.entries()?;

        let (field, mut values) = match relationship {
            Relationship::BelongsTo { child_key, .. } => {
                let mut values = Vec::new();
                for member in &members {
                    let value = member.get(child_key)?;
                    if !value.is_null() {
                        values.push(value);
                    }
                }
                (single_key_field(&target)?, values)
            }
            Relationship::HasMany { child_key, .. } => {
                let mut values = Vec::new();
                for member in members.iter().filter(|member| !member.is_new()) {
                    values.extend(member.key().0.into_iter().take(1));
                }
                single_key_field(model)?;
                (child_key.clone(), values)
            }
        };
        values.sort_by(|a, b| a.sort_cmp(b));
        values.dedup();

        let base = Query::with_options(
            self.repository.name(),
            &target,
            &QueryOptions::new().is_in(field, values),
        )?;
        let query = base.narrow(&options.resolve(&target)?)?;
        Ok(self.repository.collection(target, query))
    }
}

fn single_key_field(model: &Model) -> Result<String> {
    match model.key_fields().as_slice() {
        [field] => Ok(field.clone()),
        _ => Err(DbError::TypeMismatch(format!(
            "relationships need a single-column key on {}",
            model.name()
        ))),
    }
}
