//! Handles to single records living in a repository arena.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use log::warn;
use crate::collection::Collection;
use crate::core::{Attributes, DbError, Key, Result, Value};
use crate::query::{Query, QueryOptions};
use crate::repository::{Repository, ResourceId, ResourceSlot, ResourceState};
use crate::schema::Model;

/// One persisted or pending record.
///
/// `Resource` is a cheap handle; clones refer to the same record. Use
/// [`Resource::same`] for identity and `==` for key-and-attribute equality.
#[derive(Clone)]
pub struct Resource {
    repository: Repository,
    id: ResourceId,
    _slot: Rc<ResourceSlot>,
}

impl Resource {
    pub(crate) fn from_parts(repository: Repository, id: ResourceId) -> Self {
        let slot = repository.resource_slot(id);
        Self {
            repository,
            id,
            _slot: slot,
        }
    }

    /// Allocates an unsaved resource. Declared defaults are applied first,
    /// then `attributes`; every property counts as loaded.
    pub(crate) fn build(
        repository: &Repository,
        model: Rc<Model>,
        attributes: &Attributes,
    ) -> Result<Self> {
        let attributes = model.typecast_attributes(attributes)?;

        let mut values: Attributes = model
            .properties()
            .iter()
            .map(|property| (property.name.clone(), Value::Null))
            .collect();
        values.extend(model.defaults());
        let dirty: BTreeSet<String> = attributes.keys().cloned().collect();
        values.extend(attributes);

        let id = repository.alloc_resource(ResourceState {
            loaded: values.keys().cloned().collect(),
            model,
            values,
            dirty,
            new: true,
            destroyed: false,
            collection: None,
        });
        Ok(Self::from_parts(repository.clone(), id))
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Identity comparison: both handles refer to the same record.
    pub fn same(&self, other: &Resource) -> bool {
        self.repository.same(&other.repository) && self.id == other.id
    }

    pub fn model(&self) -> Rc<Model> {
        self.repository.with_resource(self.id, |state| state.model.clone())
    }

    pub fn key(&self) -> Key {
        self.repository.with_resource(self.id, ResourceState::key)
    }

    pub fn is_new(&self) -> bool {
        self.repository.with_resource(self.id, |state| state.new)
    }

    pub fn is_dirty(&self) -> bool {
        self.repository.with_resource(self.id, |state| !state.dirty.is_empty())
    }

    pub fn is_destroyed(&self) -> bool {
        self.repository.with_resource(self.id, |state| state.destroyed)
    }

    pub fn attribute_loaded(&self, name: &str) -> bool {
        self.repository
            .with_resource(self.id, |state| state.loaded.contains(name))
    }

    /// Loaded value of `name`, without touching the gateway.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.repository.with_resource(self.id, |state| {
            state
                .loaded
                .contains(name)
                .then(|| state.values.get(name).cloned().unwrap_or(Value::Null))
        })
    }

    /// Value of `name`, loading it from storage first if it is lazy and
    /// not loaded yet.
    pub fn get(&self, name: &str) -> Result<Value> {
        let model = self.model();
        model.require_property(name)?;

        if let Some(value) = self.attribute(name) {
            return Ok(value);
        }
        if self.is_new() {
            return Ok(Value::Null);
        }

        let query = self.key_query(&model, [name.to_string()])?;
        self.repository.refresh(self.id, &query, false)?;
        Ok(self.attribute(name).unwrap_or(Value::Null))
    }

    /// Sets `name` after typecasting it to the property type.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = self.model().typecast_attribute(name, &value.into())?;
        self.repository.with_resource_mut(self.id, |state| {
            let changed = !state.loaded.contains(name) || state.values.get(name) != Some(&value);
            if changed {
                state.dirty.insert(name.to_string());
                state.loaded.insert(name.to_string());
                state.values.insert(name.to_string(), value);
            }
        });
        Ok(())
    }

    /// Every loaded attribute.
    pub fn attributes(&self) -> Attributes {
        self.repository
            .with_resource(self.id, ResourceState::loaded_attributes)
    }

    pub fn dirty_attributes(&self) -> Attributes {
        self.repository
            .with_resource(self.id, ResourceState::dirty_attributes)
    }

    /// The collection currently claiming this resource.
    pub fn collection(&self) -> Option<Collection> {
        self.repository
            .with_resource(self.id, |state| state.collection)
            .and_then(|id| self.repository.collection_handle(id))
    }

    /// Property constraint violations over the loaded attributes.
    pub fn errors(&self) -> Vec<String> {
        self.repository.with_resource(self.id, |state| {
            state
                .model
                .properties()
                .iter()
                .filter(|property| state.loaded.contains(&property.name))
                .filter_map(|property| {
                    let value = state.values.get(&property.name).unwrap_or(&Value::Null);
                    property.validate(value).err()
                })
                .collect()
        })
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Validates, then creates or updates the record. Returns `false` when
    /// validation or the gateway rejects it; the resource is left as it was.
    pub fn save(&self) -> Result<bool> {
        self.persist(true)
    }

    /// Like [`save`](Self::save) without running validation.
    pub fn save_unchecked(&self) -> Result<bool> {
        self.persist(false)
    }

    pub fn update(&self, attributes: &Attributes) -> Result<bool> {
        self.assign(attributes)?;
        self.save()
    }

    pub fn update_unchecked(&self, attributes: &Attributes) -> Result<bool> {
        self.assign(attributes)?;
        self.save_unchecked()
    }

    /// Deletes the record and forgets it in the identity map, unsaved
    /// changes included. Unsaved resources are only marked destroyed.
    pub fn destroy(&self) -> Result<bool> {
        let (model, key, new, destroyed) = self.repository.with_resource(self.id, |state| {
            (state.model.clone(), state.key(), state.new, state.destroyed)
        });
        if destroyed {
            return Ok(true);
        }

        if !new {
            match self.repository.gateway().persist_delete(&model, &key) {
                Ok(()) => self.repository.forget_identity(model.name(), &key),
                Err(err) if err.is_persistence_failure() => {
                    warn!("Failed to destroy {} {}: {}", model.name(), key, err);
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        }

        self.repository
            .with_resource_mut(self.id, |state| state.destroyed = true);
        Ok(true)
    }

    /// `destroy!`. Resources carry no destroy-time checks, so this deletes
    /// exactly like [`destroy`](Self::destroy).
    pub fn destroy_unchecked(&self) -> Result<bool> {
        self.destroy()
    }

    /// Re-reads every loaded attribute, discarding unsaved changes.
    pub fn reload(&self) -> Result<()> {
        if self.is_new() {
            return Ok(());
        }
        let model = self.model();
        let fields: Vec<String> = self
            .repository
            .with_resource(self.id, |state| state.loaded.iter().cloned().collect());
        let query = self.key_query(&model, fields)?;
        self.repository.refresh(self.id, &query, true)?;
        Ok(())
    }

    /// `#<Article id=1 title="Sample Article">`
    pub fn inspect(&self) -> String {
        self.repository.with_resource(self.id, |state| {
            let parts: Vec<String> = state
                .model
                .properties()
                .iter()
                .filter(|property| property.key || state.loaded.contains(&property.name))
                .map(|property| {
                    let value = state.values.get(&property.name).unwrap_or(&Value::Null);
                    format!("{}={}", property.name, value.inspect())
                })
                .collect();
            format!("#<{} {}>", state.model.name(), parts.join(" "))
        })
    }

    fn assign(&self, attributes: &Attributes) -> Result<()> {
        for (name, value) in attributes {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    fn persist(&self, validate: bool) -> Result<bool> {
        let (model, new, destroyed) = self.repository.with_resource(self.id, |state| {
            (state.model.clone(), state.new, state.destroyed)
        });
        if destroyed {
            warn!("Cannot save destroyed {} {}", model.name(), self.key());
            return Ok(false);
        }

        if validate {
            let errors = self.errors();
            if !errors.is_empty() {
                let err = DbError::ValidationFailed {
                    model: model.name().to_string(),
                    errors,
                };
                warn!("{}", err);
                return Ok(false);
            }
        }

        let gateway = self.repository.gateway();
        if new {
            let attributes = self.repository.with_resource(self.id, |state| state.values.clone());
            let key = match gateway.persist_create(&model, &attributes) {
                Ok(key) => key,
                Err(err) if err.is_persistence_failure() => {
                    warn!("Failed to create {}: {}", model.name(), err);
                    return Ok(false);
                }
                Err(err) => return Err(err),
            };

            self.repository.with_resource_mut(self.id, |state| {
                for (field, value) in model.key_fields().into_iter().zip(key.values()) {
                    state.loaded.insert(field.clone());
                    state.values.insert(field, value.clone());
                }
                state.new = false;
                state.dirty.clear();
            });
            self.repository.register_identity(model.name(), key, self.id);
            return Ok(true);
        }

        let (key, changed) = self.repository.with_resource(self.id, |state| {
            (state.key(), state.dirty_attributes())
        });
        if changed.is_empty() {
            return Ok(true);
        }
        match gateway.persist_update(&model, &key, &changed) {
            Ok(()) => {
                self.repository
                    .with_resource_mut(self.id, |state| state.dirty.clear());
                Ok(true)
            }
            Err(err) if err.is_persistence_failure() => {
                warn!("Failed to update {} {}: {}", model.name(), key, err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Query selecting this record only, projecting `fields`.
    fn key_query(
        &self,
        model: &Model,
        fields: impl IntoIterator<Item = String>,
    ) -> Result<Query> {
        let options = model
            .key_fields()
            .into_iter()
            .zip(self.key().0)
            .fold(QueryOptions::new(), |options, (field, value)| options.eq(field, value))
            .fields(fields);
        Query::with_options(self.repository.name(), model, &options)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        if self.same(other) {
            return true;
        }
        if !self.repository.same(&other.repository) {
            return false;
        }

        let (model, key, attributes) = self.repository.with_resource(self.id, |state| {
            (state.model.name().to_string(), state.key(), state.loaded_attributes())
        });
        let (other_model, other_key, other_attributes) =
            other.repository.with_resource(other.id, |state| {
                (state.model.name().to_string(), state.key(), state.loaded_attributes())
            });

        model == other_model
            && key == other_key
            && attributes
                .iter()
                .all(|(name, value)| other_attributes.get(name).is_none_or(|other| other == value))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}
