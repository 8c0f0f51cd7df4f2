use std::collections::HashMap;
use std::fmt;
use crate::core::{Attributes, DbError, Key, Result, Value};
use super::Property;

/// A model-level operation reachable through collection delegation.
pub type ModelMethod = fn(&Model) -> Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    /// The owning model stores `child_key` pointing at `target`'s key.
    BelongsTo {
        name: String,
        target: String,
        child_key: String,
    },
    /// `target` rows store `child_key` pointing at the owning model's key.
    HasMany {
        name: String,
        target: String,
        child_key: String,
    },
}

impl Relationship {
    pub fn name(&self) -> &str {
        match self {
            Self::BelongsTo { name, .. } | Self::HasMany { name, .. } => name,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::BelongsTo { target, .. } | Self::HasMany { target, .. } => target,
        }
    }
}

/// Entry of the dispatch table a collection consults for non-primitive calls.
#[derive(Clone)]
pub enum Delegate {
    ModelMethod(ModelMethod),
    Relationship(String),
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelMethod(_) => write!(f, "ModelMethod(..)"),
            Self::Relationship(name) => write!(f, "Relationship({})", name),
        }
    }
}

/// Schema of one entity type: properties in declaration order, relationships,
/// and the delegation table built while the model is declared.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    properties: Vec<Property>,
    relationships: Vec<Relationship>,
    dispatch: HashMap<String, Delegate>,
}

fn base_model(model: &Model) -> Value {
    Value::from(model.name())
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        let mut dispatch = HashMap::new();
        dispatch.insert("base_model".to_string(), Delegate::ModelMethod(base_model));
        Self {
            name: name.into(),
            properties: Vec::new(),
            relationships: Vec::new(),
            dispatch,
        }
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.retain(|existing| existing.name != property.name);
        self.properties.push(property);
        self
    }

    /// Declares `name` (and its plural alias) as a parent relationship whose
    /// key is stored in `child_key` on this model.
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let child_key = child_key.into();
        if self.properties.iter().all(|property| property.name != child_key) {
            self.properties
                .push(Property::new(child_key.clone(), crate::core::DataType::Integer));
        }
        self.dispatch
            .insert(name.clone(), Delegate::Relationship(name.clone()));
        self.dispatch
            .insert(format!("{}s", name), Delegate::Relationship(name.clone()));
        self.relationships.push(Relationship::BelongsTo {
            name,
            target: target.into(),
            child_key,
        });
        self
    }

    pub fn has_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.dispatch
            .insert(name.clone(), Delegate::Relationship(name.clone()));
        self.relationships.push(Relationship::HasMany {
            name,
            target: target.into(),
            child_key: child_key.into(),
        });
        self
    }

    pub fn method(mut self, name: impl Into<String>, method: ModelMethod) -> Self {
        self.dispatch.insert(name.into(), Delegate::ModelMethod(method));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn require_property(&self, name: &str) -> Result<&Property> {
        self.get_property(name)
            .ok_or_else(|| DbError::PropertyNotFound(name.to_string(), self.name.clone()))
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.name() == name)
    }

    pub fn delegate(&self, name: &str) -> Option<&Delegate> {
        self.dispatch.get(name)
    }

    pub fn key_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|property| property.key)
    }

    pub fn key_fields(&self) -> Vec<String> {
        self.key_properties().map(|property| property.name.clone()).collect()
    }

    /// Key tuple read out of `attributes`; missing components are `Null`.
    pub fn key_of(&self, attributes: &Attributes) -> Key {
        Key(self
            .key_properties()
            .map(|property| attributes.get(&property.name).cloned().unwrap_or(Value::Null))
            .collect())
    }

    pub fn serial_property(&self) -> Option<&Property> {
        self.properties.iter().find(|property| property.serial)
    }

    /// Fields fetched when a query names none: keys plus non-lazy properties.
    pub fn default_fields(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|property| property.key || !property.lazy)
            .map(|property| property.name.clone())
            .collect()
    }

    /// Declared default values, used to seed new resources.
    pub fn defaults(&self) -> Attributes {
        self.properties
            .iter()
            .filter_map(|property| {
                property
                    .default
                    .clone()
                    .map(|value| (property.name.clone(), value))
            })
            .collect()
    }

    /// Typecasts caller-supplied key values. Returns `None` when the arity is
    /// wrong or a component is blank or cannot be cast.
    pub fn typecast_key(&self, values: &[Value]) -> Option<Key> {
        let key_properties: Vec<&Property> = self.key_properties().collect();
        if key_properties.len() != values.len() {
            return None;
        }
        let mut typed = Vec::with_capacity(values.len());
        for (property, value) in key_properties.into_iter().zip(values) {
            if value.is_blank() {
                return None;
            }
            typed.push(property.data_type.typecast(value)?);
        }
        Some(Key(typed))
    }

    pub fn typecast_attribute(&self, name: &str, value: &Value) -> Result<Value> {
        let property = self.require_property(name)?;
        property.data_type.typecast(value).ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "{}.{} expects {}, got {}",
                self.name,
                name,
                property.data_type,
                value.inspect()
            ))
        })
    }

    pub fn typecast_attributes(&self, attributes: &Attributes) -> Result<Attributes> {
        attributes
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.typecast_attribute(name, value)?)))
            .collect()
    }

    /// Runs property constraints over a full attribute set.
    pub fn validate(&self, attributes: &Attributes) -> Vec<String> {
        self.properties
            .iter()
            .filter_map(|property| {
                let value = attributes.get(&property.name).unwrap_or(&Value::Null);
                property.validate(value).err()
            })
            .collect()
    }
}
