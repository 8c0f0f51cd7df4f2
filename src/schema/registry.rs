use std::collections::HashMap;
use std::rc::Rc;
use crate::core::{DbError, Result};
use super::Model;

/// Catalogue of declared models.
///
/// Copy-on-write: `with_model` / `without_model` return a new registry and
/// leave the old one untouched, so a snapshot taken before a test defines
/// models stays valid after it.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: Rc<HashMap<String, Rc<Model>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, model: Model) -> Result<Self> {
        let name = model.name().to_string();
        if self.models.contains_key(&name) {
            return Err(DbError::ModelExists(name));
        }

        let mut models = (*self.models).clone();
        models.insert(name, Rc::new(model));
        Ok(Self {
            models: Rc::new(models),
        })
    }

    pub fn without_model(self, name: &str) -> Result<Self> {
        if !self.models.contains_key(name) {
            return Err(DbError::ModelNotFound(name.to_string()));
        }

        let mut models = (*self.models).clone();
        models.remove(name);
        Ok(Self {
            models: Rc::new(models),
        })
    }

    pub fn get(&self, name: &str) -> Result<Rc<Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::ModelNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }
}
