use std::rc::Rc;
use crate::collection::Collection;
use crate::core::{Attributes, Key, Result};
use crate::query::QueryOptions;
use crate::repository::{Repository, RepositoryConfig};
use crate::resource::Resource;
use crate::schema::Model;
use crate::storage::MemoryGateway;

/// Repository wired to an in-process [`MemoryGateway`].
///
/// Each `Database` owns its own registry, identity map and tables, so tests
/// build a fresh one per case.
pub struct Database {
    repository: Repository,
    gateway: MemoryGateway,
}

impl Database {
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        let gateway = MemoryGateway::new();
        let repository = Repository::new(config, Rc::new(gateway.clone()));
        Self {
            repository,
            gateway,
        }
    }

    /// Opens a database from a `memorm://` URL.
    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::with_config(RepositoryConfig::from_url(url)?))
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn gateway(&self) -> &MemoryGateway {
        &self.gateway
    }

    pub fn define(&self, model: Model) -> Result<()> {
        self.repository.define(model)
    }

    pub fn undefine(&self, name: &str) -> Result<()> {
        self.repository.undefine(name)
    }

    /// Lazy collection of `model` narrowed by `options`.
    pub fn all(&self, model: &str, options: &QueryOptions) -> Result<Collection> {
        self.repository.all(model, options)
    }

    pub fn get(&self, model: &str, key: impl Into<Key>) -> Result<Option<Resource>> {
        self.all(model, &QueryOptions::new())?.get(key)
    }

    /// Unsaved resource that belongs to no collection.
    pub fn new_resource(&self, model: &str, attributes: &Attributes) -> Result<Resource> {
        Resource::build(&self.repository, self.repository.model(model)?, attributes)
    }

    /// Builds and saves a resource; it stays unsaved when the save fails.
    pub fn create(&self, model: &str, attributes: &Attributes) -> Result<Resource> {
        let resource = self.new_resource(model, attributes)?;
        resource.save()?;
        Ok(resource)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
