//! Shared arena behind every resource and collection handle.
//!
//! Resources and collections never own each other. Both are `(repository, id)`
//! handles into this arena, and a resource's current collection is stored as a
//! plain `CollectionId`.
//!
//! A collection slot is reclaimed as soon as its last handle drops, which
//! also clears the back-reference of every resource it claimed. Resource
//! slots are swept from [`Repository::all`] once nothing refers to them: no
//! handle, no identity map entry, and no live collection holding or claiming
//! them.

pub mod config;
pub mod identity;

pub use config::RepositoryConfig;
pub use identity::IdentityMap;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use crate::collection::Collection;
use crate::core::{Attributes, Key, Result, Row, Value};
use crate::query::{Query, QueryOptions};
use crate::resource::Resource;
use crate::schema::{Model, ModelRegistry};
use crate::storage::PersistenceGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub(crate) usize);

pub(crate) struct ResourceState {
    pub model: Rc<Model>,
    pub values: Attributes,
    pub loaded: BTreeSet<String>,
    pub dirty: BTreeSet<String>,
    pub new: bool,
    pub destroyed: bool,
    /// Collection currently claiming the resource.
    pub collection: Option<CollectionId>,
}

impl ResourceState {
    pub fn key(&self) -> Key {
        self.model.key_of(&self.values)
    }

    pub fn loaded_attributes(&self) -> Attributes {
        self.values
            .iter()
            .filter(|(name, _)| self.loaded.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn dirty_attributes(&self) -> Attributes {
        self.dirty
            .iter()
            .map(|name| (name.clone(), self.values.get(name).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

pub(crate) struct CollectionState {
    pub model: Rc<Model>,
    pub query: Query,
    /// Prepended before the first load.
    pub head: Vec<ResourceId>,
    /// Appended before the first load.
    pub tail: Vec<ResourceId>,
    pub members: Vec<ResourceId>,
    pub loaded: bool,
    /// Resources whose back-reference points here.
    pub claimed: BTreeSet<ResourceId>,
}

impl CollectionState {
    pub fn new(model: Rc<Model>, query: Query) -> Self {
        Self {
            model,
            query,
            head: Vec::new(),
            tail: Vec::new(),
            members: Vec::new(),
            loaded: false,
            claimed: BTreeSet::new(),
        }
    }

    /// Resources held in memory, in sequence order.
    pub fn sequence(&self) -> Vec<ResourceId> {
        if self.loaded {
            self.members.clone()
        } else {
            self.head.iter().chain(&self.tail).copied().collect()
        }
    }

    pub fn holds(&self, id: ResourceId) -> bool {
        if self.loaded {
            self.members.contains(&id)
        } else {
            self.head.contains(&id) || self.tail.contains(&id)
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.head.is_empty() || !self.tail.is_empty()
    }
}

/// Shared by every handle to one resource. Its weak count in the arena
/// tells the sweep whether a handle is still around.
pub(crate) struct ResourceSlot;

/// Shared by every handle to one collection; dropping the last one
/// releases the arena slot.
pub(crate) struct CollectionSlot {
    repository: Repository,
    id: CollectionId,
}

impl CollectionSlot {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }
}

impl Drop for CollectionSlot {
    fn drop(&mut self) {
        self.repository.release_collection(self.id);
    }
}

struct ResourceEntry {
    state: ResourceState,
    handle: Weak<ResourceSlot>,
    live: bool,
}

struct CollectionEntry {
    state: CollectionState,
    handle: Weak<CollectionSlot>,
}

// Resource sweeps run once the live count doubles, but never below this.
const SWEEP_FLOOR: usize = 64;

struct RepositoryInner {
    config: RepositoryConfig,
    registry: ModelRegistry,
    gateway: Rc<dyn PersistenceGateway>,
    identity: IdentityMap,
    resources: Vec<ResourceEntry>,
    free_resources: Vec<usize>,
    collections: Vec<CollectionEntry>,
    free_collections: Vec<usize>,
    /// Live resources left by the last sweep.
    swept_live: usize,
}

impl RepositoryInner {
    fn alloc_resource(&mut self, state: ResourceState) -> ResourceId {
        let entry = ResourceEntry {
            state,
            handle: Weak::new(),
            live: true,
        };
        match self.free_resources.pop() {
            Some(index) => {
                self.resources[index] = entry;
                ResourceId(index)
            }
            None => {
                self.resources.push(entry);
                ResourceId(self.resources.len() - 1)
            }
        }
    }

    fn alloc_collection(&mut self, state: CollectionState) -> CollectionId {
        let entry = CollectionEntry {
            state,
            handle: Weak::new(),
        };
        match self.free_collections.pop() {
            Some(index) => {
                self.collections[index] = entry;
                CollectionId(index)
            }
            None => {
                self.collections.push(entry);
                CollectionId(self.collections.len() - 1)
            }
        }
    }

    /// Empties the slot of a dropped collection and orphans what it claimed.
    fn free_collection(&mut self, id: CollectionId) {
        let state = &mut self.collections[id.0].state;
        let claimed = std::mem::take(&mut state.claimed);
        state.head = Vec::new();
        state.tail = Vec::new();
        state.members = Vec::new();
        state.loaded = false;

        for resource in claimed {
            let state = &mut self.resources[resource.0].state;
            if state.collection == Some(id) {
                state.collection = None;
            }
        }
        self.free_collections.push(id.0);
        trace!(collection = id.0, "collection released");
    }

    fn live_resources(&self) -> usize {
        self.resources.len() - self.free_resources.len()
    }

    fn maybe_sweep(&mut self) {
        if self.live_resources() >= 2 * self.swept_live.max(SWEEP_FLOOR) {
            self.sweep();
        }
    }

    /// Frees every resource slot that nothing refers to anymore.
    fn sweep(&mut self) {
        let mut reachable = vec![false; self.resources.len()];
        for id in self.identity.ids() {
            reachable[id.0] = true;
        }
        for entry in &self.collections {
            let state = &entry.state;
            for id in state
                .head
                .iter()
                .chain(&state.tail)
                .chain(&state.members)
                .chain(&state.claimed)
            {
                reachable[id.0] = true;
            }
        }

        let mut freed = 0;
        for (index, entry) in self.resources.iter_mut().enumerate() {
            if !entry.live || reachable[index] || entry.handle.strong_count() > 0 {
                continue;
            }
            entry.live = false;
            entry.state.values = Attributes::new();
            entry.state.loaded = BTreeSet::new();
            entry.state.dirty = BTreeSet::new();
            entry.state.collection = None;
            self.free_resources.push(index);
            freed += 1;
        }
        self.swept_live = self.live_resources();
        debug!(freed, live = self.swept_live, "swept resource arena");
    }
}

/// Named repository: model registry, gateway, identity map and the arena.
///
/// Cloning yields another handle to the same repository.
#[derive(Clone)]
pub struct Repository {
    inner: Rc<RefCell<RepositoryInner>>,
    /// Collections dropped while the arena was borrowed, freed on the next
    /// allocation.
    released: Rc<RefCell<Vec<CollectionId>>>,
}

impl Repository {
    pub fn new(config: RepositoryConfig, gateway: Rc<dyn PersistenceGateway>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RepositoryInner {
                config,
                registry: ModelRegistry::new(),
                gateway,
                identity: IdentityMap::new(),
                resources: Vec::new(),
                free_resources: Vec::new(),
                collections: Vec::new(),
                free_collections: Vec::new(),
                swept_live: 0,
            })),
            released: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn config(&self) -> RepositoryConfig {
        self.inner.borrow().config.clone()
    }

    pub fn name(&self) -> String {
        self.inner.borrow().config.name.clone()
    }

    pub fn same(&self, other: &Repository) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Models
    // ========================================================================

    pub fn define(&self, model: Model) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.registry = inner.registry.clone().with_model(model)?;
        Ok(())
    }

    pub fn undefine(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.registry = inner.registry.clone().without_model(name)?;
        Ok(())
    }

    pub fn model(&self, name: &str) -> Result<Rc<Model>> {
        self.inner.borrow().registry.get(name)
    }

    pub fn registry(&self) -> ModelRegistry {
        self.inner.borrow().registry.clone()
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Root collection of `model`, narrowed by `options`.
    ///
    /// Unreferenced resource slots may be swept here.
    pub fn all(&self, model: &str, options: &QueryOptions) -> Result<Collection> {
        let model = self.model(model)?;
        let query = Query::with_options(self.name(), &model, options)?;
        self.drain_released();
        self.inner.borrow_mut().maybe_sweep();
        Ok(self.collection(model, query))
    }

    /// Lazy collection bound to `query`.
    pub fn collection(&self, model: Rc<Model>, query: Query) -> Collection {
        self.alloc_collection(CollectionState::new(model, query))
    }

    pub fn identity_map_len(&self) -> usize {
        self.inner.borrow().identity.len()
    }

    /// Resource slots currently in use.
    pub fn live_resources(&self) -> usize {
        self.inner.borrow().live_resources()
    }

    /// Collection slots currently in use.
    pub fn live_collections(&self) -> usize {
        self.drain_released();
        let inner = self.inner.borrow();
        inner.collections.len() - inner.free_collections.len()
    }

    // ========================================================================
    // Arena access
    // ========================================================================

    pub(crate) fn with_resource<R>(&self, id: ResourceId, f: impl FnOnce(&ResourceState) -> R) -> R {
        f(&self.inner.borrow().resources[id.0].state)
    }

    pub(crate) fn with_resource_mut<R>(
        &self,
        id: ResourceId,
        f: impl FnOnce(&mut ResourceState) -> R,
    ) -> R {
        f(&mut self.inner.borrow_mut().resources[id.0].state)
    }

    pub(crate) fn with_collection<R>(
        &self,
        id: CollectionId,
        f: impl FnOnce(&CollectionState) -> R,
    ) -> R {
        f(&self.inner.borrow().collections[id.0].state)
    }

    pub(crate) fn with_collection_mut<R>(
        &self,
        id: CollectionId,
        f: impl FnOnce(&mut CollectionState) -> R,
    ) -> R {
        f(&mut self.inner.borrow_mut().collections[id.0].state)
    }

    pub(crate) fn alloc_resource(&self, state: ResourceState) -> ResourceId {
        self.inner.borrow_mut().alloc_resource(state)
    }

    /// Handle token for resource `id`, shared with its existing handles.
    pub(crate) fn resource_slot(&self, id: ResourceId) -> Rc<ResourceSlot> {
        let mut inner = self.inner.borrow_mut();
        let entry = &mut inner.resources[id.0];
        if let Some(slot) = entry.handle.upgrade() {
            return slot;
        }
        let slot = Rc::new(ResourceSlot);
        entry.handle = Rc::downgrade(&slot);
        slot
    }

    pub(crate) fn alloc_collection(&self, state: CollectionState) -> Collection {
        self.drain_released();
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_collection(state);
        let slot = Rc::new(CollectionSlot {
            repository: self.clone(),
            id,
        });
        inner.collections[id.0].handle = Rc::downgrade(&slot);
        drop(inner);
        Collection::from_slot(slot)
    }

    /// Live handle to collection `id`, if one still exists.
    pub(crate) fn collection_handle(&self, id: CollectionId) -> Option<Collection> {
        let slot = self.inner.borrow().collections[id.0].handle.upgrade();
        slot.map(Collection::from_slot)
    }

    fn release_collection(&self, id: CollectionId) {
        match self.inner.try_borrow_mut() {
            Ok(mut inner) => inner.free_collection(id),
            Err(_) => self.released.borrow_mut().push(id),
        }
    }

    fn drain_released(&self) {
        let released = std::mem::take(&mut *self.released.borrow_mut());
        if released.is_empty() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        for id in released {
            inner.free_collection(id);
        }
    }

    pub(crate) fn gateway(&self) -> Rc<dyn PersistenceGateway> {
        self.inner.borrow().gateway.clone()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    pub(crate) fn fetch(&self, model: &Model, query: &Query) -> Result<Vec<Row>> {
        let rows = self.gateway().fetch(model, query)?;
        debug!(
            model = model.name(),
            offset = query.offset(),
            limit = ?query.limit(),
            rows = rows.len(),
            "fetched rows"
        );
        Ok(rows)
    }

    pub(crate) fn count(&self, model: &Model, query: &Query) -> Result<usize> {
        let count = self.gateway().count(model, query)?;
        debug!(model = model.name(), count, "counted rows");
        Ok(count)
    }

    /// Fetches `query` and resolves every row to a resource.
    pub(crate) fn load(&self, model: &Rc<Model>, query: &Query, reload: bool) -> Result<Vec<ResourceId>> {
        Ok(self
            .fetch(model, query)?
            .into_iter()
            .map(|row| self.hydrate(model, row, reload))
            .collect())
    }

    /// Resolves `row` through the identity map.
    ///
    /// A regular load only fills in attributes the resource has not loaded
    /// yet. A reload resets the resource to exactly the fetched attributes.
    pub(crate) fn hydrate(&self, model: &Rc<Model>, row: Row, reload: bool) -> ResourceId {
        let key = model.key_of(&row);
        let mut inner = self.inner.borrow_mut();
        let existing = if inner.config.identity_map {
            inner.identity.resolve(model.name(), &key)
        } else {
            None
        };

        if let Some(id) = existing {
            Self::merge_row(&mut inner.resources[id.0].state, row, reload);
            return id;
        }

        let id = inner.alloc_resource(ResourceState {
            model: model.clone(),
            loaded: row.keys().cloned().collect(),
            values: row,
            dirty: BTreeSet::new(),
            new: false,
            destroyed: false,
            collection: None,
        });
        if inner.config.identity_map {
            inner.identity.register(model.name(), key, id);
        }
        trace!(model = model.name(), resource = id.0, "resolved new resource");
        id
    }

    /// Fetches `query` and merges its first row into resource `id`,
    /// bypassing the identity map. Returns whether a row was found.
    pub(crate) fn refresh(&self, id: ResourceId, query: &Query, reload: bool) -> Result<bool> {
        let model = self.with_resource(id, |state| state.model.clone());
        let Some(row) = self.fetch(&model, query)?.into_iter().next() else {
            return Ok(false);
        };
        Self::merge_row(&mut self.inner.borrow_mut().resources[id.0].state, row, reload);
        Ok(true)
    }

    fn merge_row(state: &mut ResourceState, row: Row, reload: bool) {
        if reload {
            state.loaded = row.keys().cloned().collect();
            state.values = row;
            state.dirty.clear();
            return;
        }
        for (name, value) in row {
            if !state.loaded.contains(&name) {
                state.loaded.insert(name.clone());
                state.values.insert(name, value);
            }
        }
    }

    pub(crate) fn register_identity(&self, model: &str, key: Key, id: ResourceId) {
        let mut inner = self.inner.borrow_mut();
        if inner.config.identity_map {
            inner.identity.register(model, key, id);
        }
    }

    pub(crate) fn forget_identity(&self, model: &str, key: &Key) {
        self.inner.borrow_mut().identity.forget(model, key);
    }

    // ========================================================================
    // Claim / orphan
    // ========================================================================

    pub(crate) fn claim(&self, id: ResourceId, collection: CollectionId) {
        let mut inner = self.inner.borrow_mut();
        let previous = inner.resources[id.0].state.collection;
        if previous == Some(collection) {
            return;
        }
        if let Some(previous) = previous {
            inner.collections[previous.0].state.claimed.remove(&id);
        }
        trace!(resource = id.0, collection = collection.0, "claim");
        inner.collections[collection.0].state.claimed.insert(id);
        inner.resources[id.0].state.collection = Some(collection);
    }

    /// Clears the back-reference unless the resource is still in `collection`.
    pub(crate) fn orphan(&self, id: ResourceId, collection: CollectionId) {
        let mut inner = self.inner.borrow_mut();
        if inner.collections[collection.0].state.holds(id) {
            return;
        }
        if inner.resources[id.0].state.collection == Some(collection) {
            trace!(resource = id.0, collection = collection.0, "orphan");
            inner.resources[id.0].state.collection = None;
            inner.collections[collection.0].state.claimed.remove(&id);
        }
    }

    /// Every resource whose back-reference points at `collection`.
    pub(crate) fn claimed_by(&self, collection: CollectionId) -> Vec<ResourceId> {
        self.inner.borrow().collections[collection.0]
            .state
            .claimed
            .iter()
            .copied()
            .collect()
    }

    pub(crate) fn resource(&self, id: ResourceId) -> Resource {
        Resource::from_parts(self.clone(), id)
    }
}
