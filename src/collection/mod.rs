//! Lazy, query-scoped sequences of resources.
//!
//! A collection starts unloaded. Resources pushed or unshifted before the
//! first load wait in `tail` / `head` and are merged around the fetched rows
//! when the sequence materialises. Every resource in a collection's sequence
//! is claimed by it; every removed resource is orphaned.

pub mod delegate;
pub mod mutation;
pub mod persistence;
pub mod slice;

pub use delegate::Delegated;
pub use mutation::Entry;
pub use slice::SliceSpec;

use std::fmt;
use std::rc::Rc;
use tracing::debug;
use crate::core::{DbError, Key, Result};
use crate::query::{Condition, Query, QueryOptions};
use crate::repository::{CollectionId, CollectionSlot, CollectionState, Repository, ResourceId};
use crate::resource::Resource;
use crate::schema::Model;
use slice::normalize_index;

/// Handle to a collection in a repository arena. Clones share the same
/// collection; its slot is released when the last clone drops.
#[derive(Clone)]
pub struct Collection {
    repository: Repository,
    id: CollectionId,
    _slot: Rc<CollectionSlot>,
}

impl Collection {
    pub(crate) fn from_slot(slot: Rc<CollectionSlot>) -> Self {
        Self {
            repository: slot.repository().clone(),
            id: slot.id(),
            _slot: slot,
        }
    }

    pub(crate) fn id(&self) -> CollectionId {
        self.id
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Identity comparison.
    pub fn same(&self, other: &Collection) -> bool {
        self.repository.same(&other.repository) && self.id == other.id
    }

    pub fn model(&self) -> Rc<Model> {
        self.repository.with_collection(self.id, |state| state.model.clone())
    }

    pub fn query(&self) -> Query {
        self.repository.with_collection(self.id, |state| state.query.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.repository.with_collection(self.id, |state| state.loaded)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn partial_loading(&self) -> bool {
        self.repository.config().partial_loading
    }

    fn has_pending(&self) -> bool {
        self.repository.with_collection(self.id, CollectionState::has_pending)
    }

    /// In-memory sequence without triggering a load.
    pub(crate) fn sequence(&self) -> Vec<ResourceId> {
        self.repository.with_collection(self.id, CollectionState::sequence)
    }

    pub(crate) fn members(&self) -> Result<Vec<ResourceId>> {
        self.lazy_load()?;
        Ok(self.repository.with_collection(self.id, |state| state.members.clone()))
    }

    pub(crate) fn handle(&self, id: ResourceId) -> Resource {
        self.repository.resource(id)
    }

    fn handles(&self, ids: impl IntoIterator<Item = ResourceId>) -> Vec<Resource> {
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    fn claim(&self, id: ResourceId) -> Resource {
        self.repository.claim(id, self.id);
        self.handle(id)
    }

    /// Materialises the sequence once: pending head, fetched rows that are
    /// not pending already, pending tail.
    pub(crate) fn lazy_load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let (model, query) = self
            .repository
            .with_collection(self.id, |state| (state.model.clone(), state.query.clone()));
        let fetched = self.repository.load(&model, &query, false)?;

        let fetched = self.repository.with_collection_mut(self.id, |state| {
            let fetched: Vec<ResourceId> = fetched
                .into_iter()
                .filter(|id| !state.head.contains(id) && !state.tail.contains(id))
                .collect();
            let mut members = std::mem::take(&mut state.head);
            members.extend(&fetched);
            members.append(&mut state.tail);
            state.members = members;
            state.loaded = true;
            fetched
        });
        for id in &fetched {
            self.repository.claim(*id, self.id);
        }

        debug!(
            model = model.name(),
            collection = self.id.0,
            fetched = fetched.len(),
            "collection loaded"
        );
        Ok(())
    }

    /// Loaded collection over `members`, claiming each of them.
    pub(crate) fn detach(&self, query: Query, members: Vec<ResourceId>) -> Collection {
        let mut state = CollectionState::new(self.model(), query);
        state.members = members.clone();
        state.loaded = true;

        let detached = self.repository.alloc_collection(state);
        for member in members {
            self.repository.claim(member, detached.id);
        }
        detached
    }

    /// Rows `offset..offset + limit` of `query`; nothing when the window is
    /// out of range.
    fn fetch_window(&self, query: &Query, offset: usize, limit: usize) -> Result<Vec<ResourceId>> {
        let window = match query.slice(offset, limit) {
            Ok(window) => window,
            Err(DbError::RangeError(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        self.repository.load(&self.model(), &window, false)
    }

    /// Forward window over the `limit` rows ending `skip` rows before the
    /// end of `query`. The offset is taken from a row count, so the window
    /// stays valid for later reloads.
    fn tail_window(&self, query: &Query, skip: usize, limit: usize) -> Result<Query> {
        let total = self.repository.count(&self.model(), query)?;
        let end = total.saturating_sub(skip);
        let start = end.saturating_sub(limit);
        if start == end {
            return query.slice(0, 0);
        }
        query.slice(start, end - start)
    }

    /// The `limit` rows ending `skip` rows before the end of `query`, in
    /// query order.
    fn fetch_tail(&self, query: &Query, skip: usize, limit: usize) -> Result<Vec<ResourceId>> {
        let window = self.tail_window(query, skip, limit)?;
        self.repository.load(&self.model(), &window, false)
    }

    /// Whether options can be answered from loaded members: plain
    /// conditions only. Raw fragments may name lazy properties the members
    /// have not loaded, so they always go to the gateway.
    fn filters_in_memory(&self, options: &QueryOptions) -> bool {
        self.is_loaded()
            && options.fields.is_none()
            && options.order.is_none()
            && options.limit.is_none()
            && options.offset.is_none()
            && !options
                .conditions
                .iter()
                .any(|condition| matches!(condition, Condition::Raw { .. }))
    }

    fn matching_members(&self, conditions: &[Condition]) -> Result<Vec<ResourceId>> {
        let mut matching = Vec::new();
        for id in self.members()? {
            let resource = self.handle(id);
            let mut row = resource.attributes();
            let mut matches = true;
            for condition in conditions {
                if let Some(field) = condition.field()
                    && !row.contains_key(field)
                {
                    row.insert(field.to_string(), resource.get(field)?);
                }
                if !condition.matches(&row)? {
                    matches = false;
                    break;
                }
            }
            if matches {
                matching.push(id);
            }
        }
        Ok(matching)
    }

    fn find_in_memory(&self, key: &Key) -> Option<ResourceId> {
        self.sequence()
            .into_iter()
            .find(|id| self.repository.with_resource(*id, |state| state.key() == *key))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every member, loading the collection first.
    pub fn entries(&self) -> Result<Vec<Resource>> {
        Ok(self.handles(self.members()?))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.members()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, resource: &Resource) -> Result<bool> {
        Ok(self.entries()?.iter().any(|member| member == resource))
    }

    /// `self` when `options` is empty, otherwise a new lazy collection
    /// bound to the narrowed query.
    pub fn all(&self, options: &QueryOptions) -> Result<Collection> {
        if options.is_empty() {
            return Ok(self.clone());
        }
        let model = self.model();
        let query = self.query().narrow(&options.resolve(&model)?)?;
        Ok(self.repository.collection(model, query))
    }

    /// Resource at `index` (negative counts from the end), related to this
    /// collection. Reads a single row when the collection is not loaded.
    pub fn at(&self, index: isize) -> Result<Option<Resource>> {
        if !self.is_loaded() && self.partial_loading() {
            let (head, tail) = self
                .repository
                .with_collection(self.id, |state| (state.head.clone(), state.tail.clone()));

            if index >= 0 && (index as usize) < head.len() {
                return Ok(Some(self.claim(head[index as usize])));
            }
            if index < 0 && index.unsigned_abs() <= tail.len() {
                return Ok(Some(self.claim(tail[tail.len() - index.unsigned_abs()])));
            }
            if head.is_empty() && tail.is_empty() {
                let query = self.query();
                let found = if index >= 0 {
                    self.fetch_window(&query, index as usize, 1)?
                } else {
                    self.fetch_tail(&query, index.unsigned_abs() - 1, 1)?
                };
                return Ok(found.first().map(|id| self.claim(*id)));
            }
        }

        let members = self.members()?;
        Ok(normalize_index(index, members.len()).map(|position| self.claim(members[position])))
    }

    pub fn first(&self) -> Result<Option<Resource>> {
        self.at(0)
    }

    pub fn last(&self) -> Result<Option<Resource>> {
        self.at(-1)
    }

    /// Detached collection of the first `n` members, pending ones included.
    pub fn first_n(&self, n: usize) -> Result<Collection> {
        let query = self.query().slice(0, n)?;
        if self.is_loaded() || self.has_pending() || !self.partial_loading() {
            let members = self.members()?;
            let head = members[..n.min(members.len())].to_vec();
            return Ok(self.detach(query, head));
        }
        Ok(self.repository.collection(self.model(), query))
    }

    /// Detached collection of the last `n` members, pending ones included.
    pub fn last_n(&self, n: usize) -> Result<Collection> {
        let query = self.query();
        if self.is_loaded() || self.has_pending() || !self.partial_loading() {
            let members = self.members()?;
            let start = members.len().saturating_sub(n);
            let window = query.slice(start, n).unwrap_or(query);
            return Ok(self.detach(window, members[start..].to_vec()));
        }

        let window = self.tail_window(&query, 0, n)?;
        let found = self.repository.load(&self.model(), &window, false)?;
        Ok(self.detach(window, found))
    }

    /// First resource matching `options`, related to this collection.
    pub fn first_matching(&self, options: &QueryOptions) -> Result<Option<Resource>> {
        let model = self.model();
        let options = options.resolve(&model)?;
        if self.filters_in_memory(&options) {
            let found = self.matching_members(&options.conditions)?;
            return Ok(found.first().map(|id| self.claim(*id)));
        }

        let narrowed = self.query().narrow(&options)?;
        let found = self.fetch_window(&narrowed, 0, 1)?;
        Ok(found.first().map(|id| self.claim(*id)))
    }

    pub fn first_n_matching(&self, n: usize, options: &QueryOptions) -> Result<Collection> {
        let model = self.model();
        let options = options.resolve(&model)?;
        let narrowed = self.query().narrow(&options)?;
        if self.filters_in_memory(&options) {
            let mut found = self.matching_members(&options.conditions)?;
            found.truncate(n);
            return Ok(self.detach(narrowed.slice(0, n)?, found));
        }
        Ok(self.repository.collection(model, narrowed.slice(0, n)?))
    }

    /// Last resource matching `options`, related to this collection.
    pub fn last_matching(&self, options: &QueryOptions) -> Result<Option<Resource>> {
        let model = self.model();
        let options = options.resolve(&model)?;
        if self.filters_in_memory(&options) {
            let found = self.matching_members(&options.conditions)?;
            return Ok(found.last().map(|id| self.claim(*id)));
        }

        let narrowed = self.query().narrow(&options)?;
        let found = self.fetch_tail(&narrowed, 0, 1)?;
        Ok(found.first().map(|id| self.claim(*id)))
    }

    pub fn last_n_matching(&self, n: usize, options: &QueryOptions) -> Result<Collection> {
        let model = self.model();
        let options = options.resolve(&model)?;
        let narrowed = self.query().narrow(&options)?;
        if self.filters_in_memory(&options) {
            let found = self.matching_members(&options.conditions)?;
            let start = found.len().saturating_sub(n);
            let window = narrowed.slice(start, n).unwrap_or(narrowed);
            return Ok(self.detach(window, found[start..].to_vec()));
        }

        let window = self.tail_window(&narrowed, 0, n)?;
        let found = self.repository.load(&model, &window, false)?;
        Ok(self.detach(window, found))
    }

    /// Detached collection over a sub-range, or `None` when the range starts
    /// past the end.
    pub fn slice(&self, spec: impl Into<SliceSpec>) -> Result<Option<Collection>> {
        let members = self.members()?;
        let Some(range) = spec.into().resolve(members.len()) else {
            return Ok(None);
        };

        let query = self.query();
        let window = query.slice(range.start, range.len()).unwrap_or(query);
        Ok(Some(self.detach(window, members[range].to_vec())))
    }

    /// Resource with `key` inside this collection's scope.
    ///
    /// Pending and loaded members are searched first. An unloaded collection
    /// with a limit or offset loads itself so that rows outside its window
    /// are never found; otherwise the key is looked up through the scope.
    /// Blank keys always miss.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Resource>> {
        let model = self.model();
        let key: Key = key.into();
        let Some(key) = model.typecast_key(key.values()) else {
            return Ok(None);
        };

        if let Some(id) = self.find_in_memory(&key) {
            return Ok(Some(self.claim(id)));
        }
        if self.is_loaded() {
            return Ok(None);
        }
        if self.query().is_windowed() || !self.partial_loading() {
            self.lazy_load()?;
            return Ok(self.find_in_memory(&key).map(|id| self.claim(id)));
        }

        let options = model
            .key_fields()
            .into_iter()
            .zip(key.0)
            .fold(QueryOptions::new(), |options, (field, value)| options.eq(field, value));
        self.first_matching(&options)
    }

    /// Like [`get`](Self::get), failing with `NotFound` on a miss.
    pub fn get_required(&self, key: impl Into<Key>) -> Result<Resource> {
        let key: Key = key.into();
        self.get(key.clone())?.ok_or_else(|| DbError::NotFound {
            model: self.model().name().to_string(),
            key,
        })
    }

    /// New collection over the same scope in the opposite order.
    pub fn reverse(&self) -> Result<Collection> {
        let query = self.query();
        if self.is_loaded() || self.has_pending() || query.is_windowed() {
            let mut members = self.members()?;
            members.reverse();
            return Ok(self.detach(query.reverse(), members));
        }
        Ok(self.repository.collection(self.model(), query.reverse()))
    }

    /// `[#<Article id=1 title="Sample Article">, ...]`
    pub fn inspect(&self) -> Result<String> {
        let rendered: Vec<String> = self.entries()?.iter().map(Resource::inspect).collect();
        Ok(format!("[{}]", rendered.join(", ")))
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.repository.with_collection(self.id, |state| {
            f.debug_struct("Collection")
                .field("model", &state.model.name())
                .field("loaded", &state.loaded)
                .field("query", &state.query)
                .finish()
        })
    }
}
