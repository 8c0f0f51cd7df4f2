use std::cmp::Ordering;
use crate::core::{Attributes, DbError, Result};
use crate::repository::ResourceId;
use crate::resource::Resource;
use super::slice::normalize_index;
use super::{Collection, SliceSpec};

/// Element accepted by [`Collection::replace`].
#[derive(Debug, Clone)]
pub enum Entry {
    Resource(Resource),
    /// Built into a new unsaved resource seeded with the scope's defaults.
    Attributes(Attributes),
}

impl From<Resource> for Entry {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<Attributes> for Entry {
    fn from(attributes: Attributes) -> Self {
        Self::Attributes(attributes)
    }
}

impl Collection {
    /// Checks that every resource belongs to this collection's repository
    /// and model.
    fn adopt(&self, resources: impl IntoIterator<Item = Resource>) -> Result<Vec<ResourceId>> {
        let model = self.model();
        resources
            .into_iter()
            .map(|resource| {
                if !resource.repository().same(&self.repository) {
                    return Err(DbError::TypeMismatch(format!(
                        "{} belongs to another repository",
                        resource.inspect()
                    )));
                }
                if resource.model().name() != model.name() {
                    return Err(DbError::TypeMismatch(format!(
                        "cannot add {} to a collection of {}",
                        resource.model().name(),
                        model.name()
                    )));
                }
                Ok(resource.id())
            })
            .collect()
    }

    /// Orphans `removed` (unless still held) and claims `added`.
    fn rebind(&self, removed: &[ResourceId], added: &[ResourceId]) {
        for id in removed {
            self.repository.orphan(*id, self.id);
        }
        for id in added {
            self.repository.claim(*id, self.id);
        }
    }

    fn write_members(&self, members: Vec<ResourceId>) {
        self.repository.with_collection_mut(self.id, |state| {
            state.head.clear();
            state.tail.clear();
            state.members = members;
            state.loaded = true;
        });
    }

    /// Resources that must be released when the sequence is replaced
    /// wholesale, including fetched-but-unloaded ones.
    fn current_claims(&self) -> Vec<ResourceId> {
        let mut claimed = self.repository.claimed_by(self.id);
        for id in self.sequence() {
            if !claimed.contains(&id) {
                claimed.push(id);
            }
        }
        claimed
    }

    fn handle_of(&self, id: Option<ResourceId>) -> Option<Resource> {
        id.map(|id| self.handle(id))
    }

    // ========================================================================
    // Appending and inserting
    // ========================================================================

    /// Appends `resources` and claims them.
    pub fn push(&self, resources: impl IntoIterator<Item = Resource>) -> Result<&Self> {
        let ids = self.adopt(resources)?;
        self.repository.with_collection_mut(self.id, |state| {
            if state.loaded {
                state.members.extend(&ids);
            } else {
                state.tail.extend(&ids);
            }
        });
        self.rebind(&[], &ids);
        Ok(self)
    }

    /// `<<`
    pub fn add(&self, resource: Resource) -> Result<&Self> {
        self.push([resource])
    }

    pub fn concat(&self, resources: impl IntoIterator<Item = Resource>) -> Result<&Self> {
        self.push(resources)
    }

    /// Prepends `resources`, keeping their order, and claims them.
    pub fn unshift(&self, resources: impl IntoIterator<Item = Resource>) -> Result<&Self> {
        let ids = self.adopt(resources)?;
        self.repository.with_collection_mut(self.id, |state| {
            let target = if state.loaded {
                &mut state.members
            } else {
                &mut state.head
            };
            target.splice(0..0, ids.iter().copied());
        });
        self.rebind(&[], &ids);
        Ok(self)
    }

    /// Inserts before `index`. Negative indices count from the end, so `-1`
    /// appends.
    pub fn insert(&self, index: isize, resources: impl IntoIterator<Item = Resource>) -> Result<&Self> {
        let ids = self.adopt(resources)?;
        let mut members = self.members()?;
        let len = members.len();

        let position = if index >= 0 {
            Some(index as usize).filter(|position| *position <= len)
        } else {
            (len + 1).checked_sub(index.unsigned_abs())
        };
        let position = position.ok_or_else(|| {
            DbError::RangeError(format!("index {} for {} members", index, len))
        })?;

        members.splice(position..position, ids.iter().copied());
        self.write_members(members);
        self.rebind(&[], &ids);
        Ok(self)
    }

    // ========================================================================
    // Removing
    // ========================================================================

    /// Removes and returns the last member. Pending appends are popped
    /// without loading.
    pub fn pop(&self) -> Result<Option<Resource>> {
        let pending = self.repository.with_collection_mut(self.id, |state| {
            if state.loaded { None } else { state.tail.pop() }
        });
        let removed = match pending {
            Some(id) => Some(id),
            None => {
                self.lazy_load()?;
                self.repository
                    .with_collection_mut(self.id, |state| state.members.pop())
            }
        };
        if let Some(id) = removed {
            self.rebind(&[id], &[]);
        }
        Ok(self.handle_of(removed))
    }

    /// Removes and returns the first member. Pending prepends are shifted
    /// without loading.
    pub fn shift(&self) -> Result<Option<Resource>> {
        let pending = self.repository.with_collection_mut(self.id, |state| {
            if state.loaded || state.head.is_empty() {
                None
            } else {
                Some(state.head.remove(0))
            }
        });
        let removed = match pending {
            Some(id) => Some(id),
            None => {
                self.lazy_load()?;
                self.repository.with_collection_mut(self.id, |state| {
                    (!state.members.is_empty()).then(|| state.members.remove(0))
                })
            }
        };
        if let Some(id) = removed {
            self.rebind(&[id], &[]);
        }
        Ok(self.handle_of(removed))
    }

    /// Removes the first member equal to `resource`.
    pub fn delete(&self, resource: &Resource) -> Result<Option<Resource>> {
        let mut members = self.members()?;
        let position = members
            .iter()
            .position(|id| *id == resource.id())
            .or_else(|| members.iter().position(|id| self.handle(*id) == *resource));

        let Some(position) = position else {
            return Ok(None);
        };
        let removed = members.remove(position);
        self.write_members(members);
        self.rebind(&[removed], &[]);
        Ok(Some(self.handle(removed)))
    }

    pub fn delete_at(&self, index: isize) -> Result<Option<Resource>> {
        let mut members = self.members()?;
        let Some(position) = normalize_index(index, members.len()) else {
            return Ok(None);
        };
        let removed = members.remove(position);
        self.write_members(members);
        self.rebind(&[removed], &[]);
        Ok(Some(self.handle(removed)))
    }

    fn remove_where(&self, mut predicate: impl FnMut(&Resource) -> bool) -> Result<Vec<ResourceId>> {
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for id in self.members()? {
            if predicate(&self.handle(id)) {
                removed.push(id);
            } else {
                kept.push(id);
            }
        }
        if !removed.is_empty() {
            self.write_members(kept);
            self.rebind(&removed, &[]);
        }
        Ok(removed)
    }

    /// Removes every member matching `predicate`. Always returns `self`.
    pub fn delete_if(&self, predicate: impl FnMut(&Resource) -> bool) -> Result<&Self> {
        self.remove_where(predicate)?;
        Ok(self)
    }

    /// Removes every member matching `predicate`. Returns `None` when
    /// nothing was removed.
    pub fn reject(&self, predicate: impl FnMut(&Resource) -> bool) -> Result<Option<&Self>> {
        let removed = self.remove_where(predicate)?;
        Ok((!removed.is_empty()).then_some(self))
    }

    /// Empties the collection without fetching and orphans everything it
    /// claimed.
    pub fn clear(&self) -> &Self {
        let released = self.current_claims();
        self.write_members(Vec::new());
        self.rebind(&released, &[]);
        self
    }

    /// Removes the sub-range and returns it as a detached collection, or
    /// `None` when the range starts past the end.
    pub fn slice_remove(&self, spec: impl Into<SliceSpec>) -> Result<Option<Collection>> {
        let mut members = self.members()?;
        let Some(range) = spec.into().resolve(members.len()) else {
            return Ok(None);
        };

        let query = self.query();
        let window = query.slice(range.start, range.len()).unwrap_or(query);
        let removed: Vec<ResourceId> = members.drain(range).collect();
        self.write_members(members);
        self.rebind(&removed, &[]);
        Ok(Some(self.detach(window, removed)))
    }

    // ========================================================================
    // Replacing
    // ========================================================================

    /// `collect!` / `map!`: replaces every member with `f(member)`.
    pub fn map_in_place(&self, mut f: impl FnMut(&Resource) -> Resource) -> Result<&Self> {
        let previous = self.members()?;
        let mapped: Vec<Resource> = previous.iter().map(|id| f(&self.handle(*id))).collect();
        let ids = self.adopt(mapped)?;

        self.write_members(ids.clone());
        self.rebind(&previous, &ids);
        Ok(self)
    }

    /// Replaces the whole sequence without fetching. Attribute entries are
    /// built into new resources seeded with the scope's defaults.
    pub fn replace<E: Into<Entry>>(&self, entries: impl IntoIterator<Item = E>) -> Result<&Self> {
        let mut resources = Vec::new();
        for entry in entries {
            resources.push(match entry.into() {
                Entry::Resource(resource) => resource,
                Entry::Attributes(attributes) => self.build_resource(&attributes)?,
            });
        }
        let ids = self.adopt(resources)?;

        let released = self.current_claims();
        self.write_members(ids.clone());
        self.rebind(&released, &ids);
        Ok(self)
    }

    /// `[index] = resource`. Returns the assigned resource.
    pub fn set(&self, index: isize, resource: Resource) -> Result<Resource> {
        let id = self.adopt([resource.clone()])?[0];
        let mut members = self.members()?;
        let len = members.len();

        let removed = if index >= 0 && index as usize == len {
            members.push(id);
            None
        } else {
            let position = normalize_index(index, len).ok_or_else(|| {
                DbError::RangeError(format!("index {} for {} members", index, len))
            })?;
            Some(std::mem::replace(&mut members[position], id))
        };

        self.write_members(members);
        self.rebind(removed.as_slice(), &[id]);
        Ok(resource)
    }

    /// `[start, length] = resource` / `[range] = resource`. Returns the
    /// assigned resource.
    pub fn splice(&self, spec: impl Into<SliceSpec>, resource: Resource) -> Result<Resource> {
        let spec = spec.into();
        let id = self.adopt([resource.clone()])?[0];
        let mut members = self.members()?;
        let range = spec.resolve(members.len()).ok_or_else(|| {
            DbError::RangeError(format!("index {} for {} members", spec.start, members.len()))
        })?;

        let removed: Vec<ResourceId> = members.splice(range, [id]).collect();
        self.write_members(members);
        self.rebind(&removed, &[id]);
        Ok(resource)
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Sorts members by key.
    pub fn sort(&self) -> Result<&Self> {
        self.sort_by(|left, right| {
            let (left, right) = (left.key(), right.key());
            left.values()
                .iter()
                .zip(right.values())
                .map(|(a, b)| a.sort_cmp(b))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
    }

    pub fn sort_by(&self, mut compare: impl FnMut(&Resource, &Resource) -> Ordering) -> Result<&Self> {
        let mut resources = self.entries()?;
        resources.sort_by(|left, right| compare(left, right));
        self.write_members(resources.iter().map(Resource::id).collect());
        Ok(self)
    }
}
