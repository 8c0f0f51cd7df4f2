use log::warn;
use crate::core::{Attributes, Result};
use crate::query::{Query, QueryOptions};
use crate::resource::Resource;
use super::Collection;

impl Collection {
    /// Unsaved resource seeded with the scope's equality conditions, then
    /// `attributes`. Not added to the collection.
    pub(crate) fn build_resource(&self, attributes: &Attributes) -> Result<Resource> {
        let mut seeded = self.query().default_attributes();
        seeded.extend(attributes.iter().map(|(name, value)| (name.clone(), value.clone())));
        Resource::build(&self.repository, self.model(), &seeded)
    }

    /// Builds an unsaved resource and appends it.
    pub fn new_resource(&self, attributes: &Attributes) -> Result<Resource> {
        let resource = self.build_resource(attributes)?;
        self.push([resource.clone()])?;
        Ok(resource)
    }

    /// Builds and saves a resource. It is appended only when the save
    /// succeeds; otherwise it is returned unsaved.
    pub fn create(&self, attributes: &Attributes) -> Result<Resource> {
        let resource = self.build_resource(attributes)?;
        if resource.save()? {
            self.push([resource.clone()])?;
        }
        Ok(resource)
    }

    /// First resource matching `conditions`, or a new one built from
    /// `conditions` merged with `attributes` (attributes win).
    pub fn first_or_new(&self, conditions: &Attributes, attributes: &Attributes) -> Result<Resource> {
        if let Some(found) = self.first_matching(&QueryOptions::from(conditions.clone()))? {
            return Ok(found);
        }
        self.new_resource(&merge(conditions, attributes))
    }

    /// Like [`first_or_new`](Self::first_or_new), saving the new resource.
    pub fn first_or_create(&self, conditions: &Attributes, attributes: &Attributes) -> Result<Resource> {
        if let Some(found) = self.first_matching(&QueryOptions::from(conditions.clone()))? {
            return Ok(found);
        }
        self.create(&merge(conditions, attributes))
    }

    /// Applies `attributes` (restricted to `allowed` when it is not empty)
    /// to every member and saves each one. Resources saved before a failure
    /// keep their changes.
    pub fn update(&self, attributes: &Attributes, allowed: &[&str]) -> Result<bool> {
        self.update_members(attributes, allowed, true)
    }

    /// `update!`: like [`update`](Self::update) without validation.
    pub fn update_unchecked(&self, attributes: &Attributes, allowed: &[&str]) -> Result<bool> {
        self.update_members(attributes, allowed, false)
    }

    fn update_members(&self, attributes: &Attributes, allowed: &[&str], validate: bool) -> Result<bool> {
        let model = self.model();
        let attributes: Attributes = model
            .typecast_attributes(attributes)?
            .into_iter()
            .filter(|(name, _)| allowed.is_empty() || allowed.contains(&name.as_str()))
            .collect();
        if attributes.is_empty() {
            return Ok(true);
        }

        let mut success = true;
        for resource in self.entries()? {
            let saved = if validate {
                resource.update(&attributes)?
            } else {
                resource.update_unchecked(&attributes)?
            };
            if !saved {
                warn!("Bulk update skipped {}", resource.inspect());
                success = false;
            }
        }
        Ok(success)
    }

    /// Destroys every member, then removes and orphans the destroyed ones.
    /// Unsaved changes on a member do not prevent its deletion.
    pub fn destroy(&self) -> Result<bool> {
        let mut success = true;
        let mut destroyed = Vec::new();
        for resource in self.entries()? {
            if resource.destroy()? {
                destroyed.push(resource);
            } else {
                warn!("Bulk destroy skipped {}", resource.inspect());
                success = false;
            }
        }

        for resource in &destroyed {
            self.delete(resource)?;
        }
        Ok(success)
    }

    /// `destroy!`: same as [`destroy`](Self::destroy).
    pub fn destroy_unchecked(&self) -> Result<bool> {
        self.destroy()
    }

    /// Saves every member this collection still claims. Resources released
    /// by `replace` or `clear` are left to their current owner.
    pub fn save(&self) -> Result<bool> {
        let mut success = true;
        for id in self.sequence() {
            let resource = self.handle(id);
            if !resource.collection().is_some_and(|owner| owner.same(self)) {
                continue;
            }
            if !resource.save()? {
                warn!("Bulk save skipped {}", resource.inspect());
                success = false;
            }
        }
        Ok(success)
    }

    /// Re-fetches the scope with `options` merged in (fields are added to
    /// the current projection), replacing the sequence and the attribute
    /// state of every fetched resource.
    pub fn reload(&self, options: &QueryOptions) -> Result<&Self> {
        let model = self.model();
        let query = self.query().merge_for_reload(&options.resolve(&model)?);
        self.reload_query(query)
    }

    /// Like [`reload`](Self::reload), projecting exactly `other`'s fields.
    /// Attributes outside that projection become unloaded.
    pub fn reload_with(&self, other: &Query) -> Result<&Self> {
        self.reload_query(self.query().replace_fields(other))
    }

    fn reload_query(&self, query: Query) -> Result<&Self> {
        let model = self.model();
        let fetched = self.repository.load(&model, &query, true)?;

        let released = self.repository.claimed_by(self.id);
        self.repository.with_collection_mut(self.id, |state| {
            state.query = query;
            state.head.clear();
            state.tail.clear();
            state.members = fetched.clone();
            state.loaded = true;
        });
        for id in released {
            self.repository.orphan(id, self.id);
        }
        for id in fetched {
            self.repository.claim(id, self.id);
        }
        Ok(self)
    }
}

fn merge(conditions: &Attributes, attributes: &Attributes) -> Attributes {
    let mut merged = conditions.clone();
    merged.extend(attributes.iter().map(|(name, value)| (name.clone(), value.clone())));
    merged
}
