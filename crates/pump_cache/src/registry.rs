/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Identity registry: one table per entity kind, natural key -> single instance.
//!
//! Keys handed out are `(slot, epoch)` pairs. `reset()` bumps the epoch, so a
//! handle obtained before a reset never aliases an entity created after it.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::activity::Activity;
use crate::collection::Collection;
use crate::object::Object;
use crate::object_list::ObjectList;

macro_rules! entity_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            slot: u32,
            epoch: u32,
        }

        impl $name {
            fn new(slot: u32, epoch: u32) -> Self {
                Self { slot, epoch }
            }
        }
    };
}

entity_key!(
    /// Handle to an Object or Actor.
    ObjectKey
);
entity_key!(
    /// Handle to an Activity.
    ActivityKey
);
entity_key!(
    /// Handle to an ObjectList or ActorList.
    ListKey
);
entity_key!(
    /// Handle to a Collection.
    CollectionKey
);

/// Any cached entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Object(ObjectKey),
    Activity(ActivityKey),
    List(ListKey),
    Collection(CollectionKey),
}

impl From<ObjectKey> for EntityKey {
    fn from(k: ObjectKey) -> Self {
        Self::Object(k)
    }
}

impl From<ActivityKey> for EntityKey {
    fn from(k: ActivityKey) -> Self {
        Self::Activity(k)
    }
}

impl From<ListKey> for EntityKey {
    fn from(k: ListKey) -> Self {
        Self::List(k)
    }
}

impl From<CollectionKey> for EntityKey {
    fn from(k: CollectionKey) -> Self {
        Self::Collection(k)
    }
}

pub(crate) struct Table<T> {
    index: HashMap<String, u32>,
    slots: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
        }
    }
}

impl<T> Table<T> {
    pub(crate) fn slot_of(&self, key: &str) -> Option<u32> {
        self.index.get(key).copied()
    }

    /// Look up or construct. The bool is true when the entity is new.
    pub(crate) fn lookup_or_insert(
        &mut self,
        key: &str,
        make: impl FnOnce(String) -> T,
    ) -> (u32, bool) {
        if let Some(slot) = self.index.get(key) {
            return (*slot, false);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(make(key.to_string()));
        self.index.insert(key.to_string(), slot);
        (slot, true)
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&T> {
        self.slots.get(slot as usize)
    }

    pub(crate) fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.slots.get_mut(slot as usize)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
    }
}

#[derive(Default)]
pub struct Registry {
    epoch: u32,
    pub(crate) objects: Table<Object>,
    pub(crate) activities: Table<Activity>,
    pub(crate) lists: Table<ObjectList>,
    pub(crate) collections: Table<Collection>,
}

impl Registry {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Drops every entity of every kind at once.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.activities.clear();
        self.lists.clear();
        self.collections.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.objects.len() + self.activities.len() + self.lists.len() + self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn object_slot(&self, key: ObjectKey) -> Option<u32> {
        (key.epoch == self.epoch).then_some(key.slot)
    }

    pub(crate) fn activity_slot(&self, key: ActivityKey) -> Option<u32> {
        (key.epoch == self.epoch).then_some(key.slot)
    }

    pub(crate) fn list_slot(&self, key: ListKey) -> Option<u32> {
        (key.epoch == self.epoch).then_some(key.slot)
    }

    pub(crate) fn collection_slot(&self, key: CollectionKey) -> Option<u32> {
        (key.epoch == self.epoch).then_some(key.slot)
    }

    pub fn object(&self, key: ObjectKey) -> Option<&Object> {
        self.objects.get(self.object_slot(key)?)
    }

    pub(crate) fn object_mut(&mut self, key: ObjectKey) -> Option<&mut Object> {
        let slot = self.object_slot(key)?;
        self.objects.get_mut(slot)
    }

    pub fn activity(&self, key: ActivityKey) -> Option<&Activity> {
        self.activities.get(self.activity_slot(key)?)
    }

    pub(crate) fn activity_mut(&mut self, key: ActivityKey) -> Option<&mut Activity> {
        let slot = self.activity_slot(key)?;
        self.activities.get_mut(slot)
    }

    pub fn list(&self, key: ListKey) -> Option<&ObjectList> {
        self.lists.get(self.list_slot(key)?)
    }

    pub(crate) fn list_mut(&mut self, key: ListKey) -> Option<&mut ObjectList> {
        let slot = self.list_slot(key)?;
        self.lists.get_mut(slot)
    }

    pub fn collection(&self, key: CollectionKey) -> Option<&Collection> {
        self.collections.get(self.collection_slot(key)?)
    }

    pub(crate) fn collection_mut(&mut self, key: CollectionKey) -> Option<&mut Collection> {
        let slot = self.collection_slot(key)?;
        self.collections.get_mut(slot)
    }

    pub fn find_object(&self, id: &str) -> Option<ObjectKey> {
        self.objects
            .slot_of(id)
            .map(|slot| ObjectKey::new(slot, self.epoch))
    }

    pub fn find_activity(&self, id: &str) -> Option<ActivityKey> {
        self.activities
            .slot_of(id)
            .map(|slot| ActivityKey::new(slot, self.epoch))
    }

    pub fn find_list(&self, url: &str) -> Option<ListKey> {
        self.lists
            .slot_of(url)
            .map(|slot| ListKey::new(slot, self.epoch))
    }

    pub fn find_collection(&self, url: &str) -> Option<CollectionKey> {
        self.collections
            .slot_of(url)
            .map(|slot| CollectionKey::new(slot, self.epoch))
    }

    /// Empty ids are a contract violation on the id-keyed kinds.
    pub(crate) fn intern_object(
        &mut self,
        id: &str,
        make: impl FnOnce(String) -> Object,
    ) -> Result<(ObjectKey, bool)> {
        if id.is_empty() {
            bail!("object document without id");
        }
        let (slot, created) = self.objects.lookup_or_insert(id, make);
        Ok((ObjectKey::new(slot, self.epoch), created))
    }

    pub(crate) fn intern_activity(&mut self, id: &str) -> Result<(ActivityKey, bool)> {
        if id.is_empty() {
            bail!("activity document without id");
        }
        let (slot, created) = self.activities.lookup_or_insert(id, Activity::new);
        Ok((ActivityKey::new(slot, self.epoch), created))
    }

    /// List kinds are keyed by url; an empty url yields no list.
    pub(crate) fn intern_list(
        &mut self,
        url: &str,
        make: impl FnOnce(String) -> ObjectList,
    ) -> Option<(ListKey, bool)> {
        if url.is_empty() {
            return None;
        }
        let (slot, created) = self.lists.lookup_or_insert(url, make);
        Some((ListKey::new(slot, self.epoch), created))
    }

    pub(crate) fn intern_collection(&mut self, url: &str) -> Option<(CollectionKey, bool)> {
        if url.is_empty() {
            return None;
        }
        let (slot, created) = self.collections.lookup_or_insert(url, Collection::new);
        Some((CollectionKey::new(slot, self.epoch), created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_id_same_key() {
        let mut reg = Registry::default();
        let (a, created) = reg.intern_activity("act-1").unwrap();
        assert!(created);
        let (b, created) = reg.intern_activity("act-1").unwrap();
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(reg.find_activity("act-1"), Some(a));
    }

    #[test]
    fn empty_keys() {
        let mut reg = Registry::default();
        assert!(reg.intern_activity("").is_err());
        assert!(reg.intern_collection("").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn reset_invalidates_old_handles() {
        let mut reg = Registry::default();
        let (old, _) = reg.intern_collection("https://pump.example/inbox").unwrap();
        assert!(reg.collection(old).is_some());
        reg.reset();
        assert!(reg.collection(old).is_none());
        assert!(reg.is_empty());

        let (new, created) = reg.intern_collection("https://pump.example/inbox").unwrap();
        assert!(created);
        assert_ne!(old, new);
        assert!(reg.collection(new).is_some());
    }
}
