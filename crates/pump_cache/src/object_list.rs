/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pump_protocol::ResponseKind;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::merge::{self, has, merge_field, str_at, Document};
use crate::registry::{ListKey, ObjectKey};
use crate::signals::Relay;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListRole {
    /// Replaced wholesale by every document.
    Snapshot,
    /// Reply thread: merged incrementally, oldest first.
    Replies,
    /// Items are actors; supports single add/remove (likes, shares).
    Actors,
    /// `to` / `cc` of an activity, built from a plain array.
    Recipients,
}

#[derive(Clone, Debug)]
pub struct ObjectList {
    /// Server URL; empty for lists created locally.
    pub url: String,
    pub total_items: u64,
    pub has_more: bool,
    /// `links.next.href`
    pub next_link: String,
    pub proxy_url: String,
    role: ListRole,
    items: Vec<ObjectKey>,
    item_set: HashSet<ObjectKey>,
}

impl ObjectList {
    pub(crate) fn new(url: String, role: ListRole) -> Self {
        Self {
            url,
            total_items: 0,
            has_more: false,
            next_link: String::new(),
            proxy_url: String::new(),
            role,
            items: Vec::new(),
            item_set: HashSet::new(),
        }
    }

    /// A list the server has not described (yet); it cannot be fetched.
    /// Registered under a `local:` key, its url stays empty.
    pub(crate) fn local(role: ListRole) -> Self {
        Self::new(String::new(), role)
    }

    pub fn role(&self) -> ListRole {
        self.role
    }

    pub fn items(&self) -> &[ObjectKey] {
        &self.items
    }

    pub fn at(&self, i: usize) -> Option<ObjectKey> {
        self.items.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.item_set.contains(&key)
    }

    pub fn is_local(&self) -> bool {
        self.url.is_empty()
    }

    /// Whether a "show more replies" affordance should be offered.
    pub fn show_more_visible(&self) -> bool {
        self.has_more && (self.items.len() as u64) < self.total_items
    }

    pub fn fetch_url(&self) -> &str {
        if self.proxy_url.is_empty() {
            &self.url
        } else {
            &self.proxy_url
        }
    }

    pub fn response_kind(&self) -> ResponseKind {
        match self.role {
            ListRole::Actors => ResponseKind::ActorList,
            _ => ResponseKind::ObjectList,
        }
    }

    fn replace_items(&mut self, items: Vec<ObjectKey>) -> bool {
        if items == self.items {
            return false;
        }
        self.item_set = items.iter().copied().collect();
        self.items = items;
        true
    }

    /// Merges a newest-first page into the oldest-first thread. Returns how
    /// many items were inserted. Items with equal sort keys keep arrival order.
    fn merge_ordered(
        &mut self,
        incoming: &[ObjectKey],
        sort_key: impl Fn(ObjectKey) -> i64,
    ) -> usize {
        let mut inserted = 0;
        let mut i = 0;
        for &cand in incoming.iter().rev() {
            let key = sort_key(cand);
            while i < self.items.len() && self.items[i] != cand && sort_key(self.items[i]) <= key {
                i += 1;
            }
            if self.item_set.contains(&cand) {
                continue;
            }
            if self.items.get(i) == Some(&cand) {
                continue;
            }
            self.items.insert(i, cand);
            self.item_set.insert(cand);
            i += 1;
            inserted += 1;
        }
        inserted
    }

    /// Adds an actor at the end. Keeps `total_items` in step.
    pub(crate) fn add(&mut self, key: ObjectKey) -> bool {
        if !self.item_set.insert(key) {
            return false;
        }
        self.items.push(key);
        self.total_items = self.total_items.saturating_add(1).max(self.items.len() as u64);
        true
    }

    pub(crate) fn remove(&mut self, key: ObjectKey) -> bool {
        if !self.item_set.remove(&key) {
            return false;
        }
        self.items.retain(|k| *k != key);
        self.total_items = self.total_items.saturating_sub(1);
        true
    }
}

impl Cache {
    /// Looks up or creates the list keyed by `doc.url` and merges `doc` into it.
    /// A list document without url resolves to nothing.
    pub(crate) fn resolve_list(&mut self, doc: &Document, role: ListRole) -> Option<ListKey> {
        let url = str_at(doc, &["url"]);
        let (key, created) = self
            .registry
            .intern_list(&url, |url| ObjectList::new(url, role))?;
        if created {
            debug!(%url, ?role, "new object list");
        }
        self.update_list(key, doc);
        Some(key)
    }

    /// Reply threads merge incrementally; every other role is rebuilt from the page.
    pub(crate) fn update_list(&mut self, key: ListKey, doc: &Document) {
        let Some(role) = self.list(key).map(ObjectList::role) else { return };

        let mut incoming = Vec::new();
        if let Some(items) = doc.get("items").and_then(Value::as_array) {
            for item in items.iter().filter_map(Value::as_object) {
                let res = match role {
                    ListRole::Actors => self.resolve_actor(item),
                    _ => self.resolve_object(item),
                };
                let non_actor =
                    |cache: &Cache, k: ObjectKey| !cache.object(k).is_some_and(|o| o.is_actor());
                match res {
                    Ok(k) if role == ListRole::Actors && non_actor(self, k) => {
                        warn!(id = %str_at(item, &["id"]), "non-actor item in actor list skipped");
                    }
                    Ok(k) => incoming.push(k),
                    Err(e) => warn!("skipping list item: {e:#}"),
                }
            }
        }

        let sort_keys: HashMap<ObjectKey, i64> = match role {
            ListRole::Replies => self.sort_keys_for(key, &incoming),
            _ => HashMap::new(),
        };

        let Some(list) = self.registry.list_mut(key) else { return };
        let before = (list.total_items, list.has_more);
        merge_field(doc, &mut list.total_items, &["totalItems"]);
        merge_field(doc, &mut list.next_link, &["links", "next", "href"]);
        let proxy = merge::proxy_url(doc);
        if !proxy.is_empty() {
            list.proxy_url = proxy;
        }

        let items_changed = match role {
            ListRole::Replies => {
                list.merge_ordered(&incoming, |k| sort_keys.get(&k).copied().unwrap_or(0)) > 0
            }
            _ => list.replace_items(incoming.clone()),
        };

        // A displayName on the list document marks a fully fetched page.
        list.has_more = !has(doc, "displayName") && (list.items.len() as u64) < list.total_items;

        let changed = items_changed || before != (list.total_items, list.has_more);
        if role == ListRole::Replies {
            for item in incoming {
                self.relay(item, key, Relay::FetchOnly);
            }
        }
        if changed {
            self.mark_changed(key);
        }
    }

    /// Builds a recipients list from a plain `to`/`cc` array.
    pub(crate) fn resolve_recipients(
        &mut self,
        owner_id: &str,
        field: &str,
        arr: &[Value],
    ) -> Option<ListKey> {
        let mut items = Vec::new();
        for item in arr.iter().filter_map(Value::as_object) {
            match self.resolve_object(item) {
                Ok(k) => items.push(k),
                Err(e) => warn!("skipping {field} recipient: {e:#}"),
            }
        }
        let local_key = format!("local:{field}:{owner_id}");
        let (key, _) = self
            .registry
            .intern_list(&local_key, |_| ObjectList::local(ListRole::Recipients))?;
        let list = self.registry.list_mut(key)?;
        list.total_items = items.len() as u64;
        if list.replace_items(items) {
            self.mark_changed(key);
        }
        Some(key)
    }

    /// Inserts items into a reply thread by publish order.
    pub(crate) fn merge_reply_items(&mut self, key: ListKey, incoming: &[ObjectKey]) -> usize {
        let sort_keys = self.sort_keys_for(key, incoming);
        let inserted = match self.registry.list_mut(key) {
            Some(list) => list.merge_ordered(incoming, |k| sort_keys.get(&k).copied().unwrap_or(0)),
            None => return 0,
        };
        for item in incoming {
            self.relay(*item, key, Relay::FetchOnly);
        }
        inserted
    }

    /// Moves items gathered in a local list into the server list that replaced it.
    pub(crate) fn adopt_local_items(&mut self, from: ListKey, to: ListKey) {
        let Some(old) = self.list(from).filter(|l| l.is_local()) else { return };
        let items = old.items.clone();
        if items.is_empty() {
            return;
        }
        let Some(role) = self.list(to).map(ObjectList::role) else { return };
        let added = match role {
            ListRole::Replies => {
                // merge_ordered expects newest first.
                let newest_first: Vec<_> = items.iter().rev().copied().collect();
                self.merge_reply_items(to, &newest_first)
            }
            _ => match self.registry.list_mut(to) {
                Some(list) => items.into_iter().filter(|k| list.add(*k)).count(),
                None => 0,
            },
        };
        if added > 0 {
            self.mark_changed(to);
        }
    }

    fn sort_keys_for(&self, key: ListKey, incoming: &[ObjectKey]) -> HashMap<ObjectKey, i64> {
        let existing = self.list(key).map(ObjectList::items).unwrap_or_default();
        existing
            .iter()
            .chain(incoming)
            .filter_map(|k| self.object(*k).map(|o| (*k, o.sort_key())))
            .collect()
    }
}
