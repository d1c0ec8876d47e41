/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::merge::{merge_field, str_at, Document};
use crate::registry::{ActivityKey, CollectionKey};
use crate::signals::Relay;

/// A timeline of activities, newest first.
#[derive(Clone, Debug)]
pub struct Collection {
    pub url: String,
    pub display_name: String,
    pub total_items: u64,
    /// `links.prev.href`: where newer items come from.
    pub prev_link: String,
    /// `links.next.href`: where older items come from.
    pub next_link: String,
    items: Vec<ActivityKey>,
    item_set: HashSet<ActivityKey>,
}

impl Collection {
    pub(crate) fn new(url: String) -> Self {
        Self {
            url,
            display_name: String::new(),
            total_items: 0,
            prev_link: String::new(),
            next_link: String::new(),
            items: Vec::new(),
            item_set: HashSet::new(),
        }
    }

    pub fn items(&self) -> &[ActivityKey] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: ActivityKey) -> bool {
        self.item_set.contains(&key)
    }

    /// Whether older pages remain to be fetched.
    pub fn has_older(&self) -> bool {
        !self.next_link.is_empty()
    }

    /// Inserts a page keeping its internal order: at the top for newer pages,
    /// at the bottom for older ones. Already present activities are skipped.
    fn insert_page(&mut self, page: &[ActivityKey], older: bool) -> usize {
        let mut at = if older { self.items.len() } else { 0 };
        let mut inserted = 0;
        for &act in page {
            if !self.item_set.insert(act) {
                continue;
            }
            self.items.insert(at, act);
            at += 1;
            inserted += 1;
        }
        inserted
    }
}

impl Cache {
    /// Registers a timeline before its first page arrives.
    pub fn init_collection(&mut self, url: &str) -> Option<CollectionKey> {
        let (key, created) = self.registry.intern_collection(url)?;
        if created {
            debug!(%url, "collection registered");
        }
        Some(key)
    }

    pub(crate) fn resolve_collection(
        &mut self,
        doc: &Document,
        older: bool,
    ) -> Option<CollectionKey> {
        let url = str_at(doc, &["url"]);
        let key = self.init_collection(&url)?;
        self.update_collection(key, doc, older);
        Some(key)
    }

    pub(crate) fn update_collection(&mut self, key: CollectionKey, doc: &Document, older: bool) {
        let mut page = Vec::new();
        if let Some(items) = doc.get("items").and_then(Value::as_array) {
            for item in items.iter().filter_map(Value::as_object) {
                match self.resolve_activity(item) {
                    Ok(act) => page.push(act),
                    Err(e) => warn!("skipping collection item: {e:#}"),
                }
            }
        }

        let Some(coll) = self.registry.collection_mut(key) else { return };
        let first_page = coll.items.is_empty();
        let mut ch = false;
        ch |= merge_field(doc, &mut coll.display_name, &["displayName"]);
        ch |= merge_field(doc, &mut coll.total_items, &["totalItems"]);
        // A newer page must not move the older-items cursor and vice versa.
        if first_page || !older {
            ch |= merge_field(doc, &mut coll.prev_link, &["links", "prev", "href"]);
        }
        if first_page || older {
            ch |= merge_field(doc, &mut coll.next_link, &["links", "next", "href"]);
        }
        if older && str_at(doc, &["links", "next", "href"]).is_empty() {
            // Last page reached.
            ch |= !coll.next_link.is_empty();
            coll.next_link.clear();
        }
        let inserted = coll.insert_page(&page, older);
        if inserted > 0 {
            debug!(url = %coll.url, inserted, older, "collection page merged");
        }
        ch |= inserted > 0;

        for act in page {
            self.relay(act, key, Relay::FetchOnly);
        }
        if ch {
            self.mark_changed(key);
        }
    }
}
