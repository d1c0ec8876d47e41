/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Outbound fetch requests. None of these wait for the response; it comes
//! back later through `submit_document`.

use pump_protocol::{ResponseKind, ResponseTag, TagModifiers};
use tracing::debug;

use crate::cache::Cache;
use crate::registry::{CollectionKey, EntityKey, ObjectKey};

impl Cache {
    /// Asks for a fresh copy of any entity. Repeats inside the cooldown are
    /// suppressed. Returns whether a request went out.
    pub fn refresh(&mut self, key: impl Into<EntityKey>) -> bool {
        let key = key.into();
        let target = match key {
            EntityKey::Object(k) => self
                .object(k)
                .map(|o| (o.fetch_url().to_string(), ResponseTag::new(ResponseKind::Object))),
            EntityKey::Activity(k) => self
                .activity(k)
                .map(|a| (a.fetch_url().to_string(), ResponseTag::new(ResponseKind::Activity))),
            EntityKey::List(k) => self
                .list(k)
                .filter(|l| !l.is_local())
                .map(|l| (l.fetch_url().to_string(), ResponseTag::new(l.response_kind()))),
            EntityKey::Collection(k) => return self.fetch_newer(k),
        };
        let Some((url, tag)) = target else {
            debug!(?key, "nothing to refresh");
            return false;
        };
        self.send_fetch(key, &url, tag)
    }

    /// Newer items come from `prevLink`; before the first page that is the collection url.
    pub fn fetch_newer(&mut self, key: CollectionKey) -> bool {
        let Some(coll) = self.collection(key) else { return false };
        let url = if coll.prev_link.is_empty() {
            coll.url.clone()
        } else {
            coll.prev_link.clone()
        };
        let tag = ResponseTag::new(ResponseKind::Collection).with(TagModifiers::NEWER);
        self.send_fetch(key.into(), &url, tag)
    }

    /// Older items come from `nextLink`; nothing happens once it is empty.
    pub fn fetch_older(&mut self, key: CollectionKey) -> bool {
        let Some(coll) = self.collection(key) else { return false };
        if coll.next_link.is_empty() {
            return false;
        }
        let url = coll.next_link.clone();
        let tag = ResponseTag::new(ResponseKind::Collection).with(TagModifiers::OLDER);
        self.send_fetch(key.into(), &url, tag)
    }

    /// "Show all N replies": fetches the object's reply list while more remain.
    pub fn show_more_replies(&mut self, key: ObjectKey) -> bool {
        let Some(list) = self.object(key).and_then(|o| o.replies) else {
            return false;
        };
        if !self.list(list).is_some_and(|l| l.show_more_visible()) {
            return false;
        }
        self.refresh(list)
    }

    fn send_fetch(&mut self, origin: EntityKey, url: &str, tag: ResponseTag) -> bool {
        let sent = self.request_fetch(origin, url, tag);
        self.finish();
        sent
    }
}
