/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::{preview, Cache};
use crate::merge::{self, merge_field, merge_url_or_proxy, str_at, sub_document, Document};
use crate::object_list::{ListRole, ObjectList};
use crate::registry::{ListKey, ObjectKey};
use crate::signals::Relay;

/// Fields only persons carry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActorFields {
    pub preferred_username: String,
    pub summary: String,
    /// `location.displayName`
    pub location: String,
    /// Set by the client after a follow/unfollow; the server flag is not trusted.
    pub followed: bool,
    /// The authenticated account. Never cleared once set.
    pub is_you: bool,
}

/// Decided once, when the id is first seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectRole {
    Plain,
    Actor(ActorFields),
}

#[derive(Clone, Debug)]
pub struct Object {
    pub id: String,
    pub object_type: String,
    pub url: String,
    pub content: String,
    pub display_name: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub deleted: bool,
    /// `links.self.href`
    pub api_link: String,
    /// `pump_io.proxyURL`
    pub proxy_url: String,
    pub liked: bool,
    pub shared: bool,
    pub image_url: String,
    pub full_image_url: String,
    pub in_reply_to: Option<ObjectKey>,
    pub author: Option<ObjectKey>,
    pub replies: Option<ListKey>,
    pub likes: Option<ListKey>,
    pub shares: Option<ListKey>,
    role: ObjectRole,
}

impl Object {
    pub(crate) fn new(id: String, role: ObjectRole) -> Self {
        Self {
            id,
            object_type: String::new(),
            url: String::new(),
            content: String::new(),
            display_name: String::new(),
            published: None,
            updated: None,
            deleted: false,
            api_link: String::new(),
            proxy_url: String::new(),
            liked: false,
            shared: false,
            image_url: String::new(),
            full_image_url: String::new(),
            in_reply_to: None,
            author: None,
            replies: None,
            likes: None,
            shares: None,
            role,
        }
    }

    pub fn role(&self) -> &ObjectRole {
        &self.role
    }

    pub fn is_actor(&self) -> bool {
        matches!(self.role, ObjectRole::Actor(_))
    }

    pub fn as_actor(&self) -> Option<&ActorFields> {
        match &self.role {
            ObjectRole::Actor(a) => Some(a),
            ObjectRole::Plain => None,
        }
    }

    fn actor_mut(&mut self) -> Option<&mut ActorFields> {
        match &mut self.role {
            ObjectRole::Actor(a) => Some(a),
            ObjectRole::Plain => None,
        }
    }

    /// URL used to re-fetch this object: proxy, then self link, then id.
    pub fn fetch_url(&self) -> &str {
        [&self.proxy_url, &self.api_link, &self.id]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Ordering key for reply threads: publish time in ms, then update time.
    pub fn sort_key(&self) -> i64 {
        self.published
            .or(self.updated)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }

    /// `acct:alice@pump.example` -> `alice@pump.example`.
    pub fn webfinger(&self) -> &str {
        self.id.strip_prefix("acct:").unwrap_or(&self.id)
    }

    pub fn display_name_or_webfinger(&self) -> &str {
        if self.display_name.is_empty() {
            self.webfinger()
        } else {
            &self.display_name
        }
    }

    /// First word of the display name (or the webfinger user part).
    pub fn display_name_or_webfinger_short(&self) -> &str {
        let s = self.display_name_or_webfinger();
        match s.find(['@', '-', ' ']) {
            Some(i) => &s[..i],
            None => s,
        }
    }

    /// Minimal `{id, objectType}` document naming this object in an outgoing activity.
    pub fn reference_document(&self) -> Value {
        json!({
            "id": self.id,
            "objectType": self.object_type,
        })
    }

    fn merge_deleted(&mut self, doc: &Document) -> bool {
        let Some(v) = doc.get("deleted") else {
            return false;
        };
        // pump.io sends the deletion timestamp; a bool is accepted too.
        let deleted = !matches!(v, Value::Null | Value::Bool(false));
        if deleted == self.deleted {
            return false;
        }
        self.deleted = deleted;
        true
    }

    fn merge_plain(&mut self, doc: &Document) -> bool {
        let mut ch = false;
        ch |= merge_field(doc, &mut self.object_type, &["objectType"]);
        ch |= merge_field(doc, &mut self.url, &["url"]);
        ch |= merge_field(doc, &mut self.content, &["content"]);
        ch |= merge_field(doc, &mut self.display_name, &["displayName"]);
        ch |= merge_field(doc, &mut self.liked, &["liked"]);
        ch |= merge_field(doc, &mut self.shared, &["pump_io", "shared"]);
        ch |= merge_field(doc, &mut self.published, &["published"]);
        ch |= merge_field(doc, &mut self.updated, &["updated"]);
        ch |= self.merge_deleted(doc);

        if self.object_type == "image" {
            if let Some(image) = sub_document(doc, "image") {
                ch |= merge_url_or_proxy(image, &mut self.image_url);
            }
            if let Some(full) = sub_document(doc, "fullImage") {
                ch |= merge_url_or_proxy(full, &mut self.full_image_url);
            }
        }

        merge_field(doc, &mut self.api_link, &["links", "self", "href"]);
        let proxy = merge::proxy_url(doc);
        if !proxy.is_empty() {
            self.proxy_url = proxy;
        }
        ch
    }

    fn merge_actor(&mut self, doc: &Document) -> bool {
        let mut ch = false;
        ch |= merge_field(doc, &mut self.url, &["url"]);
        ch |= merge_field(doc, &mut self.display_name, &["displayName"]);
        ch |= merge_field(doc, &mut self.object_type, &["objectType"]);
        ch |= merge_field(doc, &mut self.published, &["published"]);
        ch |= merge_field(doc, &mut self.updated, &["updated"]);
        if let Some(image) = sub_document(doc, "image") {
            ch |= merge_url_or_proxy(image, &mut self.image_url);
        }
        merge_field(doc, &mut self.api_link, &["links", "self", "href"]);
        let proxy = merge::proxy_url(doc);
        if !proxy.is_empty() {
            self.proxy_url = proxy;
        }
        if let Some(actor) = self.actor_mut() {
            ch |= merge_field(doc, &mut actor.preferred_username, &["preferredUsername"]);
            ch |= merge_field(doc, &mut actor.summary, &["summary"]);
            ch |= merge_field(doc, &mut actor.location, &["location", "displayName"]);
        }
        ch
    }
}

/// The three sub-lists an object owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OwnedList {
    Replies,
    Likes,
    Shares,
}

impl OwnedList {
    fn field(self) -> &'static str {
        match self {
            Self::Replies => "replies",
            Self::Likes => "likes",
            Self::Shares => "shares",
        }
    }

    fn role(self) -> ListRole {
        match self {
            Self::Replies => ListRole::Replies,
            Self::Likes | Self::Shares => ListRole::Actors,
        }
    }

    fn slot(self, obj: &mut Object) -> &mut Option<ListKey> {
        match self {
            Self::Replies => &mut obj.replies,
            Self::Likes => &mut obj.likes,
            Self::Shares => &mut obj.shares,
        }
    }
}

impl Cache {
    /// Resolves any object document. `objectType: "person"` is routed to the
    /// actor path so persons always end up as actors.
    pub(crate) fn resolve_object(&mut self, doc: &Document) -> Result<ObjectKey> {
        if str_at(doc, &["objectType"]) == "person" {
            return self.resolve_actor(doc);
        }
        let id = str_at(doc, &["id"]);
        let (key, created) = self
            .registry
            .intern_object(&id, |id| Object::new(id, ObjectRole::Plain))
            .with_context(|| format!("resolving object {}", preview(doc)))?;
        if created {
            debug!(%id, "new object");
        }
        self.update_object(key, doc);
        Ok(key)
    }

    pub(crate) fn resolve_actor(&mut self, doc: &Document) -> Result<ObjectKey> {
        let id = str_at(doc, &["id"]);
        let (key, created) = self
            .registry
            .intern_object(&id, |id| Object::new(id, ObjectRole::Actor(ActorFields::default())))
            .with_context(|| format!("resolving actor {}", preview(doc)))?;
        if created {
            debug!(%id, "new actor");
        } else if self.object(key).is_some_and(|o| !o.is_actor()) {
            warn!(%id, "person document for an id already cached as a plain object");
        }
        self.update_object(key, doc);
        Ok(key)
    }

    /// Resolves `doc[name]` when it is a map; malformed references are logged and skipped.
    pub(crate) fn resolve_nested_object(
        &mut self,
        doc: &Document,
        name: &str,
        actor: bool,
    ) -> Option<ObjectKey> {
        let sub = sub_document(doc, name)?;
        let res = if actor {
            self.resolve_actor(sub)
        } else {
            self.resolve_object(sub)
        };
        match res {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("skipping {name}: {e:#}");
                None
            }
        }
    }

    pub(crate) fn update_object(&mut self, key: ObjectKey, doc: &Document) {
        let is_actor = match self.registry.object(key) {
            Some(obj) => obj.is_actor(),
            None => return,
        };
        if is_actor {
            self.update_actor(key, doc);
        } else {
            self.update_plain(key, doc);
        }
    }

    fn update_actor(&mut self, key: ObjectKey, doc: &Document) {
        let Some(obj) = self.registry.object_mut(key) else { return };
        obj.author = None;
        if obj.merge_actor(doc) {
            self.mark_changed(key);
        }
    }

    fn update_plain(&mut self, key: ObjectKey, doc: &Document) {
        let Some(obj) = self.registry.object_mut(key) else { return };
        let mut ch = obj.merge_plain(doc);

        for owned in [OwnedList::Replies, OwnedList::Likes, OwnedList::Shares] {
            self.merge_owned_list(key, doc, owned);
        }

        if let Some(parent) = self.resolve_nested_object(doc, "inReplyTo", false) {
            if let Some(obj) = self.registry.object_mut(key) {
                ch |= obj.in_reply_to.replace(parent) != Some(parent);
            }
        }
        if let Some(author) = self.resolve_nested_object(doc, "author", true) {
            if let Some(obj) = self.registry.object_mut(key) {
                ch |= obj.author.replace(author) != Some(author);
            }
        }

        if ch {
            self.mark_changed(key);
        }
    }

    fn merge_owned_list(&mut self, owner: ObjectKey, doc: &Document, owned: OwnedList) {
        let Some(sub) = sub_document(doc, owned.field()) else { return };
        let Some(list) = self.resolve_list(sub, owned.role()) else { return };
        let previous = match self.registry.object_mut(owner) {
            Some(obj) => owned.slot(obj).replace(list),
            None => return,
        };
        self.relay(list, owner, Relay::All);
        if let Some(old) = previous.filter(|old| *old != list) {
            self.adopt_local_items(old, list);
            self.mark_changed(owner);
        }
    }

    /// Returns the owner's sub-list, creating a local one when the server never sent it.
    pub(crate) fn ensure_owned_list(
        &mut self,
        owner: ObjectKey,
        owned: OwnedList,
    ) -> Option<ListKey> {
        let obj = self.registry.object_mut(owner)?;
        if let Some(list) = *owned.slot(obj) {
            return Some(list);
        }
        let local_key = format!("local:{}:{}", owned.field(), obj.id);
        let role = owned.role();
        let (list, _) = self
            .registry
            .intern_list(&local_key, |_| ObjectList::local(role))?;
        if let Some(obj) = self.registry.object_mut(owner) {
            *owned.slot(obj) = Some(list);
        }
        self.relay(list, owner, Relay::All);
        Some(list)
    }

    /// Records `reply` in the parent's reply thread, keeping oldest-first order.
    pub(crate) fn add_reply(&mut self, parent: ObjectKey, reply: ObjectKey) {
        if parent == reply {
            return;
        }
        let Some(list) = self.ensure_owned_list(parent, OwnedList::Replies) else { return };
        if self.merge_reply_items(list, &[reply]) > 0 {
            if let Some(l) = self.registry.list_mut(list) {
                l.total_items = l.total_items.max(l.len() as u64);
            }
            self.mark_changed(list);
        }
    }

    pub(crate) fn add_owned_actor(&mut self, owner: ObjectKey, owned: OwnedList, actor: ObjectKey) {
        let Some(list) = self.ensure_owned_list(owner, owned) else { return };
        let added = self.registry.list_mut(list).is_some_and(|l| l.add(actor));
        if added {
            self.mark_changed(list);
        }
    }

    pub(crate) fn remove_owned_actor(
        &mut self,
        owner: ObjectKey,
        owned: OwnedList,
        actor: ObjectKey,
    ) {
        let Some(obj) = self.registry.object_mut(owner) else { return };
        let Some(list) = *owned.slot(obj) else { return };
        let removed = self.registry.list_mut(list).is_some_and(|l| l.remove(actor));
        if removed {
            self.mark_changed(list);
        }
    }

    /// Sets the author only when the server left it out.
    pub(crate) fn default_author(&mut self, key: ObjectKey, author: ObjectKey) {
        let Some(obj) = self.registry.object_mut(key) else { return };
        if obj.is_actor() || obj.author.is_some() {
            return;
        }
        obj.author = Some(author);
        self.mark_changed(key);
    }

    /// Flips the liked flag, e.g. after our own like/unlike went through.
    pub fn toggle_liked(&mut self, key: ObjectKey) {
        self.flip_liked(key);
        self.finish();
    }

    pub(crate) fn flip_liked(&mut self, key: ObjectKey) {
        let Some(obj) = self.registry.object_mut(key) else { return };
        obj.liked = !obj.liked;
        self.mark_changed(key);
    }

    pub fn set_followed(&mut self, key: ObjectKey, followed: bool) {
        let Some(actor) = self.registry.object_mut(key).and_then(Object::actor_mut) else {
            return;
        };
        actor.followed = followed;
        self.mark_changed(key);
        self.finish();
    }

    /// Marks the authenticated account's actor.
    pub fn set_you(&mut self, key: ObjectKey) {
        self.mark_you(key);
        self.finish();
    }

    pub(crate) fn mark_you(&mut self, key: ObjectKey) {
        let Some(actor) = self.registry.object_mut(key).and_then(Object::actor_mut) else {
            return;
        };
        if !actor.is_you {
            actor.is_you = true;
            self.mark_changed(key);
        }
    }

    /// `{id, objectType}` of a cached object, for outgoing like/share/reply activities.
    pub fn object_reference(&self, key: ObjectKey) -> Option<Value> {
        self.object(key).map(Object::reference_document)
    }

    /// Number of replies materialized locally.
    pub fn num_replies(&self, key: ObjectKey) -> usize {
        self.owned_len(key, |o| o.replies)
    }

    pub fn num_likes(&self, key: ObjectKey) -> usize {
        self.owned_len(key, |o| o.likes)
    }

    pub fn num_shares(&self, key: ObjectKey) -> usize {
        self.owned_len(key, |o| o.shares)
    }

    fn owned_len(&self, key: ObjectKey, pick: impl Fn(&Object) -> Option<ListKey>) -> usize {
        self.object(key)
            .and_then(pick)
            .and_then(|l| self.list(l))
            .map(ObjectList::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn image_fields_only_for_images() {
        let mut cache = Cache::default();
        let note = cache
            .resolve_object(&doc(json!({
                "id": "n1", "objectType": "note",
                "image": {"url": "https://pump.example/thumb.png"}
            })))
            .unwrap();
        assert!(cache.object(note).unwrap().image_url.is_empty());

        let img = cache
            .resolve_object(&doc(json!({
                "id": "i1", "objectType": "image",
                "image": {"url": "https://pump.example/thumb.png"},
                "fullImage": {"url": "https://pump.example/full.png",
                              "pump_io": {"proxyURL": "https://pump.example/proxy/full.png"}}
            })))
            .unwrap();
        let img = cache.object(img).unwrap();
        assert_eq!(img.image_url, "https://pump.example/thumb.png");
        assert_eq!(img.full_image_url, "https://pump.example/proxy/full.png");
    }

    #[test]
    fn fetch_url_preference() {
        let mut obj = Object::new("https://pump.example/api/note/1".into(), ObjectRole::Plain);
        assert_eq!(obj.fetch_url(), "https://pump.example/api/note/1");
        obj.api_link = "https://pump.example/api/note/1?self".into();
        assert_eq!(obj.fetch_url(), "https://pump.example/api/note/1?self");
        obj.proxy_url = "https://mine.example/proxy/1".into();
        assert_eq!(obj.fetch_url(), "https://mine.example/proxy/1");
    }

    #[test]
    fn webfinger_helpers() {
        let role = ObjectRole::Actor(ActorFields::default());
        let mut a = Object::new("acct:alice@pump.example".into(), role);
        assert_eq!(a.webfinger(), "alice@pump.example");
        assert_eq!(a.display_name_or_webfinger_short(), "alice");
        a.display_name = "Alice Liddell".into();
        assert_eq!(a.display_name_or_webfinger(), "Alice Liddell");
        assert_eq!(a.display_name_or_webfinger_short(), "Alice");
    }

    #[test]
    fn deleted_timestamp_sets_flag() {
        let mut cache = Cache::default();
        let k = cache
            .resolve_object(&doc(json!({"id": "n1", "objectType": "note",
                                        "deleted": "2013-05-28T16:43:06Z"})))
            .unwrap();
        assert!(cache.object(k).unwrap().deleted);
    }

    #[test]
    fn actor_details_and_sticky_you() {
        let mut cache = Cache::default();
        let k = cache
            .resolve_actor(&doc(json!({
                "id": "acct:alice@pump.example",
                "preferredUsername": "alice",
                "summary": "hello",
                "location": {"displayName": "Turku"},
                "image": {"url": "https://pump.example/a.png"}
            })))
            .unwrap();
        cache.set_you(k);
        cache
            .resolve_actor(&doc(json!({"id": "acct:alice@pump.example", "summary": "hi"})))
            .unwrap();
        let a = cache.object(k).unwrap();
        let fields = a.as_actor().unwrap();
        assert!(fields.is_you);
        assert_eq!(fields.summary, "hi");
        assert_eq!(fields.location, "Turku");
        assert_eq!(a.image_url, "https://pump.example/a.png");
    }

    #[test]
    fn plain_object_is_not_retagged() {
        let mut cache = Cache::default();
        let k = cache.resolve_object(&doc(json!({"id": "x", "objectType": "note"}))).unwrap();
        let again = cache.resolve_object(&doc(json!({"id": "x", "objectType": "person"}))).unwrap();
        assert_eq!(k, again);
        assert!(!cache.object(k).unwrap().is_actor());
    }

    #[test]
    fn reference_document_names_object() {
        let mut cache = Cache::default();
        let k = cache
            .resolve_object(&doc(json!({"id": "n1", "objectType": "note", "content": "x"})))
            .unwrap();
        assert_eq!(
            cache.object_reference(k).unwrap(),
            json!({"id": "n1", "objectType": "note"})
        );
    }
}
