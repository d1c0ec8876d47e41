/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pump_protocol::PUBLIC_RECIPIENT_ID;
use serde_json::Value;
use tracing::debug;

use crate::cache::{preview, Cache};
use crate::merge::{merge_field, str_at, Document};
use crate::object::{Object, OwnedList};
use crate::registry::{ActivityKey, ListKey, ObjectKey};
use crate::signals::Relay;

pub fn is_like_verb(verb: &str) -> bool {
    matches!(verb, "like" | "favorite" | "unlike" | "unfavorite")
}

pub fn is_unlike_verb(verb: &str) -> bool {
    is_like_verb(verb) && verb.starts_with("un")
}

pub fn is_public_recipient(obj: &Object) -> bool {
    obj.object_type == "collection" && obj.id == PUBLIC_RECIPIENT_ID
}

#[derive(Clone, Debug)]
pub struct Activity {
    pub id: String,
    pub verb: String,
    pub url: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// `generator.displayName`: the client that posted it.
    pub generator_name: String,
    /// `links.self.href`
    pub api_link: String,
    pub actor: Option<ObjectKey>,
    pub object: Option<ObjectKey>,
    pub to: Option<ListKey>,
    pub cc: Option<ListKey>,
}

impl Activity {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            verb: String::new(),
            url: String::new(),
            content: String::new(),
            published: None,
            updated: None,
            generator_name: String::new(),
            api_link: String::new(),
            actor: None,
            object: None,
            to: None,
            cc: None,
        }
    }

    pub fn fetch_url(&self) -> &str {
        if self.api_link.is_empty() {
            &self.id
        } else {
            &self.api_link
        }
    }

    fn merge_header(&mut self, doc: &Document) -> bool {
        let mut ch = false;
        ch |= merge_field(doc, &mut self.verb, &["verb"]);
        ch |= merge_field(doc, &mut self.url, &["url"]);
        ch |= merge_field(doc, &mut self.content, &["content"]);
        ch |= merge_field(doc, &mut self.published, &["published"]);
        ch |= merge_field(doc, &mut self.updated, &["updated"]);
        ch |= merge_field(doc, &mut self.generator_name, &["generator", "displayName"]);
        merge_field(doc, &mut self.api_link, &["links", "self", "href"]);
        ch
    }
}

impl Cache {
    pub(crate) fn resolve_activity(&mut self, doc: &Document) -> Result<ActivityKey> {
        let id = str_at(doc, &["id"]);
        let (key, created) = self
            .registry
            .intern_activity(&id)
            .with_context(|| format!("resolving activity {}", preview(doc)))?;
        if created {
            debug!(%id, "new activity");
        }
        self.update_activity(key, doc);
        Ok(key)
    }

    /// Only header fields raise the activity's own `Changed`; content changes
    /// of the object are signalled by the object itself.
    pub(crate) fn update_activity(&mut self, key: ActivityKey, doc: &Document) {
        let Some(act) = self.registry.activity_mut(key) else { return };
        let header_changed = act.merge_header(doc);
        let activity_id = act.id.clone();

        let actor = self.resolve_nested_object(doc, "actor", true);
        let object = self.resolve_nested_object(doc, "object", false);
        let to = self.recipients(&activity_id, doc, "to");
        let cc = self.recipients(&activity_id, doc, "cc");

        let Some(act) = self.registry.activity_mut(key) else { return };
        if actor.is_some() {
            act.actor = actor;
        }
        if object.is_some() {
            act.object = object;
        }
        if to.is_some() {
            act.to = to;
        }
        if cc.is_some() {
            act.cc = cc;
        }
        let verb = act.verb.clone();
        let (actor, object) = (act.actor, act.object);

        if let Some(obj) = object {
            self.relay(obj, key, Relay::FetchOnly);
            self.apply_verb(&verb, obj, actor);
        }
        if header_changed {
            self.mark_changed(key);
        }
    }

    fn recipients(&mut self, activity_id: &str, doc: &Document, field: &str) -> Option<ListKey> {
        let arr = doc.get(field).and_then(Value::as_array)?;
        self.resolve_recipients(activity_id, field, arr)
    }

    fn apply_verb(&mut self, verb: &str, obj: ObjectKey, actor: Option<ObjectKey>) {
        if let Some(actor) = actor {
            self.default_author(obj, actor);
        }

        if verb == "post" {
            if let Some(parent) = self.object(obj).and_then(|o| o.in_reply_to) {
                self.add_reply(parent, obj);
            }
            return;
        }

        let Some(actor) = actor else { return };
        if is_like_verb(verb) {
            if is_unlike_verb(verb) {
                self.remove_owned_actor(obj, OwnedList::Likes, actor);
            } else {
                self.add_owned_actor(obj, OwnedList::Likes, actor);
            }
        } else if verb == "share" {
            self.add_owned_actor(obj, OwnedList::Shares, actor);
        } else if verb == "unshare" {
            self.remove_owned_actor(obj, OwnedList::Shares, actor);
        }
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
    fn like_verbs() {
        assert!(is_like_verb("favorite"));
        assert!(is_unlike_verb("unfavorite"));
        assert!(!is_unlike_verb("unshare"));
        assert!(!is_like_verb("share"));
    }

    #[test]
    fn recipients_and_generator() {
        let mut cache = Cache::default();
        let key = cache
            .resolve_activity(&doc(json!({
                "id": "a1", "verb": "post",
                "generator": {"displayName": "Pumpa"},
                "actor": {"id": "acct:alice@pump.example", "objectType": "person"},
                "object": {"id": "n1", "objectType": "note"},
                "to": [{"id": PUBLIC_RECIPIENT_ID, "objectType": "collection"}],
                "cc": [{"id": "acct:bob@pump.example", "objectType": "person"}]
            })))
            .unwrap();
        let act = cache.activity(key).unwrap();
        assert_eq!(act.generator_name, "Pumpa");

        let to = cache.list(act.to.unwrap()).unwrap();
        assert_eq!(to.len(), 1);
        assert!(to.is_local());
        assert!(is_public_recipient(cache.object(to.at(0).unwrap()).unwrap()));

        let cc = cache.list(act.cc.unwrap()).unwrap();
        assert!(cache.object(cc.at(0).unwrap()).unwrap().is_actor());
    }

    #[test]
    fn missing_id_is_an_error() {
        let mut cache = Cache::default();
        let err = cache
            .resolve_activity(&doc(json!({"verb": "post"})))
            .unwrap_err();
        assert!(format!("{err:#}").contains("without id"));
    }

    #[test]
    fn nested_object_without_id_is_skipped() {
        let mut cache = Cache::default();
        let key = cache
            .resolve_activity(&doc(json!({"id": "a1", "verb": "post", "object": {"content": "x"}})))
            .unwrap();
        assert!(cache.activity(key).unwrap().object.is_none());
    }

    #[test]
    fn actor_fills_missing_author_for_any_verb() {
        let mut cache = Cache::default();
        cache
            .resolve_activity(&doc(json!({
                "id": "a2", "verb": "like",
                "actor": {"id": "u2"},
                "object": {"id": "o9"}
            })))
            .unwrap();
        let o9 = cache.find_object("o9").unwrap();
        let u2 = cache.find_object("u2").unwrap();
        assert_eq!(cache.object(o9).unwrap().author, Some(u2));
        assert_eq!(cache.num_likes(o9), 1);
    }

    #[test]
    fn existing_author_is_kept() {
        let mut cache = Cache::default();
        cache
            .resolve_activity(&doc(json!({
                "id": "a1", "verb": "share",
                "actor": {"id": "acct:bob@pump.example"},
                "object": {"id": "n1", "objectType": "note",
                           "author": {"id": "acct:alice@pump.example", "objectType": "person"}}
            })))
            .unwrap();
        let n1 = cache.find_object("n1").unwrap();
        let author = cache.object(n1).unwrap().author.unwrap();
        assert_eq!(cache.object(author).unwrap().id, "acct:alice@pump.example");
        assert_eq!(cache.num_shares(n1), 1);
    }
}
