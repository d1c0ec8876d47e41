/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{anyhow, bail, Context, Result};
use pump_protocol::{ResponseKind, ResponseTag, TagModifiers};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::events::{CoreEvent, CoreEventKind};
use crate::merge::sub_document;
use crate::object_list::ListRole;
use crate::registry::EntityKey;

impl Cache {
    /// Merges a response document delivered for a request tagged `tag`.
    ///
    /// Returns the resolved entity, or `None` when the response carries nothing
    /// to resolve (null tag, list document without url). A document of an
    /// id-keyed kind without id is rejected with an error and nothing is merged.
    /// Signals raised by the merge are delivered before this returns.
    pub fn submit_document(
        &mut self,
        tag: impl Into<ResponseTag>,
        doc: &Value,
    ) -> Result<Option<EntityKey>> {
        let tag = tag.into();
        let res = self.dispatch(tag, doc);
        if let Err(e) = &res {
            warn!(kind = ?tag.kind, "dropping response: {e:#}");
        }
        if tag.modifiers.contains(TagModifiers::REFRESH) {
            self.broadcast(CoreEvent::new(CoreEventKind::RefreshAll, None));
        }
        self.finish();
        res
    }

    /// Same as [`Cache::submit_document`] for a raw body and an integer tag.
    pub fn submit_bytes(&mut self, tag_bits: u32, body: &[u8]) -> Result<Option<EntityKey>> {
        let tag = ResponseTag::from_bits(tag_bits)
            .ok_or_else(|| anyhow!("unknown response tag {tag_bits:#x}"))?;
        let doc: Value = serde_json::from_slice(body).context("parse response json")?;
        self.submit_document(tag, &doc)
    }

    fn dispatch(&mut self, tag: ResponseTag, doc: &Value) -> Result<Option<EntityKey>> {
        let kind = tag.kind;
        if kind == ResponseKind::Null {
            return Ok(None);
        }
        let Some(map) = doc.as_object() else {
            return match kind {
                ResponseKind::Collection | ResponseKind::ObjectList | ResponseKind::ActorList => {
                    debug!(?kind, "non-object list response ignored");
                    Ok(None)
                }
                _ => bail!("{kind:?} response is not a json object"),
            };
        };

        let key = match kind {
            ResponseKind::Null => None,
            ResponseKind::Collection => self
                .resolve_collection(map, tag.is_older())
                .map(EntityKey::from),
            ResponseKind::Activity => {
                let act = self.resolve_activity(map)?;
                if tag.modifiers.contains(TagModifiers::TOGGLE_LIKE) {
                    if let Some(obj) = self.activity(act).and_then(|a| a.object) {
                        self.flip_liked(obj);
                    }
                }
                Some(act.into())
            }
            ResponseKind::ObjectList => self
                .resolve_list(map, ListRole::Snapshot)
                .map(EntityKey::from),
            ResponseKind::ActorList => self
                .resolve_list(map, ListRole::Actors)
                .map(EntityKey::from),
            ResponseKind::Object => Some(self.resolve_object(map)?.into()),
            ResponseKind::SelfProfile => {
                let profile = sub_document(map, "profile").context("self profile without profile")?;
                let me = self.resolve_actor(profile)?;
                self.mark_you(me);
                Some(me.into())
            }
        };
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn self_profile_marks_you() {
        let mut cache = Cache::default();
        let key = cache
            .submit_document(
                ResponseKind::SelfProfile,
                &json!({"nickname": "alice",
                        "profile": {"id": "acct:alice@pump.example", "objectType": "person"}}),
            )
            .unwrap()
            .unwrap();
        let EntityKey::Object(me) = key else { panic!("expected object key") };
        assert!(cache.object(me).unwrap().as_actor().unwrap().is_you);
    }

    #[test]
    fn toggle_like_flips_object() {
        let mut cache = Cache::default();
        let tag = ResponseTag::new(ResponseKind::Activity).with(TagModifiers::TOGGLE_LIKE);
        cache
            .submit_document(
                tag,
                &json!({"id": "a1", "verb": "favorite",
                        "actor": {"id": "acct:alice@pump.example"},
                        "object": {"id": "n1", "objectType": "note"}}),
            )
            .unwrap();
        let n1 = cache.find_object("n1").unwrap();
        assert!(cache.object(n1).unwrap().liked);
    }

    #[test]
    fn refresh_modifier_broadcasts() {
        let mut cache = Cache::default();
        let mut events = cache.subscribe_events();
        let tag = ResponseTag::new(ResponseKind::Object).with(TagModifiers::REFRESH);
        cache
            .submit_document(tag, &json!({"id": "n1", "objectType": "note"}))
            .unwrap();
        assert_eq!(events.try_recv().unwrap().kind, CoreEventKind::RefreshAll);
    }

    #[test]
    fn malformed_responses() {
        let mut cache = Cache::default();
        assert!(cache.submit_document(ResponseKind::Object, &json!([1, 2])).is_err());
        assert!(cache.submit_document(ResponseKind::Object, &json!({"content": "x"})).is_err());
        assert!(cache.submit_document(ResponseKind::SelfProfile, &json!({})).is_err());
        assert!(cache.submit_document(ResponseKind::Collection, &json!("x")).unwrap().is_none());
        assert!(cache.submit_document(ResponseKind::Null, &json!({"id": "x"})).unwrap().is_none());
        assert!(cache.registry().is_empty());
    }

    #[test]
    fn bytes_with_integer_tag() {
        let mut cache = Cache::default();
        let body =
            br#"{"url": "https://pump.example/inbox", "items": [{"id": "a1", "verb": "post"}]}"#;
        let tag = ResponseTag::new(ResponseKind::Collection).with(TagModifiers::OLDER);
        let key = cache.submit_bytes(tag.bits(), body).unwrap().unwrap();
        let EntityKey::Collection(coll) = key else { panic!("expected collection key") };
        assert_eq!(cache.collection(coll).unwrap().len(), 1);
        assert!(cache.submit_bytes(0xEE, body).is_err());
        assert!(cache.submit_bytes(tag.bits(), b"{not json").is_err());
    }
}
