/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pump_protocol::{FetchRequest, ResponseTag};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::activity::Activity;
use crate::collection::Collection;
use crate::config::CacheConfig;
use crate::events::{CoreEvent, CoreEventKind};
use crate::merge::Document;
use crate::object::Object;
use crate::object_list::ObjectList;
use crate::registry::{
    ActivityKey, CollectionKey, EntityKey, ListKey, ObjectKey, Registry,
};
use crate::signals::{Relay, Signal, SignalBus, Subscription};

/// The object graph cache. One per account session; every merge goes through it.
pub struct Cache {
    cfg: CacheConfig,
    site_base: Option<String>,
    pub(crate) registry: Registry,
    pub(crate) bus: SignalBus,
    last_fetch: HashMap<(EntityKey, String), Instant>,
    events: broadcast::Sender<CoreEvent>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache {
    pub fn new(cfg: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(cfg.event_buffer.max(1));
        let site_base = cfg.site_base();
        Self {
            cfg,
            site_base,
            registry: Registry::default(),
            bus: SignalBus::default(),
            last_fetch: HashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn object(&self, key: ObjectKey) -> Option<&Object> {
        self.registry.object(key)
    }

    pub fn activity(&self, key: ActivityKey) -> Option<&Activity> {
        self.registry.activity(key)
    }

    pub fn list(&self, key: ListKey) -> Option<&ObjectList> {
        self.registry.list(key)
    }

    pub fn collection(&self, key: CollectionKey) -> Option<&Collection> {
        self.registry.collection(key)
    }

    pub fn find_object(&self, id: &str) -> Option<ObjectKey> {
        self.registry.find_object(id)
    }

    pub fn find_activity(&self, id: &str) -> Option<ActivityKey> {
        self.registry.find_activity(id)
    }

    pub fn find_list(&self, url: &str) -> Option<ListKey> {
        self.registry.find_list(url)
    }

    pub fn find_collection(&self, url: &str) -> Option<CollectionKey> {
        self.registry.find_collection(url)
    }

    /// Subscribes to one entity's `Changed` and relayed `Fetch` signals.
    pub fn subscribe(&mut self, key: impl Into<EntityKey>) -> Subscription {
        self.bus.subscribe(key.into())
    }

    /// Cache-wide events (fetch requests, refresh-all, reset) for the transport.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Drops every cached entity, subscription and relay at once.
    /// Handles taken before the reset resolve to nothing afterwards.
    pub fn reset(&mut self) {
        let n = self.registry.len();
        self.registry.reset();
        self.bus.clear();
        self.last_fetch.clear();
        info!(entities = n, "cache reset");
        let _ = self.events.send(CoreEvent::new(CoreEventKind::Reset, None));
    }

    pub(crate) fn mark_changed(&mut self, key: impl Into<EntityKey>) {
        self.bus.emit(key.into(), Signal::Changed);
    }

    pub(crate) fn relay(
        &mut self,
        child: impl Into<EntityKey>,
        parent: impl Into<EntityKey>,
        relay: Relay,
    ) {
        self.bus.link(child.into(), parent.into(), relay);
    }

    pub(crate) fn broadcast(&self, event: CoreEvent) {
        let _ = self.events.send(event);
    }

    /// Queues a fetch on behalf of `origin`, subject to the single-flight cooldown.
    /// Returns false when the request was suppressed or dropped.
    pub(crate) fn request_fetch(&mut self, origin: EntityKey, url: &str, tag: ResponseTag) -> bool {
        self.request_fetch_at(origin, url, tag, Instant::now())
    }

    pub(crate) fn request_fetch_at(
        &mut self,
        origin: EntityKey,
        url: &str,
        tag: ResponseTag,
        now: Instant,
    ) -> bool {
        let Some(url) = self.absolute_url(url) else {
            debug!(url, "dropping fetch for foreign or empty url");
            return false;
        };
        let cooldown = self.cfg.refresh_cooldown();
        let slot = (origin, url.clone());
        if let Some(last) = self.last_fetch.get(&slot) {
            if !cooldown.is_zero() && now.saturating_duration_since(*last) < cooldown {
                trace!(url = %url, "fetch suppressed by cooldown");
                return false;
            }
        }
        self.last_fetch.insert(slot, now);
        debug!(url = %url, tag = tag.bits(), "fetch requested");
        self.bus.emit(origin, Signal::Fetch(FetchRequest::new(url, tag)));
        true
    }

    /// Delivers everything queued during the current operation.
    pub(crate) fn finish(&mut self) {
        if !self.bus.has_pending() {
            return;
        }
        for req in self.bus.flush() {
            self.broadcast(CoreEvent::fetch(req));
        }
    }

    fn absolute_url(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        let Some(base) = self.site_base.as_deref() else {
            return Some(url.to_string());
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Some(format!("{base}/{}", url.trim_start_matches('/')));
        }
        let on_site = url == base
            || url
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with(['/', '?', '#']));
        on_site.then(|| url.to_string())
    }
}

/// Short, single-line rendering of a document for log and error messages.
pub(crate) fn preview(doc: &Document) -> String {
    let mut s = Value::Object(doc.clone()).to_string();
    if s.len() > 200 {
        let mut cut = 200;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use pump_protocol::ResponseKind;
    use std::time::Duration;

    fn origin(cache: &mut Cache) -> EntityKey {
        let (k, _) = cache
            .registry
            .intern_collection("https://pump.example/api/user/alice/inbox")
            .unwrap();
        k.into()
    }

    #[test]
    fn cooldown_suppresses_repeat_until_elapsed() {
        let mut cache = Cache::default();
        let key = origin(&mut cache);
        let tag = ResponseTag::new(ResponseKind::Collection);
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);
        let x = "https://pump.example/x";
        assert!(cache.request_fetch_at(key, x, tag, t0));
        assert!(!cache.request_fetch_at(key, x, tag, at(500)));
        assert!(cache.request_fetch_at(key, x, tag, at(1500)));
        // A different resource of the same entity is not held back.
        assert!(cache.request_fetch_at(key, "https://pump.example/y", tag, at(1600)));
    }

    #[test]
    fn site_filter_and_relative_links() {
        let mut cache = Cache::new(CacheConfig {
            site_url: Some("https://pump.example/".to_string()),
            refresh_cooldown_ms: 0,
            ..CacheConfig::default()
        });
        let key = origin(&mut cache);
        let mut events = cache.subscribe_events();
        let tag = ResponseTag::new(ResponseKind::Object);
        assert!(!cache.request_fetch(key, "https://elsewhere.example/note/1", tag));
        assert!(!cache.request_fetch(key, "https://pump.example.evil/api/note/1", tag));
        assert!(cache.request_fetch(key, "/api/note/1", tag));
        cache.finish();
        let ev = events.try_recv().unwrap();
        assert_eq!(ev.kind, CoreEventKind::Fetch);
        assert_eq!(ev.request.unwrap().url, "https://pump.example/api/note/1");
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let doc = serde_json::json!({"content": "ä".repeat(300)});
        let p = preview(doc.as_object().unwrap());
        assert!(p.ends_with("..."));
        assert!(p.len() <= 203);
    }
}
