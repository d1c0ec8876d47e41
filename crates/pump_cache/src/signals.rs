/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Per-entity signals and child-to-parent relays.
//!
//! Signals raised while a document is being merged are queued and only
//! delivered by `flush`, after the whole document has been applied.

use pump_protocol::FetchRequest;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::registry::EntityKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Something observable changed; re-read the entity.
    Changed,
    /// The entity (or something below it) wants `request` fetched.
    Fetch(FetchRequest),
}

/// Which signals a child forwards to a parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relay {
    FetchOnly,
    All,
}

/// Receiving end of a subscription to one entity.
pub struct Subscription {
    rx: UnboundedReceiver<Signal>,
}

impl Subscription {
    pub fn try_next(&mut self) -> Option<Signal> {
        match self.rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    pub fn drain(&mut self) -> Vec<Signal> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    pub fn changed_count(&mut self) -> usize {
        self.drain()
            .into_iter()
            .filter(|s| *s == Signal::Changed)
            .count()
    }
}

#[derive(Default)]
pub(crate) struct SignalBus {
    subscribers: HashMap<EntityKey, Vec<UnboundedSender<Signal>>>,
    parents: HashMap<EntityKey, HashMap<EntityKey, Relay>>,
    pending: Vec<(EntityKey, Signal)>,
}

impl SignalBus {
    pub(crate) fn subscribe(&mut self, key: EntityKey) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(key).or_default().push(tx);
        Subscription { rx }
    }

    /// Wires `child` to forward into `parent`. Re-linking the same pair is a
    /// no-op unless it widens the relay. Returns true when wiring changed.
    pub(crate) fn link(&mut self, child: EntityKey, parent: EntityKey, relay: Relay) -> bool {
        if child == parent {
            return false;
        }
        let parents = self.parents.entry(child).or_default();
        match parents.get(&parent) {
            Some(existing) if *existing >= relay => false,
            _ => {
                parents.insert(parent, relay);
                trace!(?child, ?parent, ?relay, "relay linked");
                true
            }
        }
    }

    pub(crate) fn emit(&mut self, key: EntityKey, signal: Signal) {
        self.pending.push((key, signal));
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Delivers queued signals to the origin and every ancestor reachable
    /// through matching relays. Each entity hears `Changed` at most once per
    /// flush. Returns the fetch requests raised, in emission order.
    pub(crate) fn flush(&mut self) -> Vec<FetchRequest> {
        let pending = std::mem::take(&mut self.pending);
        let mut changed_seen = HashSet::new();
        let mut fetch_seen = HashSet::new();
        let mut requests = Vec::new();

        for (origin, signal) in pending {
            let needed = match signal {
                Signal::Changed => Relay::All,
                Signal::Fetch(_) => Relay::FetchOnly,
            };
            for target in self.ancestors(origin, needed) {
                let fresh = match &signal {
                    Signal::Changed => changed_seen.insert(target),
                    Signal::Fetch(req) => fetch_seen.insert((target, req.clone())),
                };
                if fresh {
                    self.deliver(target, &signal);
                }
            }
            if let Signal::Fetch(req) = signal {
                if !requests.contains(&req) {
                    requests.push(req);
                }
            }
        }
        requests
    }

    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
        self.parents.clear();
        self.pending.clear();
    }

    fn ancestors(&self, origin: EntityKey, needed: Relay) -> Vec<EntityKey> {
        let mut out = vec![origin];
        let mut seen = HashSet::from([origin]);
        let mut queue = VecDeque::from([origin]);
        while let Some(cur) = queue.pop_front() {
            let Some(parents) = self.parents.get(&cur) else { continue };
            let mut next: Vec<_> = parents
                .iter()
                .filter(|(_, relay)| **relay >= needed)
                .map(|(p, _)| *p)
                .collect();
            next.sort();
            for p in next {
                if seen.insert(p) {
                    out.push(p);
                    queue.push_back(p);
                }
            }
        }
        out
    }

    fn deliver(&mut self, target: EntityKey, signal: &Signal) {
        let Some(subs) = self.subscribers.get_mut(&target) else { return };
        subs.retain(|tx| tx.send(signal.clone()).is_ok());
        if subs.is_empty() {
            self.subscribers.remove(&target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use pump_protocol::ResponseKind;

    fn keys() -> (EntityKey, EntityKey, EntityKey) {
        let mut reg = Registry::default();
        let (list, _) = reg
            .intern_list("https://pump.example/replies", |url| {
                crate::object_list::ObjectList::new(url, crate::object_list::ListRole::Replies)
            })
            .unwrap();
        let (act, _) = reg.intern_activity("act").unwrap();
        let (coll, _) = reg.intern_collection("https://pump.example/inbox").unwrap();
        (list.into(), act.into(), coll.into())
    }

    #[test]
    fn changed_follows_only_full_relays() {
        let (list, act, coll) = keys();
        let mut bus = SignalBus::default();
        let mut on_act = bus.subscribe(act);
        let mut on_coll = bus.subscribe(coll);
        bus.link(list, act, Relay::All);
        bus.link(act, coll, Relay::FetchOnly);

        bus.emit(list, Signal::Changed);
        bus.flush();
        assert_eq!(on_act.changed_count(), 1);
        assert_eq!(on_coll.changed_count(), 0);
    }

    #[test]
    fn fetch_climbs_every_relay() {
        let (list, act, coll) = keys();
        let mut bus = SignalBus::default();
        let mut on_coll = bus.subscribe(coll);
        bus.link(list, act, Relay::All);
        bus.link(act, coll, Relay::FetchOnly);

        let req = FetchRequest::new("https://pump.example/replies", ResponseKind::ObjectList);
        bus.emit(list, Signal::Fetch(req.clone()));
        let out = bus.flush();
        assert_eq!(out, vec![req.clone()]);
        assert_eq!(on_coll.drain(), vec![Signal::Fetch(req)]);
    }

    #[test]
    fn relinking_does_not_duplicate() {
        let (list, act, _) = keys();
        let mut bus = SignalBus::default();
        let mut on_act = bus.subscribe(act);
        assert!(bus.link(list, act, Relay::All));
        assert!(!bus.link(list, act, Relay::All));
        assert!(!bus.link(list, act, Relay::FetchOnly));

        bus.emit(list, Signal::Changed);
        bus.emit(list, Signal::Changed);
        bus.flush();
        assert_eq!(on_act.changed_count(), 1);
    }

    #[test]
    fn cycles_terminate() {
        let (list, act, _) = keys();
        let mut bus = SignalBus::default();
        let mut on_list = bus.subscribe(list);
        bus.link(list, act, Relay::All);
        bus.link(act, list, Relay::All);
        bus.emit(act, Signal::Changed);
        bus.flush();
        assert_eq!(on_list.changed_count(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let (list, _, _) = keys();
        let mut bus = SignalBus::default();
        let sub = bus.subscribe(list);
        drop(sub);
        bus.emit(list, Signal::Changed);
        bus.flush();
        assert!(bus.subscribers.is_empty());
    }
}
