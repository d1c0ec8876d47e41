/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Identity-preserving cache of the pump.io object graph.
//!
//! Responses are merged with [`Cache::submit_document`]; views subscribe to
//! entities and get `Changed` / `Fetch` signals back.

pub mod activity;
pub mod cache;
pub mod collection;
pub mod config;
mod dispatch;
pub mod events;
pub mod merge;
pub mod object;
pub mod object_list;
mod refresh;
pub mod registry;
pub mod signals;

pub use pump_protocol;

pub use activity::{is_like_verb, is_public_recipient, is_unlike_verb, Activity};
pub use cache::Cache;
pub use collection::Collection;
pub use config::CacheConfig;
pub use events::{CoreEvent, CoreEventKind};
pub use object::{ActorFields, Object, ObjectRole};
pub use object_list::{ListRole, ObjectList};
pub use registry::{ActivityKey, CollectionKey, EntityKey, ListKey, ObjectKey, Registry};
pub use signals::{Relay, Signal, Subscription};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
