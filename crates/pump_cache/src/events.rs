/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pump_protocol::FetchRequest;
use serde::Serialize;

fn now_ms_u64() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreEventKind {
    /// Transport should issue `request`.
    Fetch,
    /// A response asked for every timeline to be re-fetched.
    RefreshAll,
    /// Every cached entity was dropped.
    Reset,
}

/// Cache-wide event for the transport and shell, independent of any entity.
#[derive(Clone, Debug, Serialize)]
pub struct CoreEvent {
    pub kind: CoreEventKind,
    pub ts_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<FetchRequest>,
}

impl CoreEvent {
    pub fn new(kind: CoreEventKind, request: Option<FetchRequest>) -> Self {
        Self {
            kind,
            ts_ms: now_ms_u64(),
            request,
        }
    }

    pub fn fetch(request: FetchRequest) -> Self {
        Self::new(CoreEventKind::Fetch, Some(request))
    }
}
