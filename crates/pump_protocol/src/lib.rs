/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

/// Recipient id pump.io uses for "everyone".
pub const PUBLIC_RECIPIENT_ID: &str = "http://activityschema.org/collection/public";

const KIND_MASK: u32 = 0xFF;

/// Expected shape of the document a fetch will deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Response is ignored.
    Null,
    Collection,
    Activity,
    ObjectList,
    Object,
    ActorList,
    /// `GET /api/user/<name>`: the actor lives under `profile`.
    SelfProfile,
}

impl ResponseKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Collection => 1,
            Self::Activity => 2,
            Self::ObjectList => 3,
            Self::Object => 4,
            Self::ActorList => 5,
            Self::SelfProfile => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Null),
            1 => Some(Self::Collection),
            2 => Some(Self::Activity),
            3 => Some(Self::ObjectList),
            4 => Some(Self::Object),
            5 => Some(Self::ActorList),
            6 => Some(Self::SelfProfile),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// What to do with a response beyond merging it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TagModifiers: u32 {
        /// Page continues toward older items (append).
        const OLDER = 1 << 8;
        /// Page holds items newer than what is cached (prepend).
        const NEWER = 1 << 9;
        /// Flip the liked flag of the activity's object once merged.
        const TOGGLE_LIKE = 1 << 10;
        /// Re-fetch every timeline once merged.
        const REFRESH = 1 << 11;
    }
}

/// Response tag carried alongside a fetch request and handed back with its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseTag {
    pub kind: ResponseKind,
    #[serde(default)]
    pub modifiers: TagModifiers,
}

impl ResponseTag {
    pub const fn new(kind: ResponseKind) -> Self {
        Self {
            kind,
            modifiers: TagModifiers::empty(),
        }
    }

    pub fn with(mut self, modifiers: TagModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    pub fn is_older(&self) -> bool {
        self.modifiers.contains(TagModifiers::OLDER)
    }

    /// Integer form used by transports that only carry an opaque number.
    pub fn bits(&self) -> u32 {
        self.kind.code() | self.modifiers.bits()
    }

    /// Unknown kind codes decode to `None`; unknown modifier bits are dropped.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let kind = ResponseKind::from_code(bits & KIND_MASK)?;
        Some(Self {
            kind,
            modifiers: TagModifiers::from_bits_truncate(bits & !KIND_MASK),
        })
    }
}

impl From<ResponseKind> for ResponseTag {
    fn from(kind: ResponseKind) -> Self {
        Self::new(kind)
    }
}

/// Outbound "please fetch" request. The transport decides method and auth.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub url: String,
    pub tag: ResponseTag,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, tag: impl Into<ResponseTag>) -> Self {
        Self {
            url: url.into(),
            tag: tag.into(),
        }
    }
}
