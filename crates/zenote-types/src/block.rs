//! Block model: the unit of content on a page.
//!
//! A block is a flat record. It is addressed remotely by [`BlockId`] once
//! persisted, ordered among its siblings (same `parent_block_id`) by `order`,
//! and typed by [`BlockKind`]:
//!
//! - **Text**: `content` is plain UTF-8.
//! - **Image**: `content` is a URL; optional `width`/`height` query parameters
//!   carry the last rendered size (see [`crate::image`]).
//!
//! Timestamps are placeholders until the store confirms a create; from then on
//! the server's values win.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BlockId, PageId};

/// What a block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Plain text.
    #[default]
    Text,
    /// An uploaded image, content is its public URL.
    Image,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Image => "image",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, BlockKind::Text)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, BlockKind::Image)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A block as stored remotely and held in the editor's list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Store-assigned id, empty until the first create succeeds.
    #[serde(default)]
    pub id: BlockId,
    /// Owning page.
    pub page_id: PageId,
    /// Parent block (None for top-level blocks).
    #[serde(default)]
    pub parent_block_id: Option<BlockId>,
    /// Content type.
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Text, or image URL.
    #[serde(default)]
    pub content: String,
    /// Position among siblings, ascending.
    pub order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// A fresh, unsaved, empty text block: the typing slot.
    pub fn empty_text(page_id: PageId, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: BlockId::unsaved(),
            page_id,
            parent_block_id: None,
            kind: BlockKind::Text,
            content: String::new(),
            order,
            created_at: now,
            updated_at: now,
        }
    }

    /// An image block pointing at `url`. The id is filled in by the caller
    /// once the store has assigned one.
    pub fn image(page_id: PageId, order: u32, url: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Image,
            content: url.into(),
            ..Self::empty_text(page_id, order)
        }
    }

    /// Whether the remote store has assigned an id.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_unsaved()
    }

    /// Whether the block carries no content.
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
    }

    /// Merge the fields present in `patch`.
    pub fn apply(&mut self, patch: BlockPatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// A partial update merged into an existing block.
///
/// Used for reconciliation: when a create returns, the placeholder entry
/// receives the server's id and timestamps in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPatch {
    pub id: Option<BlockId>,
    pub content: Option<String>,
    pub order: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BlockPatch {
    /// Patch carrying the authoritative fields of a confirmed create.
    pub fn confirmed(id: BlockId, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            ..Self::default()
        }
    }

    /// Patch replacing only the content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}
