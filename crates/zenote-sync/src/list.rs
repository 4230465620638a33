//! Ordered block list: the canonical in-memory sequence for one page.
//!
//! The list is the single mutation surface for a page's blocks. Every entry
//! is a [`Slot`]: the block itself, its lifecycle [`SlotState`], and a
//! [`SlotKey`] that stays fixed for the slot's lifetime. Remote completions
//! address slots by key, never by a position captured when the call was
//! issued, because positions shift under inserts and deletes.
//!
//! Invariants, re-established by every mutating method:
//!
//! - `order` is index-derived: dense from 0 within each sibling group
//!   (same `parent_block_id`), in list order.
//! - Each slot remembers the `order` the store last received for it
//!   ([`Slot::remote_order`]). [`BlockList::stale_orders`] lists the saved
//!   slots whose local `order` has since moved, so the owner can re-send them.
//! - After [`BlockList::ensure_trailing_empty_slot`], the last slot is the
//!   only unsaved one and it is a text block (the typing slot).

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::trace;
use zenote_types::{Block, BlockId, BlockPatch, PageId};

use crate::identity::SlotState;

/// Local, stable handle for one slot. Never sent to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u64);

impl SlotKey {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// One entry of the list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub key: SlotKey,
    pub block: Block,
    pub state: SlotState,
    /// `order` as last sent to the store. `None` until a create is issued.
    pub remote_order: Option<u32>,
}

impl Slot {
    /// Unsaved text slot, i.e. a candidate typing slot.
    pub fn is_typing_slot(&self) -> bool {
        !self.block.is_persisted() && self.block.kind.is_text()
    }
}

/// How [`BlockList::replace`] finds its target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotTarget {
    Key(SlotKey),
    Id(BlockId),
    Index(usize),
}

impl From<SlotKey> for SlotTarget {
    fn from(key: SlotKey) -> Self {
        SlotTarget::Key(key)
    }
}

/// Errors from list mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("no slot {0}")]
    UnknownSlot(SlotKey),
    #[error("no block with id {0}")]
    UnknownBlock(BlockId),
    #[error("index {index} out of range for list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// The page's blocks, in render order.
#[derive(Debug, Clone)]
pub struct BlockList {
    page_id: PageId,
    slots: Vec<Slot>,
    next_key: u64,
}

impl BlockList {
    /// An empty list. Call [`Self::ensure_trailing_empty_slot`] before use.
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            slots: Vec::new(),
            next_key: 0,
        }
    }

    /// Build from blocks fetched on page load, sorted by `order`.
    pub fn from_blocks(page_id: PageId, mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.order);
        let mut list = Self::new(page_id);
        for block in blocks {
            let state = SlotState::for_block(&block.id, block.is_blank());
            let key = list.allocate_key();
            let remote_order = block.is_persisted().then_some(block.order);
            list.slots.push(Slot {
                key,
                block,
                state,
                remote_order,
            });
        }
        list.renumber();
        list.ensure_trailing_empty_slot();
        list
    }

    fn allocate_key(&mut self) -> SlotKey {
        let key = SlotKey(self.next_key);
        self.next_key += 1;
        key
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, key: SlotKey) -> Option<&Slot> {
        self.slots.iter().find(|s| s.key == key)
    }

    pub(crate) fn get_mut(&mut self, key: SlotKey) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.key == key)
    }

    pub fn position(&self, key: SlotKey) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }

    pub fn find_by_id(&self, id: &BlockId) -> Option<&Slot> {
        if id.is_unsaved() {
            return None;
        }
        self.slots.iter().find(|s| &s.block.id == id)
    }

    /// The trailing unsaved text slot, if the list currently has one.
    pub fn typing_slot(&self) -> Option<&Slot> {
        self.slots.last().filter(|s| s.is_typing_slot())
    }

    /// Snapshot of the blocks in render order.
    pub fn blocks(&self) -> Vec<Block> {
        self.slots.iter().map(|s| s.block.clone()).collect()
    }

    /// Where a new top-level block goes: just before the typing slot, or at
    /// the end when there is none.
    pub fn insertion_point(&self) -> usize {
        if self.typing_slot().is_some() {
            self.slots.len() - 1
        } else {
            self.slots.len()
        }
    }

    /// The `order` a block with `parent` would receive at `index`.
    pub fn order_at(&self, index: usize, parent: Option<&BlockId>) -> u32 {
        self.slots[..index.min(self.slots.len())]
            .iter()
            .filter(|s| s.block.parent_block_id.as_ref() == parent)
            .count() as u32
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert `block` at list position `index` (clamped to the end) and
    /// re-derive `order` for everything after it.
    ///
    /// A persisted `block` keeps its incoming `order` as the remote one, so a
    /// shift caused by the insert shows up in [`Self::stale_orders`].
    pub fn insert_at(&mut self, index: usize, block: Block, state: SlotState) -> SlotKey {
        let index = index.min(self.slots.len());
        let key = self.allocate_key();
        trace!(%key, index, "insert slot");
        let remote_order = block.is_persisted().then_some(block.order);
        self.slots.insert(
            index,
            Slot {
                key,
                block,
                state,
                remote_order,
            },
        );
        self.renumber();
        key
    }

    /// Insert at [`Self::insertion_point`].
    pub fn insert_before_typing_slot(&mut self, block: Block, state: SlotState) -> SlotKey {
        let index = self.insertion_point();
        self.insert_at(index, block, state)
    }

    /// Merge `patch` into an existing entry, in place.
    pub fn replace(
        &mut self,
        target: impl Into<SlotTarget>,
        patch: BlockPatch,
    ) -> Result<SlotKey, ListError> {
        let index = self.resolve(&target.into())?;
        let slot = &mut self.slots[index];
        slot.block.apply(patch);
        let key = slot.key;
        self.renumber();
        Ok(key)
    }

    /// Replace a slot's content.
    pub fn set_content(&mut self, key: SlotKey, content: impl Into<String>) -> Result<(), ListError> {
        let slot = self.get_mut(key).ok_or(ListError::UnknownSlot(key))?;
        slot.block.content = content.into();
        Ok(())
    }

    pub(crate) fn set_state(&mut self, key: SlotKey, state: SlotState) -> Result<(), ListError> {
        let slot = self.get_mut(key).ok_or(ListError::UnknownSlot(key))?;
        slot.state = state;
        Ok(())
    }

    /// Record that the slot's current `order` is being sent to the store.
    pub(crate) fn mark_sent(&mut self, key: SlotKey) -> Result<(), ListError> {
        let slot = self.get_mut(key).ok_or(ListError::UnknownSlot(key))?;
        slot.remote_order = Some(slot.block.order);
        Ok(())
    }

    /// Saved slots whose `order` differs from what the store was last sent.
    pub fn stale_orders(&self) -> Vec<SlotKey> {
        self.slots
            .iter()
            .filter(|s| s.state.is_saved())
            .filter(|s| s.remote_order.is_some_and(|order| order != s.block.order))
            .map(|s| s.key)
            .collect()
    }

    /// Remove a slot. Remaining blocks are renumbered locally; the ones
    /// already sent show up in [`Self::stale_orders`].
    pub fn remove(&mut self, key: SlotKey) -> Option<Slot> {
        let index = self.position(key)?;
        let slot = self.slots.remove(index);
        trace!(%key, index, "remove slot");
        self.renumber();
        Some(slot)
    }

    /// Remove by store id.
    pub fn remove_by_id(&mut self, id: &BlockId) -> Option<Slot> {
        let key = self.find_by_id(id)?.key;
        self.remove(key)
    }

    /// Append a fresh empty text slot unless the list already ends in an
    /// unsaved text slot. Returns the new slot's key.
    pub fn ensure_trailing_empty_slot(&mut self) -> Option<SlotKey> {
        if self.typing_slot().is_some() {
            return None;
        }
        let order = self.order_at(self.slots.len(), None);
        let block = Block::empty_text(self.page_id.clone(), order);
        let key = self.allocate_key();
        trace!(%key, order, "append typing slot");
        self.slots.push(Slot {
            key,
            block,
            state: SlotState::Empty,
            remote_order: None,
        });
        Some(key)
    }

    fn resolve(&self, target: &SlotTarget) -> Result<usize, ListError> {
        match target {
            SlotTarget::Key(key) => self.position(*key).ok_or(ListError::UnknownSlot(*key)),
            SlotTarget::Id(id) => self
                .slots
                .iter()
                .position(|s| !id.is_unsaved() && &s.block.id == id)
                .ok_or_else(|| ListError::UnknownBlock(id.clone())),
            SlotTarget::Index(index) => {
                if *index < self.slots.len() {
                    Ok(*index)
                } else {
                    Err(ListError::IndexOutOfRange {
                        index: *index,
                        len: self.slots.len(),
                    })
                }
            }
        }
    }

    /// Re-derive dense `order` values per sibling group.
    fn renumber(&mut self) {
        let mut next: HashMap<Option<BlockId>, u32> = HashMap::new();
        for slot in &mut self.slots {
            let counter = next.entry(slot.block.parent_block_id.clone()).or_insert(0);
            slot.block.order = *counter;
            *counter += 1;
        }
    }
}
