//! Block identity: new vs. persisted, and the per-slot state machine.
//!
//! A slot is *new* while it has no remote id and no create has been started
//! for it. The saved flag (any state from `Creating` on) is what keeps a
//! second create from ever being issued for the same slot.
//!
//! # State Machine
//!
//! ```text
//!            edit(text)              debounce fires
//!   Empty ──────────────▶ Typing ──────────────────▶ Creating
//!     ▲  ◀──────────────    │                          │   │
//!     │     edit("")        │                 ok       │   │ failed
//!     │                     │        ┌─────────────────┘   └──▶ Typing / Empty
//!     │                     │        ▼
//!     │                     │    Persisted ◀────────┐
//!     │                     │        │ edit         │ update finished
//!     │                     │        ▼              │
//!     │                     │     Editing ──────────┘
//!     │                     ▼
//!     └──────────────────▶ Deleted   (from any live state; terminal)
//! ```
//!
//! `Creating` is non-reentrant: a second flush while a create is in flight is
//! rejected with [`TransitionError::CreateInFlight`].

use thiserror::Error;
use zenote_types::BlockId;

/// Whether a block still needs a create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// No remote identity and no create started.
    New,
    /// Has (or is about to receive) a remote identity; only updates from here.
    Persisted,
}

/// Classify a block from its id and saved flag.
///
/// `New` exactly when the id is empty and the slot is not marked saved.
pub fn classify(id: &BlockId, saved: bool) -> Identity {
    if id.is_unsaved() && !saved {
        Identity::New
    } else {
        Identity::Persisted
    }
}

/// Lifecycle state of one slot in the block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Unsaved, no content. The idle typing slot.
    Empty,
    /// Unsaved, has content, create not yet sent.
    Typing,
    /// Create in flight.
    Creating,
    /// Remote copy matches local.
    Persisted,
    /// Local edits not yet confirmed by an update.
    Editing,
    /// Removed. Terminal.
    Deleted,
}

/// Inputs to the slot state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    /// Local content changed.
    Edit { blank: bool },
    /// The debounce window closed and a remote call is about to be issued.
    Flush,
    /// The create call returned an id.
    CreateSucceeded,
    /// The create call failed; `blank` is the slot's content at that moment.
    CreateFailed { blank: bool },
    /// An update call returned (either way).
    UpdateFinished { more_pending: bool },
    /// The slot was removed from the list.
    Delete,
}

/// Rejected transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("create already in flight")]
    CreateInFlight,
    #[error("slot was deleted")]
    SlotDeleted,
    #[error("invalid transition from {from:?} on {event:?}")]
    Invalid { from: SlotState, event: SlotEvent },
}

impl SlotState {
    /// Initial state for a block loaded from or confirmed by the store.
    pub fn for_block(id: &BlockId, blank: bool) -> Self {
        match (id.is_unsaved(), blank) {
            (false, _) => SlotState::Persisted,
            (true, true) => SlotState::Empty,
            (true, false) => SlotState::Typing,
        }
    }

    /// The saved flag: set from the moment a create is issued.
    pub fn is_saved(&self) -> bool {
        matches!(
            self,
            SlotState::Creating | SlotState::Persisted | SlotState::Editing
        )
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, SlotState::Deleted)
    }

    /// Apply `event`, returning the next state.
    pub fn transition(self, event: SlotEvent) -> Result<SlotState, TransitionError> {
        use SlotEvent as E;
        use SlotState as S;

        let next = match (self, event) {
            (S::Deleted, _) => return Err(TransitionError::SlotDeleted),
            (_, E::Delete) => S::Deleted,

            (S::Empty | S::Typing, E::Edit { blank: true }) => S::Empty,
            (S::Empty | S::Typing, E::Edit { blank: false }) => S::Typing,
            (S::Typing, E::Flush) => S::Creating,

            (S::Creating, E::Edit { .. }) => S::Creating,
            (S::Creating, E::Flush) => return Err(TransitionError::CreateInFlight),
            (S::Creating, E::CreateSucceeded) => S::Persisted,
            (S::Creating, E::CreateFailed { blank: true }) => S::Empty,
            (S::Creating, E::CreateFailed { blank: false }) => S::Typing,

            (S::Persisted | S::Editing, E::Edit { .. }) => S::Editing,
            (S::Persisted | S::Editing, E::Flush) => S::Editing,
            (S::Editing, E::UpdateFinished { more_pending: true }) => S::Editing,
            (S::Persisted | S::Editing, E::UpdateFinished { .. }) => S::Persisted,

            (from, event) => return Err(TransitionError::Invalid { from, event }),
        };
        Ok(next)
    }
}
