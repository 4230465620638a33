//! Block synchronization engine for zenote.
//!
//! Keeps an optimistically edited, in-memory list of a page's blocks
//! consistent with a slower, authoritative [`RemoteStore`]:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`identity`] | New vs. persisted, and the per-slot state machine |
//! | [`debounce`] | Per-block write timers with single-flight tracking |
//! | [`list`] | Ordered block list: dense order, one trailing typing slot |
//! | [`paste`] | Clipboard classification, duplicate-paste gate, image staging |
//! | [`actor`] | The editor task that ties them together |
//! | [`store`] | The remote store contract, with [`MemoryStore`] and [`SupabaseStore`] |
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use zenote_sync::{open_page, MemoryStore, SyncConfig};
//! use zenote_types::PageId;
//!
//! let store = Arc::new(MemoryStore::new());
//! let editor = open_page(store, PageId::new("page-1"), SyncConfig::default()).await?;
//! if let Some(slot) = editor.typing_slot().await? {
//!     editor.edit(slot, "Hello").await?;
//! }
//! editor.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod identity;
pub mod list;
pub mod memory;
pub mod paste;
pub mod store;
pub mod supabase;

pub use actor::{open_page, spawn_editor, EditorError, EditorHandle, SlotView};
pub use config::{ConfigError, SyncConfig};
pub use identity::{classify, Identity, SlotEvent, SlotState, TransitionError};
pub use list::{BlockList, ListError, Slot, SlotKey, SlotTarget};
pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use paste::{
    ClipboardItem, ClipboardPayload, PasteError, PasteGate, PasteKind, PasteOutcome,
    PasteRejection,
};
pub use store::{with_timeout, BlockUpdate, CreatedBlock, NewBlock, RemoteStore, StoreError};
pub use supabase::{SupabaseConfig, SupabaseStore};
