//! Shared page and block types for zenote.
//!
//! A leaf crate with no internal zenote dependencies: typed ids, the block
//! record the remote store persists, and the image-URL convention image
//! blocks use to remember their rendered size.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`PageId`]        | Which page a block lives on                  |
//! | [`BlockId`]       | Store-assigned block id (empty = unsaved)    |
//! | [`Block`]         | One content unit (text or image)             |
//! | [`BlockKind`]     | Text or image                                |
//! | [`BlockPatch`]    | Partial update for in-place reconciliation   |
//! | [`ImageSource`]   | Image URL with width/height hints            |
//! |-------------------|----------------------------------------------|

pub mod block;
pub mod ids;
pub mod image;

pub use block::{Block, BlockKind, BlockPatch};
pub use ids::{BlockId, PageId};
pub use image::{Dimension, ImageError, ImageSource};
