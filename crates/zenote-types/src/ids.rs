//! Typed identifiers for pages and blocks.
//!
//! Both wrap the opaque string the remote store hands out. They are never
//! parsed or compared structurally, only by equality. A `BlockId` may be
//! empty: that is the "not yet persisted" marker for a typing slot, and the
//! only id value a client ever invents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A page identifier, assigned by the remote store.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PageId(String);

/// A block identifier, assigned by the remote store on first create.
///
/// The empty id means "unsaved". See [`BlockId::unsaved`].
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct BlockId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a store-assigned id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the raw id.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the id is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// First 8 characters, for log lines only.
            pub fn short(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(ix, _)| ix)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", $name, self.0)
            }
        }
    };
}

impl_typed_id!(PageId, "PageId");
impl_typed_id!(BlockId, "BlockId");

impl BlockId {
    /// The id carried by a block the remote store has not seen yet.
    pub fn unsaved() -> Self {
        Self(String::new())
    }

    /// Whether this id still marks an unsaved block.
    pub fn is_unsaved(&self) -> bool {
        self.0.is_empty()
    }
}
