//! Engine configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.
//! Every value here is the default for a [`crate::SyncConfig`] field.

use std::time::Duration;

/// Quiet period after the last edit of a block before its remote write fires.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

/// A second image paste inside this window after an accepted one is dropped.
///
/// Covers the same clipboard event being delivered twice (page-level listener
/// plus the focused block's own listener).
pub const PASTE_DEDUP_WINDOW: Duration = Duration::from_millis(200);

/// Upper bound on any single remote call (create, update, delete, upload).
///
/// Without it a stalled request would keep a block's "Saving…" indicator up
/// forever.
pub const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Storage bucket pasted images are uploaded into.
pub const DEFAULT_IMAGE_BUCKET: &str = "images";

/// Prefix for staged clipboard image files in the temp directory.
pub const STAGED_IMAGE_PREFIX: &str = "zenote_image_";
