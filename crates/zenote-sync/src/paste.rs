//! Paste ingestion: clipboard classification, the duplicate-paste gate, and
//! image staging + upload.
//!
//! An image paste goes through three steps. The gate admits it, the bytes
//! are staged to a temp file and uploaded, and the editor creates the image
//! block at the list's insertion point once it has a URL. Text pastes are
//! not handled here; they belong to the focused block.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use zenote_types::PageId;

use crate::constants::STAGED_IMAGE_PREFIX;
use crate::store::{with_timeout, RemoteStore, StoreError};

// ============================================================================
// Clipboard
// ============================================================================

/// One entry of a clipboard payload.
#[derive(Clone, PartialEq, Eq)]
pub struct ClipboardItem {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ClipboardItem {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl fmt::Debug for ClipboardItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipboardItem")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Everything a single paste event carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub items: Vec<ClipboardItem>,
}

/// What a paste is, for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteKind<'a> {
    /// First image item wins; other items of the same event are ignored.
    Image(&'a ClipboardItem),
    Text,
}

impl ClipboardPayload {
    pub fn new(items: Vec<ClipboardItem>) -> Self {
        Self { items }
    }

    pub fn image(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(vec![ClipboardItem::new(mime_type, bytes)])
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ClipboardItem::new("text/plain", text.into().into_bytes())])
    }

    pub fn classify(&self) -> PasteKind<'_> {
        match self.items.iter().find(|item| item.is_image()) {
            Some(item) => PasteKind::Image(item),
            None => PasteKind::Text,
        }
    }
}

/// Result of handing a payload to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Upload started; the image block appears when it completes.
    ImageQueued,
    /// Not an image. The focused block handles it.
    PassThrough,
    /// Dropped by the gate.
    Suppressed(PasteRejection),
}

// ============================================================================
// Gate
// ============================================================================

/// Why the gate turned a paste away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteRejection {
    #[error("duplicate paste inside the dedup window")]
    Duplicate,
    #[error("another image paste is still in flight")]
    InFlight,
}

#[derive(Debug, Default)]
struct GateState {
    last_accepted: Option<Instant>,
    in_flight: bool,
}

/// Admits at most one image paste at a time, and none within `window` of
/// the last admitted one.
#[derive(Debug, Clone)]
pub struct PasteGate {
    window: Duration,
    state: Arc<Mutex<GateState>>,
}

/// Held for the duration of one image paste. Dropping it reopens the gate.
#[derive(Debug)]
pub struct PastePermit {
    state: Arc<Mutex<GateState>>,
}

impl Drop for PastePermit {
    fn drop(&mut self) {
        self.state.lock().in_flight = false;
    }
}

impl PasteGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::default(),
        }
    }

    pub fn try_acquire(&self) -> Result<PastePermit, PasteRejection> {
        let mut state = self.state.lock();
        if state.in_flight {
            return Err(PasteRejection::InFlight);
        }
        let now = Instant::now();
        if state
            .last_accepted
            .is_some_and(|last| now.duration_since(last) < self.window)
        {
            return Err(PasteRejection::Duplicate);
        }
        state.in_flight = true;
        state.last_accepted = Some(now);
        Ok(PastePermit {
            state: self.state.clone(),
        })
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.state.lock().in_flight
    }
}

// ============================================================================
// Staging + upload
// ============================================================================

/// Errors from the image paste pipeline.
#[derive(Error, Debug)]
pub enum PasteError {
    #[error("staging clipboard image: {0}")]
    Stage(#[from] std::io::Error),
    #[error("uploading image: {0}")]
    Upload(#[source] StoreError),
    #[error("creating image block: {0}")]
    Create(#[source] StoreError),
}

/// File extension for a MIME type, `bin` when unknown.
pub fn extension_for(mime_type: &str) -> &'static str {
    let Some(extensions) = mime_guess::get_mime_extensions_str(mime_type) else {
        return "bin";
    };
    let subtype = mime_type.rsplit('/').next().unwrap_or_default();
    extensions
        .iter()
        .copied()
        .find(|ext| *ext == subtype)
        .or_else(|| extensions.first().copied())
        .unwrap_or("bin")
}

/// Clipboard bytes written to a temp file. The file is removed on drop.
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
    name: Uuid,
    extension: &'static str,
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Storage key: `<page_id>/<uuid>.<ext>`.
    pub fn object_key(&self, page_id: &PageId) -> String {
        format!("{page_id}/{}.{}", self.name, self.extension)
    }
}

/// Write `item` to `zenote_image_<uuid>.<ext>` in the system temp dir.
pub fn stage_image(item: &ClipboardItem) -> std::io::Result<StagedImage> {
    let name = Uuid::new_v4();
    let extension = extension_for(&item.mime_type);
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{STAGED_IMAGE_PREFIX}{name}"))
        .suffix(&format!(".{extension}"))
        .rand_bytes(0)
        .tempfile()?;
    file.write_all(&item.bytes)?;
    file.flush()?;
    Ok(StagedImage {
        file,
        name,
        extension,
    })
}

/// Stage and upload one pasted image, returning its public URL.
pub async fn upload_pasted_image(
    store: &dyn RemoteStore,
    item: &ClipboardItem,
    page_id: &PageId,
    bucket: &str,
    limit: Duration,
) -> Result<String, PasteError> {
    let staged = stage_image(item)?;
    let key = staged.object_key(page_id);
    debug!(path = %staged.path().display(), %key, bytes = item.bytes.len(), "uploading pasted image");
    with_timeout(limit, store.upload_image(staged.path(), bucket, &key))
        .await
        .map_err(PasteError::Upload)
}
