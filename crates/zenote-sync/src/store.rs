//! The remote store contract.
//!
//! The engine sees only success or failure and the identifiers a store hands
//! back. Latency, retries, and transport are the implementation's business;
//! [`with_timeout`] bounds every call the engine makes.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zenote_types::{Block, BlockId, BlockKind, PageId};

/// Errors from a remote store call.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no block {0}")]
    NotFound(BlockId),
    #[error("store rejected the call: {0}")]
    Rejected(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("missing configuration: {0}")]
    Config(String),
}

/// Fields sent with a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBlock {
    pub page_id: PageId,
    pub parent_block_id: Option<BlockId>,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub content: String,
    pub order: u32,
}

impl NewBlock {
    pub fn from_block(block: &Block) -> Self {
        Self {
            page_id: block.page_id.clone(),
            parent_block_id: block.parent_block_id.clone(),
            kind: block.kind,
            content: block.content.clone(),
            order: block.order,
        }
    }
}

/// Authoritative fields returned by a create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedBlock {
    pub id: BlockId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields sent with an update. Addressed by `id`, which is not part of the
/// body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockUpdate {
    #[serde(skip)]
    pub id: BlockId,
    pub page_id: PageId,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub content: String,
    pub order: u32,
}

impl BlockUpdate {
    pub fn from_block(block: &Block) -> Self {
        Self {
            id: block.id.clone(),
            page_id: block.page_id.clone(),
            kind: block.kind,
            content: block.content.clone(),
            order: block.order,
        }
    }
}

/// Authoritative block storage.
///
/// Implementations must be cheap to share: the editor holds one behind an
/// `Arc` and calls it from spawned tasks.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Insert a block; the store assigns its id and timestamps.
    async fn create_block(&self, block: &NewBlock) -> Result<CreatedBlock, StoreError>;

    /// Overwrite a persisted block's fields.
    async fn update_block(&self, update: &BlockUpdate) -> Result<(), StoreError>;

    /// Remove a persisted block.
    async fn delete_block(&self, id: &BlockId) -> Result<(), StoreError>;

    /// All blocks of a page, ascending by `order`.
    async fn fetch_blocks(&self, page_id: &PageId) -> Result<Vec<Block>, StoreError>;

    /// Upload the staged file at `path` under `bucket`/`key`, returning its
    /// public URL.
    async fn upload_image(&self, path: &Path, bucket: &str, key: &str) -> Result<String, StoreError>;
}

/// Run a store call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
