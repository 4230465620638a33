//! In-process [`RemoteStore`], used offline and as the test double.
//!
//! Every call is recorded in order, before any injected latency, so a test
//! can observe a call that is still in flight. Failures and latency are
//! injected per operation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::trace;
use zenote_types::{Block, BlockId, PageId};

use crate::store::{BlockUpdate, CreatedBlock, NewBlock, RemoteStore, StoreError};

/// Which store operation a call or an injected fault targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
    Fetch,
    Upload,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Create(NewBlock),
    Update(BlockUpdate),
    Delete(BlockId),
    Fetch(PageId),
    Upload { bucket: String, key: String, bytes: usize },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Create(_) => StoreOp::Create,
            StoreCall::Update(_) => StoreOp::Update,
            StoreCall::Delete(_) => StoreOp::Delete,
            StoreCall::Fetch(_) => StoreOp::Fetch,
            StoreCall::Upload { .. } => StoreOp::Upload,
        }
    }
}

#[derive(Default)]
struct Inner {
    rows: Vec<Block>,
    objects: HashMap<String, Vec<u8>>,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOp, u32>,
    latency: HashMap<StoreOp, Duration>,
    next_id: u64,
}

/// A store that keeps everything in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row as if it had been created earlier. Assigns an id when the
    /// block has none.
    pub fn insert_row(&self, mut block: Block) -> BlockId {
        let mut inner = self.inner.lock();
        if block.id.is_unsaved() {
            inner.next_id += 1;
            block.id = BlockId::new(format!("b{}", inner.next_id));
        }
        let id = block.id.clone();
        inner.rows.push(block);
        id
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        *self.inner.lock().failures.entry(op).or_insert(0) += times;
    }

    /// Delay every call of `op` by `latency`.
    pub fn set_latency(&self, op: StoreOp, latency: Duration) {
        self.inner.lock().latency.insert(op, latency);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, op: StoreOp) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn creates(&self) -> Vec<NewBlock> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Create(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<BlockUpdate> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Update(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<BlockId> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Delete(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Rows currently stored for `page_id`, ascending by `order`.
    pub fn rows(&self, page_id: &PageId) -> Vec<Block> {
        let mut rows: Vec<Block> = self
            .inner
            .lock()
            .rows
            .iter()
            .filter(|b| &b.page_id == page_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.order);
        rows
    }

    /// Uploaded object bytes.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().objects.get(key).cloned()
    }

    /// Record `call`, then apply the configured latency and failure for it.
    async fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op();
        trace!(?op, "memory store call");
        let (latency, fail) = {
            let mut inner = self.inner.lock();
            inner.calls.push(call);
            let fail = match inner.failures.get_mut(&op) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            };
            (inner.latency.get(&op).copied(), fail)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreError::Rejected(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_block(&self, block: &NewBlock) -> Result<CreatedBlock, StoreError> {
        self.enter(StoreCall::Create(block.clone())).await?;
        let now = Utc::now();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = BlockId::new(format!("b{}", inner.next_id));
        inner.rows.push(Block {
            id: id.clone(),
            page_id: block.page_id.clone(),
            parent_block_id: block.parent_block_id.clone(),
            kind: block.kind,
            content: block.content.clone(),
            order: block.order,
            created_at: now,
            updated_at: now,
        });
        Ok(CreatedBlock {
            id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_block(&self, update: &BlockUpdate) -> Result<(), StoreError> {
        self.enter(StoreCall::Update(update.clone())).await?;
        let mut inner = self.inner.lock();
        let row = inner
            .rows
            .iter_mut()
            .find(|b| b.id == update.id)
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        row.content = update.content.clone();
        row.order = update.order;
        row.kind = update.kind;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_block(&self, id: &BlockId) -> Result<(), StoreError> {
        self.enter(StoreCall::Delete(id.clone())).await?;
        self.inner.lock().rows.retain(|b| &b.id != id);
        Ok(())
    }

    async fn fetch_blocks(&self, page_id: &PageId) -> Result<Vec<Block>, StoreError> {
        self.enter(StoreCall::Fetch(page_id.clone())).await?;
        Ok(self.rows(page_id))
    }

    async fn upload_image(&self, path: &Path, bucket: &str, key: &str) -> Result<String, StoreError> {
        let bytes = std::fs::read(path)?;
        self.enter(StoreCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            bytes: bytes.len(),
        })
        .await?;
        self.inner.lock().objects.insert(format!("{bucket}/{key}"), bytes);
        Ok(format!(
            "https://memory.invalid/storage/v1/object/public/{bucket}/{key}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zenote_types::BlockKind;

    fn new_text(content: &str, order: u32) -> NewBlock {
        NewBlock {
            page_id: PageId::new("p1"),
            parent_block_id: None,
            kind: BlockKind::Text,
            content: content.into(),
            order,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_records_calls() {
        let store = MemoryStore::new();
        let first = store.create_block(&new_text("a", 0)).await.unwrap();
        let second = store.create_block(&new_text("b", 1)).await.unwrap();
        assert_eq!(first.id.as_str(), "b1");
        assert_eq!(second.id.as_str(), "b2");
        assert_eq!(store.count(StoreOp::Create), 2);
        assert_eq!(store.rows(&PageId::new("p1")).len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Create, 1);
        assert!(store.create_block(&new_text("a", 0)).await.is_err());
        assert!(store.create_block(&new_text("a", 0)).await.is_ok());
        assert_eq!(store.count(StoreOp::Create), 2, "failed call still recorded");
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let update = BlockUpdate {
            id: BlockId::new("nope"),
            page_id: PageId::new("p1"),
            kind: BlockKind::Text,
            content: "x".into(),
            order: 0,
        };
        assert!(matches!(
            store.update_block(&update).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = MemoryStore::new();
        let id = store.insert_row(Block::empty_text(PageId::new("p1"), 0));
        store.delete_block(&id).await.unwrap();
        assert!(store.rows(&PageId::new("p1")).is_empty());
        assert_eq!(store.deletes(), vec![id]);
    }

    #[tokio::test]
    async fn upload_stores_file_bytes() {
        let store = MemoryStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG").unwrap();

        let url = store
            .upload_image(file.path(), "images", "p1/x.png")
            .await
            .unwrap();
        assert!(url.ends_with("/images/p1/x.png"));
        assert_eq!(store.object("images/p1/x.png").unwrap(), b"\x89PNG");
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_completion_but_not_recording() {
        let store = MemoryStore::new();
        store.set_latency(StoreOp::Create, Duration::from_secs(5));
        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.create_block(&new_text("a", 0)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.count(StoreOp::Create), 1);
        assert!(store.rows(&PageId::new("p1")).is_empty());
        task.await.unwrap().unwrap();
        assert_eq!(store.rows(&PageId::new("p1")).len(), 1);
    }
}
