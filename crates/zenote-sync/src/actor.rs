//! The editor actor: owns one page's block list and drives every remote
//! write for it.
//!
//! Callers hold a cloneable [`EditorHandle`]. Commands go over an mpsc
//! channel and are answered on a oneshot. The actor is the only writer of
//! the list, so every mutation (local edits, timer fires, remote
//! completions) is serialized through one loop.
//!
//! ```text
//!   EditorHandle (Clone)      mpsc       EditorActor (tokio task)
//!   ┌──────────────────┐  ────────▶  ┌──────────────────────────────┐
//!   │ .edit()          │             │ BlockList                    │
//!   │ .delete()        │  ◀────────  │ DebounceQueue<SlotKey>       │
//!   │ .paste()         │   oneshot   │ PasteGate                    │
//!   │ .snapshot()      │             │                              │
//!   └──────────────────┘             └───────▲──────────────┬───────┘
//!                                    elapsed │              │ spawn
//!                                 completion │              ▼
//!                                      ┌─────┴──────────────────────┐
//!                                      │ RemoteStore calls (tasks)  │
//!                                      └────────────────────────────┘
//! ```
//!
//! Remote calls run as detached tasks and report back as [`Completion`]s
//! addressed by [`SlotKey`]. A completion whose slot is gone is discarded;
//! a create whose slot was deleted while it was in flight has its new row
//! deleted again.
//!
//! Deletes and inserts shift the `order` of their neighbours. Every saved
//! block whose `order` moved is queued for an update like any other edit, so
//! the store's ordering matches what the user sees.
//!
//! Dropping every handle stops the actor and cancels pending debounced
//! writes. Calls already in flight run to completion unobserved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use zenote_types::{Block, BlockId, BlockPatch, Dimension, ImageError, ImageSource, PageId};

use crate::config::SyncConfig;
use crate::debounce::{DebounceQueue, Due, Elapsed};
use crate::identity::{classify, Identity, SlotEvent, SlotState, TransitionError};
use crate::list::{BlockList, ListError, SlotKey};
use crate::paste::{
    upload_pasted_image, ClipboardPayload, PasteError, PasteGate, PasteKind, PasteOutcome,
    PastePermit,
};
use crate::store::{with_timeout, BlockUpdate, CreatedBlock, NewBlock, RemoteStore, StoreError};

// ============================================================================
// Error Type
// ============================================================================

/// Errors returned to [`EditorHandle`] callers.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no slot {0}")]
    UnknownSlot(SlotKey),
    #[error("{0} is not an image block")]
    NotAnImage(SlotKey),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error("editor shut down")]
    Shutdown,
}

// ============================================================================
// Views
// ============================================================================

/// One slot as seen from outside the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub key: SlotKey,
    pub block: Block,
    pub state: SlotState,
    /// A write is pending or in flight for this slot ("Saving…").
    pub saving: bool,
}

// ============================================================================
// Commands and completions (internal)
// ============================================================================

enum EditorCommand {
    Edit {
        key: SlotKey,
        content: String,
        reply: oneshot::Sender<Result<(), EditorError>>,
    },
    Delete {
        key: SlotKey,
        reply: oneshot::Sender<Result<(), EditorError>>,
    },
    ResizeImage {
        key: SlotKey,
        width: Dimension,
        height: Dimension,
        reply: oneshot::Sender<Result<(), EditorError>>,
    },
    Paste {
        payload: ClipboardPayload,
        reply: oneshot::Sender<PasteOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<SlotView>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// A remote call finished.
enum Completion {
    Created {
        key: SlotKey,
        result: Result<CreatedBlock, StoreError>,
    },
    Updated {
        key: SlotKey,
        result: Result<(), StoreError>,
    },
    Deleted {
        id: BlockId,
        result: Result<(), StoreError>,
    },
    ImageUploaded {
        result: Result<String, PasteError>,
        permit: PastePermit,
    },
    ImageCreated {
        block: Block,
        result: Result<CreatedBlock, StoreError>,
        permit: PastePermit,
    },
}

// ============================================================================
// EditorHandle (public API)
// ============================================================================

/// Cloneable handle to a running editor.
#[derive(Clone)]
pub struct EditorHandle {
    tx: mpsc::UnboundedSender<EditorCommand>,
    page_id: PageId,
}

impl EditorHandle {
    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EditorCommand,
    ) -> Result<T, EditorError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| EditorError::Shutdown)?;
        rx.await.map_err(|_| EditorError::Shutdown)
    }

    /// Replace a slot's content and (re)start its debounce window.
    pub async fn edit(&self, key: SlotKey, content: impl Into<String>) -> Result<(), EditorError> {
        let content = content.into();
        self.request(|reply| EditorCommand::Edit {
            key,
            content,
            reply,
        })
        .await?
    }

    /// Remove a slot. Persisted blocks are deleted remotely.
    pub async fn delete(&self, key: SlotKey) -> Result<(), EditorError> {
        self.request(|reply| EditorCommand::Delete { key, reply })
            .await?
    }

    /// Rewrite an image block's size parameters.
    pub async fn resize_image(
        &self,
        key: SlotKey,
        width: Dimension,
        height: Dimension,
    ) -> Result<(), EditorError> {
        self.request(|reply| EditorCommand::ResizeImage {
            key,
            width,
            height,
            reply,
        })
        .await?
    }

    /// Hand a page-level paste event to the editor.
    pub async fn paste(&self, payload: ClipboardPayload) -> Result<PasteOutcome, EditorError> {
        self.request(|reply| EditorCommand::Paste { payload, reply })
            .await
    }

    /// Every slot, in render order.
    pub async fn snapshot(&self) -> Result<Vec<SlotView>, EditorError> {
        self.request(|reply| EditorCommand::Snapshot { reply }).await
    }

    /// Blocks in render order.
    pub async fn blocks(&self) -> Result<Vec<Block>, EditorError> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|view| view.block)
            .collect())
    }

    /// Key of the trailing typing slot.
    pub async fn typing_slot(&self) -> Result<Option<SlotKey>, EditorError> {
        let views = self.snapshot().await?;
        Ok(views
            .last()
            .filter(|v| !v.block.is_persisted() && v.block.kind.is_text())
            .map(|v| v.key))
    }

    /// Fire every pending write now and wait until nothing is pending or in
    /// flight.
    pub async fn flush(&self) -> Result<(), EditorError> {
        self.request(|reply| EditorCommand::Flush { reply }).await
    }
}

// ============================================================================
// EditorActor
// ============================================================================

struct EditorActor {
    store: Arc<dyn RemoteStore>,
    config: SyncConfig,
    list: BlockList,
    queue: DebounceQueue<SlotKey>,
    gate: PasteGate,
    /// Slots deleted while their create was in flight.
    orphans: HashSet<SlotKey>,
    deletes_in_flight: usize,
    pastes_in_flight: usize,
    flush_waiters: Vec<oneshot::Sender<()>>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl EditorActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EditorCommand>,
        mut elapsed: mpsc::UnboundedReceiver<Elapsed<SlotKey>>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = elapsed.recv() => self.handle_elapsed(event),
                Some(done) = completions.recv() => self.handle_completion(done),
            }
            self.notify_flushed();
        }
        self.queue.cancel_all();
        debug!(page = %self.list.page_id(), "editor shutting down: all handles dropped");
    }

    fn handle_command(&mut self, cmd: EditorCommand) {
        match cmd {
            EditorCommand::Edit { key, content, reply } => {
                let _ = reply.send(self.edit(key, content));
            }
            EditorCommand::Delete { key, reply } => {
                let _ = reply.send(self.delete(key));
            }
            EditorCommand::ResizeImage {
                key,
                width,
                height,
                reply,
            } => {
                let _ = reply.send(self.resize_image(key, width, height));
            }
            EditorCommand::Paste { payload, reply } => {
                let _ = reply.send(self.paste(payload));
            }
            EditorCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EditorCommand::Flush { reply } => {
                for key in self.queue.pending_keys() {
                    self.queue.schedule_in(key, Duration::ZERO);
                }
                self.flush_waiters.push(reply);
            }
        }
    }

    // ── Local operations ─────────────────────────────────────────────────

    fn edit(&mut self, key: SlotKey, content: String) -> Result<(), EditorError> {
        let slot = self.list.get(key).ok_or(EditorError::UnknownSlot(key))?;
        let next = slot.state.transition(SlotEvent::Edit {
            blank: content.is_empty(),
        })?;
        self.list.set_content(key, content)?;
        self.list.set_state(key, next)?;

        if next == SlotState::Empty {
            // Cleared before the window closed: nothing to create.
            self.queue.cancel(&key);
        } else {
            self.queue.schedule(key);
        }
        trace!(%key, state = ?next, "edit");
        Ok(())
    }

    fn delete(&mut self, key: SlotKey) -> Result<(), EditorError> {
        let slot = self.list.get(key).ok_or(EditorError::UnknownSlot(key))?;
        let state = slot.state;
        state.transition(SlotEvent::Delete)?;

        let had_pending = self.queue.cancel(&key);
        let Some(slot) = self.list.remove(key) else {
            return Err(EditorError::UnknownSlot(key));
        };
        debug!(%key, block = %slot.block.id, ?state, had_pending, "delete");

        match state {
            SlotState::Empty | SlotState::Typing => {}
            SlotState::Creating => {
                self.orphans.insert(key);
            }
            SlotState::Persisted | SlotState::Editing => self.spawn_delete(slot.block.id),
            SlotState::Deleted => {}
        }
        self.list.ensure_trailing_empty_slot();
        self.sync_orders();
        Ok(())
    }

    fn resize_image(
        &mut self,
        key: SlotKey,
        width: Dimension,
        height: Dimension,
    ) -> Result<(), EditorError> {
        let slot = self.list.get(key).ok_or(EditorError::UnknownSlot(key))?;
        if !slot.block.kind.is_image() {
            return Err(EditorError::NotAnImage(key));
        }
        let content = ImageSource::parse(&slot.block.content)?
            .with_size(width, height)
            .to_content();
        self.edit(key, content)
    }

    fn paste(&mut self, payload: ClipboardPayload) -> PasteOutcome {
        let item = match payload.classify() {
            PasteKind::Text => return PasteOutcome::PassThrough,
            PasteKind::Image(item) => item.clone(),
        };
        let permit = match self.gate.try_acquire() {
            Ok(permit) => permit,
            Err(reason) => {
                debug!(%reason, "paste suppressed");
                return PasteOutcome::Suppressed(reason);
            }
        };

        self.pastes_in_flight += 1;
        let store = self.store.clone();
        let tx = self.completions.clone();
        let page_id = self.list.page_id().clone();
        let bucket = self.config.image_bucket.clone();
        let limit = self.config.remote_timeout();
        tokio::spawn(async move {
            let result = upload_pasted_image(store.as_ref(), &item, &page_id, &bucket, limit).await;
            let _ = tx.send(Completion::ImageUploaded { result, permit });
        });
        PasteOutcome::ImageQueued
    }

    fn snapshot(&self) -> Vec<SlotView> {
        self.list
            .slots()
            .iter()
            .map(|slot| SlotView {
                key: slot.key,
                block: slot.block.clone(),
                state: slot.state,
                saving: !self.queue.is_idle(&slot.key),
            })
            .collect()
    }

    // ── Timer fires ──────────────────────────────────────────────────────

    fn handle_elapsed(&mut self, event: Elapsed<SlotKey>) {
        match self.queue.poll_elapsed(&event) {
            Due::Fire => self.fire(event.key),
            Due::Deferred => trace!(key = %event.key, "call in flight, write deferred"),
            Due::Stale => trace!(key = %event.key, "stale timer"),
        }
    }

    /// The window for `key` closed: send whatever the slot holds now.
    fn fire(&mut self, key: SlotKey) {
        let Some(slot) = self.list.get(key) else {
            self.queue.complete(&key);
            return;
        };
        let identity = classify(&slot.block.id, slot.state.is_saved());
        let next = match slot.state.transition(SlotEvent::Flush) {
            Ok(next) => next,
            Err(TransitionError::CreateInFlight) => {
                warn!(%key, "create already in flight, not sending another");
                self.queue.complete(&key);
                return;
            }
            Err(err) => {
                debug!(%key, %err, "nothing to send");
                self.queue.complete(&key);
                return;
            }
        };
        let block = slot.block.clone();
        if let Err(err) = self
            .list
            .set_state(key, next)
            .and_then(|()| self.list.mark_sent(key))
        {
            warn!(%key, %err, "slot vanished before send");
            self.queue.complete(&key);
            return;
        }

        let store = self.store.clone();
        let tx = self.completions.clone();
        let limit = self.config.remote_timeout();
        match identity {
            Identity::New => {
                debug!(%key, order = block.order, "create");
                let request = NewBlock::from_block(&block);
                tokio::spawn(async move {
                    let result = with_timeout(limit, store.create_block(&request)).await;
                    let _ = tx.send(Completion::Created { key, result });
                });
            }
            Identity::Persisted => {
                debug!(%key, block = %block.id, "update");
                let request = BlockUpdate::from_block(&block);
                tokio::spawn(async move {
                    let result = with_timeout(limit, store.update_block(&request)).await;
                    let _ = tx.send(Completion::Updated { key, result });
                });
            }
        }
    }

    fn spawn_delete(&mut self, id: BlockId) {
        self.deletes_in_flight += 1;
        let store = self.store.clone();
        let tx = self.completions.clone();
        let limit = self.config.remote_timeout();
        tokio::spawn(async move {
            let result = with_timeout(limit, store.delete_block(&id)).await;
            let _ = tx.send(Completion::Deleted { id, result });
        });
    }

    // ── Completions ──────────────────────────────────────────────────────

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Created { key, result } => self.on_created(key, result),
            Completion::Updated { key, result } => self.on_updated(key, result),
            Completion::Deleted { id, result } => {
                self.deletes_in_flight = self.deletes_in_flight.saturating_sub(1);
                match result {
                    Ok(()) => debug!(block = %id, "deleted"),
                    Err(err) => warn!(block = %id, error = %err, "delete failed; block stays removed locally"),
                }
            }
            Completion::ImageUploaded { result, permit } => self.on_image_uploaded(result, permit),
            Completion::ImageCreated {
                block,
                result,
                permit,
            } => self.on_image_created(block, result, permit),
        }
    }

    fn on_created(&mut self, key: SlotKey, result: Result<CreatedBlock, StoreError>) {
        let rearm = self.queue.complete(&key);

        if self.orphans.remove(&key) {
            match result {
                Ok(created) => {
                    debug!(%key, block = %created.id, "create finished after delete, removing row");
                    self.spawn_delete(created.id);
                }
                Err(err) => debug!(%key, error = %err, "create for deleted slot failed"),
            }
            return;
        }
        let Some(slot) = self.list.get(key) else {
            debug!(%key, "stale create completion discarded");
            return;
        };
        let blank = slot.block.is_blank();
        let state = slot.state;

        match result {
            Ok(created) => {
                let id = created.id.clone();
                let patch = BlockPatch::confirmed(created.id, created.created_at, created.updated_at);
                if let Err(err) = self.list.replace(key, patch) {
                    warn!(%key, %err, "could not reconcile created block");
                    return;
                }
                self.advance(key, state, SlotEvent::CreateSucceeded);
                info!(%key, block = %id, page = %self.list.page_id(), "block created");
                self.list.ensure_trailing_empty_slot();
                self.sync_orders();
            }
            Err(err) => {
                warn!(%key, error = %err, "create failed; block stays unsaved until the next edit");
                self.advance(key, state, SlotEvent::CreateFailed { blank });
            }
        }
        if rearm {
            self.queue.schedule_in(key, Duration::ZERO);
        }
    }

    fn on_updated(&mut self, key: SlotKey, result: Result<(), StoreError>) {
        let rearm = self.queue.complete(&key);
        let Some(slot) = self.list.get(key) else {
            debug!(%key, "stale update completion discarded");
            return;
        };
        let state = slot.state;
        match result {
            Ok(()) => trace!(%key, block = %slot.block.id, "updated"),
            Err(err) => {
                warn!(%key, block = %slot.block.id, error = %err, "update failed; local content kept")
            }
        }
        let more_pending = rearm || self.queue.is_pending(&key);
        self.advance(key, state, SlotEvent::UpdateFinished { more_pending });
        if rearm {
            self.queue.schedule_in(key, Duration::ZERO);
        }
    }

    fn on_image_uploaded(&mut self, result: Result<String, PasteError>, permit: PastePermit) {
        let url = match result {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "image paste failed");
                self.pastes_in_flight = self.pastes_in_flight.saturating_sub(1);
                return;
            }
        };
        let index = self.list.insertion_point();
        let order = self.list.order_at(index, None);
        let block = Block::image(self.list.page_id().clone(), order, url);
        let request = NewBlock::from_block(&block);

        let store = self.store.clone();
        let tx = self.completions.clone();
        let limit = self.config.remote_timeout();
        tokio::spawn(async move {
            let result = with_timeout(limit, store.create_block(&request)).await;
            let _ = tx.send(Completion::ImageCreated {
                block,
                result,
                permit,
            });
        });
    }

    fn on_image_created(
        &mut self,
        mut block: Block,
        result: Result<CreatedBlock, StoreError>,
        permit: PastePermit,
    ) {
        self.pastes_in_flight = self.pastes_in_flight.saturating_sub(1);
        match result {
            Ok(created) => {
                let id = created.id.clone();
                block.apply(BlockPatch::confirmed(
                    created.id,
                    created.created_at,
                    created.updated_at,
                ));
                let key = self.list.insert_before_typing_slot(block, SlotState::Persisted);
                self.list.ensure_trailing_empty_slot();
                info!(%key, block = %id, "image block created");
                self.sync_orders();
            }
            Err(err) => warn!(error = %PasteError::Create(err), "image paste failed"),
        }
        drop(permit);
    }

    /// Queue an update for every saved slot whose `order` moved since it was
    /// last sent. An in-flight call defers it until the call returns.
    fn sync_orders(&mut self) {
        let delay = if self.flush_waiters.is_empty() {
            self.queue.window()
        } else {
            Duration::ZERO
        };
        for key in self.list.stale_orders() {
            if !self.queue.is_pending(&key) {
                trace!(%key, "order moved, scheduling update");
                self.queue.schedule_in(key, delay);
            }
        }
    }

    /// Apply `event` to a slot's state, logging rejected transitions.
    fn advance(&mut self, key: SlotKey, from: SlotState, event: SlotEvent) {
        match from.transition(event) {
            Ok(next) => {
                if let Err(err) = self.list.set_state(key, next) {
                    warn!(%key, %err, "state update on missing slot");
                }
            }
            Err(err) => warn!(%key, %err, "rejected transition"),
        }
    }

    // ── Flush ────────────────────────────────────────────────────────────

    fn is_quiet(&self) -> bool {
        self.queue.is_quiet() && self.deletes_in_flight == 0 && self.pastes_in_flight == 0
    }

    fn notify_flushed(&mut self) {
        if self.flush_waiters.is_empty() || !self.is_quiet() {
            return;
        }
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

// ============================================================================
// Spawn functions
// ============================================================================

/// Start an editor over `list`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_editor(store: Arc<dyn RemoteStore>, list: BlockList, config: SyncConfig) -> EditorHandle {
    let (tx, commands) = mpsc::unbounded_channel();
    let (elapsed_tx, elapsed) = mpsc::unbounded_channel();
    let (completions_tx, completions) = mpsc::unbounded_channel();

    let page_id = list.page_id().clone();
    let mut list = list;
    list.ensure_trailing_empty_slot();

    let actor = EditorActor {
        store,
        queue: DebounceQueue::new(config.debounce(), elapsed_tx),
        gate: PasteGate::new(config.paste_dedup()),
        config,
        list,
        orphans: HashSet::new(),
        deletes_in_flight: 0,
        pastes_in_flight: 0,
        flush_waiters: Vec::new(),
        completions: completions_tx,
    };
    tokio::spawn(actor.run(commands, elapsed, completions));
    EditorHandle { tx, page_id }
}

/// Fetch a page's blocks once and start an editor over them.
pub async fn open_page(
    store: Arc<dyn RemoteStore>,
    page_id: PageId,
    config: SyncConfig,
) -> Result<EditorHandle, StoreError> {
    let blocks = with_timeout(config.remote_timeout(), store.fetch_blocks(&page_id)).await?;
    info!(page = %page_id, count = blocks.len(), "page opened");
    let list = BlockList::from_blocks(page_id, blocks);
    Ok(spawn_editor(store, list, config))
}
