//! End-to-end editor scenarios against the in-memory store, on a paused
//! clock.

use std::sync::Arc;
use std::time::Duration;

use zenote_sync::{
    open_page, spawn_editor, BlockList, ClipboardPayload, EditorError, EditorHandle, MemoryStore,
    NewBlock, PasteOutcome, PasteRejection, SlotKey, SlotState, StoreOp, SyncConfig,
};
use zenote_types::{Block, BlockId, BlockKind, Dimension, PageId};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

fn page() -> PageId {
    PageId::new("page-1")
}

fn start(store: &MemoryStore) -> EditorHandle {
    spawn_editor(
        Arc::new(store.clone()),
        BlockList::new(page()),
        SyncConfig::default(),
    )
}

async fn open(store: &MemoryStore, config: SyncConfig) -> EditorHandle {
    open_page(Arc::new(store.clone()), page(), config)
        .await
        .expect("open page")
}

async fn typing(editor: &EditorHandle) -> SlotKey {
    editor
        .typing_slot()
        .await
        .expect("editor alive")
        .expect("typing slot present")
}

async fn key_of(editor: &EditorHandle, id: &str) -> SlotKey {
    editor
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .find(|v| v.block.id.as_str() == id)
        .map(|v| v.key)
        .expect("block present")
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn seeded(content: &str, order: u32) -> Block {
    let mut block = Block::empty_text(page(), order);
    block.content = content.into();
    block
}

#[tokio::test(start_paused = true)]
async fn typing_hello_creates_once_and_appends_a_fresh_slot() {
    let store = MemoryStore::new();
    let editor = start(&store);

    let slot = typing(&editor).await;
    editor.edit(slot, "Hello").await.unwrap();

    advance(999).await;
    assert_eq!(store.count(StoreOp::Create), 0, "window still open");

    advance(2).await;
    assert_eq!(
        store.creates(),
        vec![NewBlock {
            page_id: page(),
            parent_block_id: None,
            kind: BlockKind::Text,
            content: "Hello".into(),
            order: 0,
        }]
    );

    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].id.as_str(), "b1");
    assert_eq!(blocks[0].content, "Hello");
    assert!(blocks[1].id.is_unsaved());
    assert_eq!(blocks[1].content, "");
    assert_eq!(blocks[1].order, 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_one_call() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "H").await.unwrap();
    advance(200).await;
    editor.edit(slot, "He").await.unwrap();
    advance(200).await;
    editor.edit(slot, "Hel").await.unwrap();

    advance(999).await;
    assert_eq!(store.count(StoreOp::Create), 0);
    advance(2).await;
    assert_eq!(store.count(StoreOp::Create), 1);
    assert_eq!(store.creates()[0].content, "Hel");

    // Same for updates once persisted.
    editor.edit(slot, "Hell").await.unwrap();
    advance(300).await;
    editor.edit(slot, "Hello").await.unwrap();
    advance(1001).await;
    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id.as_str(), "b1");
    assert_eq!(updates[0].content, "Hello");
    assert_eq!(store.count(StoreOp::Create), 1, "persisted block is never re-created");
}

#[tokio::test(start_paused = true)]
async fn clearing_before_the_window_closes_sends_nothing() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "x").await.unwrap();
    advance(500).await;
    editor.edit(slot, "").await.unwrap();
    advance(3000).await;

    assert!(store.calls().is_empty());
    let views = editor.snapshot().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].state, SlotState::Empty);
    assert!(!views[0].saving);
}

#[tokio::test(start_paused = true)]
async fn two_pastes_fifty_ms_apart_make_one_image_block() {
    let store = MemoryStore::new();
    let editor = start(&store);

    let first = editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();
    advance(50).await;
    let second = editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();

    assert_eq!(first, PasteOutcome::ImageQueued);
    assert!(matches!(
        second,
        PasteOutcome::Suppressed(PasteRejection::InFlight | PasteRejection::Duplicate)
    ));

    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Upload), 1);
    let creates = store.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].kind, BlockKind::Image);

    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].kind, BlockKind::Image);
    assert_eq!(blocks[0].order, 0);
    assert!(blocks[1].id.is_unsaved());
}

#[tokio::test(start_paused = true)]
async fn image_paste_uploads_then_creates_before_the_typing_slot() {
    let store = MemoryStore::new();
    store.insert_row(seeded("intro", 0));
    let editor = open(&store, SyncConfig::default()).await;

    let outcome = editor
        .paste(ClipboardPayload::new(vec![
            zenote_sync::ClipboardItem::new("text/plain", b"ignored".to_vec()),
            zenote_sync::ClipboardItem::new("image/png", PNG.to_vec()),
        ]))
        .await
        .unwrap();
    assert_eq!(outcome, PasteOutcome::ImageQueued);
    editor.flush().await.unwrap();

    let ops: Vec<StoreOp> = store.calls().iter().map(|c| c.op()).collect();
    assert_eq!(ops, vec![StoreOp::Fetch, StoreOp::Upload, StoreOp::Create]);

    let create = &store.creates()[0];
    assert_eq!(create.kind, BlockKind::Image);
    assert_eq!(create.order, 1);
    assert!(create.content.contains("/images/page-1/"));
    assert!(create.content.ends_with(".png"));

    let blocks = editor.blocks().await.unwrap();
    let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
    assert_eq!(kinds, vec![BlockKind::Text, BlockKind::Image, BlockKind::Text]);
    assert_eq!(blocks[2].content, "", "no text block created from the paste");
    assert!(blocks[2].id.is_unsaved());
}

#[tokio::test(start_paused = true)]
async fn text_paste_passes_through() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let outcome = editor.paste(ClipboardPayload::text("hi")).await.unwrap();
    assert_eq!(outcome, PasteOutcome::PassThrough);
    editor.flush().await.unwrap();
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_upload_adds_nothing_and_reopens_the_gate() {
    let store = MemoryStore::new();
    store.fail_next(StoreOp::Upload, 1);
    let editor = start(&store);

    editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();
    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Create), 0);
    assert_eq!(editor.blocks().await.unwrap().len(), 1);

    advance(300).await;
    let retry = editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();
    assert_eq!(retry, PasteOutcome::ImageQueued);
    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_mid_debounce_cancels_the_update() {
    let store = MemoryStore::new();
    store.insert_row(seeded("a", 0));
    let editor = open(&store, SyncConfig::default()).await;
    let b1 = key_of(&editor, "b1").await;

    editor.edit(b1, "ab").await.unwrap();
    advance(500).await;
    editor.delete(b1).await.unwrap();
    advance(3000).await;

    assert!(store.updates().is_empty());
    assert_eq!(store.deletes(), vec![BlockId::new("b1")]);
    assert!(store.rows(&page()).is_empty());

    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].id.is_unsaved());
}

#[tokio::test(start_paused = true)]
async fn edits_during_an_in_flight_create_never_create_twice() {
    let store = MemoryStore::new();
    store.set_latency(StoreOp::Create, Duration::from_secs(5));
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "a").await.unwrap();
    advance(1001).await;
    assert_eq!(store.count(StoreOp::Create), 1);
    let views = editor.snapshot().await.unwrap();
    assert_eq!(views[0].state, SlotState::Creating);
    assert!(views[0].saving);

    editor.edit(slot, "ab").await.unwrap();
    advance(1001).await;
    assert_eq!(store.count(StoreOp::Create), 1, "second window closed mid-create");

    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Create), 1);
    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id.as_str(), "b1");
    assert_eq!(updates[0].content, "ab");
    assert_eq!(store.rows(&page())[0].content, "ab");
}

#[tokio::test(start_paused = true)]
async fn failed_create_keeps_content_and_retries_on_next_edit() {
    let store = MemoryStore::new();
    store.fail_next(StoreOp::Create, 1);
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "Hello").await.unwrap();
    advance(1001).await;
    let views = editor.snapshot().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].block.content, "Hello");
    assert!(views[0].block.id.is_unsaved());
    assert_eq!(views[0].state, SlotState::Typing);
    assert!(!views[0].saving);

    advance(5000).await;
    assert_eq!(store.count(StoreOp::Create), 1, "no automatic retry");

    editor.edit(slot, "Hello!").await.unwrap();
    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Create), 2);
    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks[0].id.as_str(), "b1");
    assert_eq!(blocks[0].content, "Hello!");
}

#[tokio::test(start_paused = true)]
async fn create_finishing_after_delete_does_not_resurrect() {
    let store = MemoryStore::new();
    store.set_latency(StoreOp::Create, Duration::from_secs(5));
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "ghost").await.unwrap();
    advance(1001).await;
    editor.delete(slot).await.unwrap();

    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks.len(), 1, "fresh typing slot replaces the deleted one");
    assert_eq!(blocks[0].content, "");

    editor.flush().await.unwrap();
    let blocks = editor.blocks().await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].id.is_unsaved());
    assert_eq!(store.deletes(), vec![BlockId::new("b1")]);
    assert!(store.rows(&page()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_call_times_out_and_clears_saving() {
    let store = MemoryStore::new();
    store.set_latency(StoreOp::Create, Duration::from_secs(60));
    let config = SyncConfig {
        remote_timeout_ms: 3000,
        ..SyncConfig::default()
    };
    let editor = spawn_editor(Arc::new(store.clone()), BlockList::new(page()), config);
    let slot = typing(&editor).await;

    editor.edit(slot, "slow").await.unwrap();
    advance(1001).await;
    assert!(editor.snapshot().await.unwrap()[0].saving);

    advance(3001).await;
    let view = &editor.snapshot().await.unwrap()[0];
    assert!(!view.saving);
    assert_eq!(view.state, SlotState::Typing);
    assert_eq!(view.block.content, "slow");
}

#[tokio::test(start_paused = true)]
async fn completions_patch_by_identity_while_positions_shift() {
    let store = MemoryStore::new();
    store.set_latency(StoreOp::Create, Duration::from_secs(2));
    let editor = start(&store);
    let slot = typing(&editor).await;

    // Image create lands at ~2s, ahead of the text create (1s window + 2s).
    editor.edit(slot, "text").await.unwrap();
    editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();
    advance(1001).await;
    assert_eq!(store.count(StoreOp::Create), 2);
    editor.flush().await.unwrap();

    let blocks = editor.blocks().await.unwrap();
    let summary: Vec<(BlockKind, &str, u32)> = blocks
        .iter()
        .map(|b| (b.kind, if b.kind.is_text() { b.content.as_str() } else { "" }, b.order))
        .collect();
    assert_eq!(
        summary,
        vec![
            (BlockKind::Image, "", 0),
            (BlockKind::Text, "text", 1),
            (BlockKind::Text, "", 2),
        ]
    );
    assert!(blocks[0].is_persisted() && blocks[1].is_persisted());
}

/// `(content or kind, order)` for every row the store holds, in stored order.
fn remote_rows(store: &MemoryStore) -> Vec<(String, u32)> {
    store
        .rows(&page())
        .into_iter()
        .map(|b| {
            let label = if b.kind.is_text() { b.content } else { b.kind.as_str().to_string() };
            (label, b.order)
        })
        .collect()
}

fn labels(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .map(|b| if b.kind.is_text() { b.content.clone() } else { b.kind.as_str().to_string() })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn deletes_resend_shifted_orders_so_reload_keeps_the_sequence() {
    let store = MemoryStore::new();
    store.insert_row(seeded("a", 0));
    store.insert_row(seeded("b", 1));
    store.insert_row(seeded("c", 2));
    let editor = open(&store, SyncConfig::default()).await;

    editor.delete(key_of(&editor, "b1").await).await.unwrap();
    editor.delete(key_of(&editor, "b2").await).await.unwrap();
    let slot = typing(&editor).await;
    editor.edit(slot, "d").await.unwrap();
    editor.flush().await.unwrap();

    let local = editor.blocks().await.unwrap();
    assert_eq!(labels(&local), vec!["c", "d", ""]);
    assert_eq!(
        remote_rows(&store),
        vec![("c".to_string(), 0), ("d".to_string(), 1)]
    );
    let updates = store.updates();
    assert_eq!(updates.len(), 1, "only the surviving row moved");
    assert_eq!(updates[0].id.as_str(), "b3");
    assert_eq!(updates[0].order, 0);

    drop(editor);
    let reopened = open(&store, SyncConfig::default()).await;
    assert_eq!(labels(&reopened.blocks().await.unwrap()), vec!["c", "d", ""]);
}

#[tokio::test(start_paused = true)]
async fn paste_racing_a_create_leaves_unique_remote_orders() {
    let store = MemoryStore::new();
    store.set_latency(StoreOp::Create, Duration::from_secs(2));
    let editor = start(&store);
    let slot = typing(&editor).await;

    editor.edit(slot, "text").await.unwrap();
    editor.paste(ClipboardPayload::image("image/png", PNG)).await.unwrap();
    editor.flush().await.unwrap();
    assert_eq!(store.count(StoreOp::Create), 2);

    let local = editor.blocks().await.unwrap();
    let remote = remote_rows(&store);
    assert_eq!(remote.len(), 2);
    assert_ne!(remote[0].1, remote[1].1, "sibling orders collide: {remote:?}");

    let local_rows: Vec<(String, u32)> = labels(&local[..2])
        .into_iter()
        .zip(local.iter().map(|b| b.order))
        .collect();
    assert_eq!(remote, local_rows, "store matches what the editor shows");

    drop(editor);
    let reopened = open(&store, SyncConfig::default()).await;
    assert_eq!(labels(&reopened.blocks().await.unwrap()), labels(&local));
}

#[tokio::test(start_paused = true)]
async fn flush_sends_pending_writes_immediately() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let slot = typing(&editor).await;

    let start = tokio::time::Instant::now();
    editor.edit(slot, "now").await.unwrap();
    editor.flush().await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(1000));
    assert_eq!(store.count(StoreOp::Create), 1);
    assert!(editor.blocks().await.unwrap()[0].is_persisted());
}

#[tokio::test(start_paused = true)]
async fn open_page_loads_sorted_blocks_with_trailing_slot() {
    let store = MemoryStore::new();
    store.insert_row(seeded("second", 4));
    store.insert_row(seeded("first", 1));
    let editor = open(&store, SyncConfig::default()).await;

    let views = editor.snapshot().await.unwrap();
    let contents: Vec<&str> = views.iter().map(|v| v.block.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", ""]);
    assert_eq!(views[0].state, SlotState::Persisted);
    assert_eq!(views[2].state, SlotState::Empty);
}

#[tokio::test(start_paused = true)]
async fn resize_rewrites_url_and_debounces_an_update() {
    let store = MemoryStore::new();
    store.insert_row(Block::image(page(), 0, "https://cdn.test/a.png?token=abc"));
    store.insert_row(seeded("caption", 1));
    let editor = open(&store, SyncConfig::default()).await;
    let image = key_of(&editor, "b1").await;
    let text = key_of(&editor, "b2").await;

    editor
        .resize_image(image, Dimension::Px(320), Dimension::Px(200))
        .await
        .unwrap();
    advance(1001).await;

    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].content,
        "https://cdn.test/a.png?token=abc&width=320&height=200"
    );

    let err = editor
        .resize_image(text, Dimension::Px(10), Dimension::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::NotAnImage(_)));
}

#[tokio::test(start_paused = true)]
async fn failed_update_keeps_local_content() {
    let store = MemoryStore::new();
    store.insert_row(seeded("a", 0));
    store.fail_next(StoreOp::Update, 1);
    let editor = open(&store, SyncConfig::default()).await;
    let b1 = key_of(&editor, "b1").await;

    editor.edit(b1, "local").await.unwrap();
    advance(1001).await;
    let view = editor.snapshot().await.unwrap().remove(0);
    assert_eq!(view.block.content, "local");
    assert_eq!(view.state, SlotState::Persisted);
    assert!(!view.saving);
    assert_eq!(store.rows(&page())[0].content, "a");

    editor.edit(b1, "local!").await.unwrap();
    editor.flush().await.unwrap();
    assert_eq!(store.rows(&page())[0].content, "local!");
}

#[tokio::test(start_paused = true)]
async fn unknown_slot_is_an_error() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let slot = typing(&editor).await;
    editor.delete(slot).await.unwrap();
    assert!(matches!(
        editor.edit(slot, "late").await,
        Err(EditorError::UnknownSlot(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_last_handle_cancels_pending_writes() {
    let store = MemoryStore::new();
    let editor = start(&store);
    let slot = typing(&editor).await;
    editor.edit(slot, "unsent").await.unwrap();
    drop(editor);

    advance(5000).await;
    assert!(store.calls().is_empty());
}
