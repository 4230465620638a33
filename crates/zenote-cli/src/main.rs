//! zenote terminal editor.
//!
//! Opens one page and edits it line by line. Every write goes through the
//! sync engine exactly as a graphical editor would drive it.
//!
//! Usage:
//!   # Against Supabase (SUPABASE_URL, SUPABASE_API_KEY)
//!   cargo run -p zenote-cli -- --page <page-id>
//!
//!   # In-memory store, nothing leaves the process
//!   cargo run -p zenote-cli -- --page scratch --offline

mod command;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

use zenote_sync::{
    ClipboardItem, ClipboardPayload, EditorHandle, MemoryStore, PasteOutcome, RemoteStore,
    SlotKey, SupabaseConfig, SupabaseStore, SyncConfig, open_page,
};
use zenote_types::PageId;

use crate::command::{Command, HELP};

/// Edit a zenote page from the terminal.
#[derive(Parser, Debug)]
#[command(name = "zenote")]
#[command(about = "Line-oriented editor for zenote pages")]
struct Args {
    /// Page to open
    #[arg(short, long)]
    page: String,

    /// Use the in-memory store instead of Supabase
    #[arg(long)]
    offline: bool,

    /// Sync config file (RON); defaults to <config_dir>/zenote/sync.ron
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is the editor.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::load_default()?,
    };

    let store: Arc<dyn RemoteStore> = if args.offline {
        tracing::info!("Starting with in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let supabase = SupabaseConfig::from_env().context("Supabase settings")?;
        tracing::info!(url = %supabase.url, "Connecting to Supabase");
        Arc::new(SupabaseStore::new(supabase)?)
    };

    let editor = open_page(store, PageId::new(args.page), config)
        .await
        .context("opening page")?;
    show(&editor).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = run(&editor, command).await {
            println!("error: {e:#}");
        }
    }

    editor.flush().await?;
    tracing::info!("All writes flushed, exiting");
    Ok(())
}

async fn run(editor: &EditorHandle, command: Command) -> Result<()> {
    match command {
        Command::Type(text) => {
            let slot = editor
                .typing_slot()
                .await?
                .context("no empty block to type into")?;
            editor.edit(slot, text).await?;
        }
        Command::Edit { index, text } => {
            editor.edit(slot_at(editor, index).await?, text).await?;
        }
        Command::Delete(index) => {
            editor.delete(slot_at(editor, index).await?).await?;
        }
        Command::Paste(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let payload = ClipboardPayload::new(vec![ClipboardItem::new(mime.essence_str(), bytes)]);
            match editor.paste(payload).await? {
                PasteOutcome::ImageQueued => println!("uploading…"),
                PasteOutcome::PassThrough => println!("not an image; type text instead"),
                PasteOutcome::Suppressed(reason) => println!("ignored: {reason}"),
            }
        }
        Command::Resize {
            index,
            width,
            height,
        } => {
            editor
                .resize_image(slot_at(editor, index).await?, width, height)
                .await?;
        }
        Command::Show => show(editor).await?,
        Command::Flush => {
            editor.flush().await?;
            println!("flushed");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn slot_at(editor: &EditorHandle, index: usize) -> Result<SlotKey> {
    editor
        .snapshot()
        .await?
        .get(index)
        .map(|view| view.key)
        .with_context(|| format!("no block {index}"))
}

async fn show(editor: &EditorHandle) -> Result<()> {
    println!("page {}", editor.page_id());
    for (index, view) in editor.snapshot().await?.iter().enumerate() {
        let id = if view.block.is_persisted() {
            view.block.id.short().to_string()
        } else {
            "(new)".to_string()
        };
        let saving = if view.saving { " saving…" } else { "" };
        println!(
            "{index:>3} [{id:>8}] {kind:<5} #{order} {content}{saving}",
            kind = view.block.kind.as_str(),
            order = view.block.order,
            content = view.block.content,
        );
    }
    Ok(())
}
