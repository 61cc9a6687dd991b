use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{ItemContent, QueueDocument};
use storage::{SnapshotStore, Storage};

/// Offline maintenance for the persisted overlay queue. Run it while the
/// server is stopped, otherwise the next write-behind save overwrites it.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/overlay.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the saved queue, one line per item.
    Show,
    /// Write the saved document to a JSON file.
    Export { path: PathBuf },
    /// Replace the saved document with one read from a JSON file.
    Import { path: PathBuf },
    /// Drop the saved document.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    storage.health_check().await?;

    match cli.command {
        Command::Show => {
            let Some(document) = storage.load().await? else {
                println!("no saved queue in {}", storage.describe());
                return Ok(());
            };
            print_document(&document);
        }
        Command::Export { path } => {
            let document = storage.load().await?.unwrap_or_default();
            let json = serde_json::to_string_pretty(&document)?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("exported {} items to {}", document.queue.len(), path.display());
        }
        Command::Import { path } => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let document = parse_import(&raw)
                .with_context(|| format!("refusing to import {}", path.display()))?;
            let count = document.queue.len();
            storage.save(&document.stamped()).await?;
            println!("imported {count} items");
        }
        Command::Clear => {
            storage.clear().await?;
            println!("cleared {}", storage.describe());
        }
    }

    Ok(())
}

/// Parses an export and checks it the way the command paths would, so an
/// edited file cannot smuggle in zero durations or repeated items.
fn parse_import(raw: &str) -> Result<QueueDocument> {
    let document: QueueDocument =
        serde_json::from_str(raw).context("not a queue document")?;
    document.validate().map_err(|problem| anyhow!(problem))?;
    Ok(document)
}

fn print_document(document: &QueueDocument) {
    if let Some(updated_at) = document.updated_at {
        println!("saved at {updated_at}");
    }
    for (index, item) in document.queue.iter().enumerate() {
        let label = match &item.content {
            ItemContent::Sourced(post) => format!("@{}: {}", post.author.username, post.text),
            ItemContent::Custom(card) => format!("[card] {}", card.title),
        };
        let mut flags = String::new();
        if item.is_pinned() {
            flags.push_str(" pinned");
        }
        if item.is_breaking() {
            flags.push_str(" breaking");
        }
        println!("{index:>3} {}{flags} {label}", item.id);
    }
}
