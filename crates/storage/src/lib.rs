//! Durable storage for the overlay queue.
//!
//! Everything goes through [`SnapshotStore`]: the whole queue document is
//! loaded once at startup and rewritten after every mutation. Saving is
//! write-behind (see [`spawn_write_behind`]); a failed save is logged and the
//! in-memory state stays authoritative.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::QueueDocument;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

mod blob;
mod memory;
mod sqlite;

pub use blob::BlobStore;
pub use memory::MemoryStore;
pub use sqlite::Storage;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` means nothing has been saved yet.
    async fn load(&self) -> Result<Option<QueueDocument>>;
    async fn save(&self, document: &QueueDocument) -> Result<()>;
    fn describe(&self) -> String;
}

/// Loads the stored document, falling back to an empty queue with default
/// settings when the store is empty or unreachable.
pub async fn load_or_default(store: &dyn SnapshotStore) -> QueueDocument {
    match store.load().await {
        Ok(Some(document)) => document,
        Ok(None) => {
            debug!(store = %store.describe(), "no saved queue, starting empty");
            QueueDocument::default()
        }
        Err(error) => {
            warn!(store = %store.describe(), %error, "failed to load saved queue, starting empty");
            QueueDocument::default()
        }
    }
}

/// Saves the latest published document whenever it changes.
///
/// Documents published while a save is in flight coalesce into one follow-up
/// save of the newest version. Failures are logged and not retried; the next
/// mutation produces a fresh full save. The task ends when the sender side is
/// dropped.
pub fn spawn_write_behind(
    store: Arc<dyn SnapshotStore>,
    mut documents: watch::Receiver<QueueDocument>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while documents.changed().await.is_ok() {
            let document = documents.borrow_and_update().clone().stamped();
            match store.save(&document).await {
                Ok(()) => debug!(items = document.queue.len(), "queue saved"),
                Err(error) => warn!(store = %store.describe(), %error, "failed to save queue"),
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
