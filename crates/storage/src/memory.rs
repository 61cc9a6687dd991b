use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use shared::domain::QueueDocument;

/// Process-local store. Useful when nothing should outlive the process, and
/// in tests, where it can be told to fail.
#[derive(Clone, Default)]
pub struct MemoryStore {
    document: Arc<Mutex<Option<QueueDocument>>>,
    failing: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: QueueDocument) -> Self {
        let store = Self::default();
        *store.lock() = Some(document);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<QueueDocument> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<QueueDocument>> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl crate::SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<QueueDocument>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory store is unavailable");
        }
        Ok(self.current())
    }

    async fn save(&self, document: &QueueDocument) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory store is unavailable");
        }
        *self.lock() = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
