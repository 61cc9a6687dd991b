use shared::domain::{
    GlobalSettings, Item, ItemContent, ItemPatch, QueueDocument, SettingsPatch,
    DEFAULT_DURATION_SECONDS,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("item {0} is already queued")]
    DuplicateItem(String),
    #[error("index {index} out of range for queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    InvalidInput(String),
}

/// Ordered queue of items plus the global display settings.
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    items: Vec<Item>,
    settings: GlobalSettings,
}

impl ItemStore {
    pub fn new(items: Vec<Item>, settings: GlobalSettings) -> Self {
        Self { items, settings }
    }

    /// Builds the store from a loaded document. A document edited outside
    /// the service may break what the command paths guarantee, so zero
    /// durations, an unusable scale and repeated items are repaired here.
    pub fn from_document(doc: QueueDocument) -> Self {
        let QueueDocument {
            queue,
            mut settings,
            ..
        } = doc;

        if settings.default_duration_seconds == 0 {
            warn!(
                fallback = DEFAULT_DURATION_SECONDS,
                "loaded default duration was zero, using fallback"
            );
            settings.default_duration_seconds = DEFAULT_DURATION_SECONDS;
        }
        if !settings.scale.is_finite() || settings.scale <= 0.0 {
            let fallback = GlobalSettings::default().scale;
            warn!(scale = settings.scale, fallback, "loaded scale unusable, using fallback");
            settings.scale = fallback;
        }

        let mut store = Self::new(Vec::with_capacity(queue.len()), settings);
        for mut item in queue {
            if item.duration_override_seconds == Some(0) {
                warn!(id = %item.id, "dropping zero duration override from loaded item");
                item.duration_override_seconds = None;
            }
            let id = item.id.clone();
            if let Err(error) = store.append(item) {
                warn!(%id, %error, "dropping repeated item from loaded queue");
            }
        }
        store
    }

    pub fn to_document(&self) -> QueueDocument {
        QueueDocument::new(self.items.clone(), self.settings.clone())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.source_id() == Some(source_id))
    }

    pub fn append(&mut self, item: Item) -> Result<(), StoreError> {
        if let Some(source_id) = item.source_id() {
            if self.contains_source(source_id) {
                return Err(StoreError::DuplicateItem(source_id.to_string()));
            }
        }
        if self.items.iter().any(|existing| existing.id == item.id) {
            return Err(StoreError::DuplicateItem(item.id.to_string()));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Item, StoreError> {
        self.check_index(index)?;
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Swaps `index` with `index + 1`.
    pub fn swap(&mut self, index: usize) -> Result<(), StoreError> {
        let upper = index
            .checked_add(1)
            .ok_or(StoreError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })?;
        self.check_index(upper)?;
        self.items.swap(index, upper);
        Ok(())
    }

    pub fn patch_item(&mut self, index: usize, patch: &ItemPatch) -> Result<(), StoreError> {
        self.check_index(index)?;
        if patch.duration_seconds == Some(Some(0)) {
            return Err(StoreError::InvalidInput(
                "duration override must be at least one second".into(),
            ));
        }
        let item = &mut self.items[index];
        if patch.rewrites_card() && !matches!(item.content, ItemContent::Custom(_)) {
            return Err(StoreError::InvalidInput(
                "title and text can only be edited on custom cards".into(),
            ));
        }

        if let Some(theme) = &patch.theme {
            item.overrides.theme = Some(theme.clone());
        }
        if let Some(duration) = patch.duration_seconds {
            item.duration_override_seconds = duration;
        }
        if patch.toggle_pinned {
            item.overrides.pinned = Some(!item.is_pinned());
        }
        if patch.toggle_breaking {
            item.overrides.breaking = Some(!item.is_breaking());
        }
        if let ItemContent::Custom(card) = &mut item.content {
            if let Some(title) = &patch.title {
                card.title = title.clone();
            }
            if let Some(text) = &patch.text {
                card.text = text.clone();
            }
        }
        Ok(())
    }

    pub fn patch_settings(&mut self, patch: &SettingsPatch) -> Result<(), StoreError> {
        patch.validate().map_err(StoreError::InvalidInput)?;
        patch.apply_to(&mut self.settings);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(StoreError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
