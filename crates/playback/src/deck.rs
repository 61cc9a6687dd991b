//! The playback state machine.
//!
//! A [`Deck`] owns the item store, the cursor and the auto-advance flag. Every
//! operation runs to completion synchronously and returns a [`Transition`]
//! describing what the outside world has to do: which events to broadcast,
//! what to do with the pending advance timer and whether the durable state
//! changed. The deck itself never touches a clock or a channel.

use std::time::Duration;

use shared::{
    domain::{effective_settings, Item, ItemPatch, QueueDocument, SettingsPatch},
    protocol::{ServerEvent, ShowPayload, StateSnapshot, NO_CURSOR},
};
use tracing::debug;

use crate::store::{ItemStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerDirective {
    /// Leave whatever is pending alone.
    #[default]
    Keep,
    Cancel,
    /// Replace any pending timer with a fresh one.
    Arm(Duration),
}

#[derive(Debug, Default)]
pub struct Transition {
    pub events: Vec<ServerEvent>,
    pub timer: TimerDirective,
    /// Queue or settings changed and should be saved.
    pub persist: bool,
}

impl Transition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.events.is_empty() && self.timer == TimerDirective::Keep && !self.persist
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Forward,
    Back,
}

#[derive(Debug, Default)]
pub struct Deck {
    store: ItemStore,
    cursor: Option<usize>,
    auto_advance: bool,
}

impl Deck {
    pub fn new(store: ItemStore) -> Self {
        Self {
            store,
            cursor: None,
            auto_advance: false,
        }
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    pub fn document(&self) -> QueueDocument {
        self.store.to_document()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            queue: self.store.items().to_vec(),
            cursor: self
                .cursor
                .and_then(|c| i64::try_from(c).ok())
                .unwrap_or(NO_CURSOR),
            auto_advance_active: self.auto_advance,
            global_settings: self.store.settings().clone(),
        }
    }

    pub fn show(&mut self, index: usize) -> Transition {
        if index >= self.store.len() {
            debug!(index, len = self.store.len(), "ignoring show outside the queue");
            return Transition::none();
        }
        let mut t = Transition::none();
        self.show_into(index, &mut t);
        self.finish(t)
    }

    pub fn next(&mut self) -> Transition {
        self.step(Step::Forward)
    }

    pub fn prev(&mut self) -> Transition {
        self.step(Step::Back)
    }

    pub fn toggle_auto(&mut self) -> Transition {
        if self.auto_advance {
            self.auto_advance = false;
            let t = Transition {
                timer: TimerDirective::Cancel,
                ..Transition::none()
            };
            return self.finish(t);
        }
        if self.store.is_empty() {
            debug!("auto-advance stays off with an empty queue");
            return self.finish(Transition::none());
        }
        self.auto_advance = true;
        let target = self.cursor.unwrap_or(0);
        let mut t = Transition::none();
        self.show_into(target, &mut t);
        self.finish(t)
    }

    pub fn hide(&mut self) -> Transition {
        let mut t = Transition::none();
        self.go_idle(&mut t);
        self.finish(t)
    }

    pub fn append(&mut self, item: Item) -> Result<Transition, StoreError> {
        self.store.append(item)?;
        Ok(self.finish(Transition {
            persist: true,
            ..Transition::none()
        }))
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Transition, StoreError> {
        self.store.remove_at(index)?;
        let mut t = Transition {
            persist: true,
            ..Transition::none()
        };
        match self.cursor {
            _ if self.store.is_empty() => self.go_idle(&mut t),
            Some(current) if current == index => {
                self.show_into(index % self.store.len(), &mut t);
            }
            Some(current) if index < current => self.cursor = Some(current - 1),
            _ => {}
        }
        Ok(self.finish(t))
    }

    pub fn clear(&mut self) -> Transition {
        self.store.clear();
        let mut t = Transition {
            persist: true,
            ..Transition::none()
        };
        self.go_idle(&mut t);
        self.finish(t)
    }

    pub fn move_up(&mut self, index: usize) -> Result<Transition, StoreError> {
        if index == 0 {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.store.len(),
            });
        }
        self.swap_down(index - 1)
    }

    pub fn move_down(&mut self, index: usize) -> Result<Transition, StoreError> {
        self.swap_down(index)
    }

    pub fn patch_item(&mut self, index: usize, patch: &ItemPatch) -> Result<Transition, StoreError> {
        self.store.patch_item(index, patch)?;
        let mut t = Transition {
            persist: true,
            ..Transition::none()
        };
        if self.cursor == Some(index) {
            self.show_into(index, &mut t);
        }
        Ok(self.finish(t))
    }

    /// Applies a settings patch. The current item is re-sent with the new
    /// effective settings but its countdown keeps running.
    pub fn patch_settings(&mut self, patch: &SettingsPatch) -> Result<Transition, StoreError> {
        self.store.patch_settings(patch)?;
        let mut t = Transition {
            persist: true,
            ..Transition::none()
        };
        if let Some(current) = self.cursor {
            if let Some(payload) = self.show_payload(current) {
                t.events.push(ServerEvent::ShowItem(payload));
            }
        }
        Ok(self.finish(t))
    }

    /// Timer expiry. Goes through the same path as a manual `next`.
    pub fn advance(&mut self) -> Transition {
        self.next()
    }

    fn step(&mut self, step: Step) -> Transition {
        let len = self.store.len();
        if len == 0 {
            return Transition::none();
        }
        // Idle counts as cursor -1, so `prev` from Idle lands on len - 2.
        let cursor = self.cursor.map_or(NO_CURSOR, |c| c as i64);
        let len_i = len as i64;
        let target = match step {
            Step::Forward => (cursor + 1).rem_euclid(len_i),
            Step::Back => (cursor - 1 + len_i).rem_euclid(len_i),
        } as usize;
        let mut t = Transition::none();
        self.show_into(target, &mut t);
        self.finish(t)
    }

    fn swap_down(&mut self, index: usize) -> Result<Transition, StoreError> {
        self.store.swap(index)?;
        let upper = index + 1;
        self.cursor = match self.cursor {
            Some(c) if c == index => Some(upper),
            Some(c) if c == upper => Some(index),
            other => other,
        };
        Ok(self.finish(Transition {
            persist: true,
            ..Transition::none()
        }))
    }

    /// Caller guarantees `index` is in range.
    fn show_into(&mut self, index: usize, t: &mut Transition) {
        let Some(payload) = self.show_payload(index) else {
            return;
        };
        self.cursor = Some(index);
        t.timer = if self.auto_advance && !payload.is_pinned {
            let item = &payload.item;
            let seconds = item.effective_duration_seconds(self.store.settings());
            TimerDirective::Arm(Duration::from_secs(u64::from(seconds)))
        } else {
            TimerDirective::Cancel
        };
        debug!(index, timer = ?t.timer, "showing item");
        t.events.push(ServerEvent::ShowItem(payload));
    }

    fn show_payload(&self, index: usize) -> Option<ShowPayload> {
        let item = self.store.get(index)?;
        let effective = effective_settings(self.store.settings(), &item.overrides);
        Some(ShowPayload {
            item: item.clone(),
            display_position: index + 1,
            total: self.store.len(),
            is_pinned: effective.pinned,
            is_breaking: effective.breaking,
            effective_settings: effective,
        })
    }

    fn go_idle(&mut self, t: &mut Transition) {
        self.cursor = None;
        self.auto_advance = false;
        t.timer = TimerDirective::Cancel;
        t.events.push(ServerEvent::HideItem);
    }

    fn finish(&self, mut t: Transition) -> Transition {
        t.events.push(ServerEvent::StateUpdate(self.snapshot()));
        t
    }
}

#[cfg(test)]
#[path = "tests/deck_tests.rs"]
mod tests;
