//! Playback core for the broadcast overlay: the item queue, the cursor state
//! machine, the auto-advance timer and the event fan-out.

pub mod broadcast;
pub mod deck;
pub mod engine;
pub mod store;
mod timer;

pub use broadcast::{EventBus, DEFAULT_EVENT_CAPACITY};
pub use deck::{Deck, TimerDirective, Transition};
pub use engine::{PlaybackError, PlaybackHandle, PlaybackOp};
pub use store::{ItemStore, StoreError};

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;
