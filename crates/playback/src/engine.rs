//! The playback task.
//!
//! All playback state lives inside one spawned task. Commands and timer
//! expiries arrive on the same channel and are handled one at a time, so two
//! mutations never interleave and the timer goes through exactly the same
//! entry point as an operator pressing "next".

use shared::{
    domain::{Item, ItemPatch, QueueDocument, SettingsPatch},
    protocol::{ServerEvent, StateSnapshot},
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::{
    broadcast::EventBus,
    deck::{Deck, TimerDirective, Transition},
    store::{ItemStore, StoreError},
    timer::AdvanceTimer,
};

const INBOX_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("playback task has stopped")]
    Closed,
}

/// A state-changing operation.
#[derive(Debug, Clone)]
pub enum PlaybackOp {
    Show(usize),
    Next,
    Prev,
    ToggleAuto,
    Hide,
    Append(Item),
    RemoveAt(usize),
    Clear,
    MoveUp(usize),
    MoveDown(usize),
    PatchItem(usize, ItemPatch),
    PatchSettings(SettingsPatch),
}

pub(crate) enum Message {
    Apply {
        op: PlaybackOp,
        reply: oneshot::Sender<Result<StateSnapshot, StoreError>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    ContainsSource {
        source_id: String,
        reply: oneshot::Sender<bool>,
    },
    Subscribe {
        reply: oneshot::Sender<(StateSnapshot, broadcast::Receiver<ServerEvent>)>,
    },
    TimerElapsed {
        generation: u64,
    },
}

/// Cloneable handle to the playback task.
#[derive(Clone)]
pub struct PlaybackHandle {
    inbox: mpsc::Sender<Message>,
}

impl PlaybackHandle {
    /// Starts the playback task on the current tokio runtime.
    ///
    /// The returned receiver yields the queue document after every mutation
    /// that should be saved; the initial document is already marked as seen.
    pub fn spawn(
        document: QueueDocument,
        event_capacity: usize,
    ) -> (Self, watch::Receiver<QueueDocument>) {
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        let (documents, documents_rx) = watch::channel(document.clone());
        let actor = PlaybackActor {
            deck: Deck::new(ItemStore::from_document(document)),
            timer: None,
            generation: 0,
            bus: EventBus::new(event_capacity),
            documents,
            timer_inbox: inbox.downgrade(),
        };
        tokio::spawn(actor.run(rx));
        (Self { inbox }, documents_rx)
    }

    pub async fn apply(&self, op: PlaybackOp) -> Result<StateSnapshot, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Apply { op, reply }).await?;
        Ok(rx.await.map_err(|_| PlaybackError::Closed)??)
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Snapshot { reply }).await?;
        rx.await.map_err(|_| PlaybackError::Closed)
    }

    pub async fn contains_source(&self, source_id: &str) -> Result<bool, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::ContainsSource {
            source_id: source_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PlaybackError::Closed)
    }

    /// Registers a new listener and returns the state it starts from. Both
    /// happen in one step, so the listener misses nothing published after
    /// the snapshot.
    pub async fn subscribe(
        &self,
    ) -> Result<(StateSnapshot, broadcast::Receiver<ServerEvent>), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Subscribe { reply }).await?;
        rx.await.map_err(|_| PlaybackError::Closed)
    }

    pub async fn show(&self, index: usize) -> Result<StateSnapshot, PlaybackError> {
        self.apply(PlaybackOp::Show(index)).await
    }

    pub async fn next(&self) -> Result<StateSnapshot, PlaybackError> {
        self.apply(PlaybackOp::Next).await
    }

    pub async fn prev(&self) -> Result<StateSnapshot, PlaybackError> {
        self.apply(PlaybackOp::Prev).await
    }

    pub async fn toggle_auto(&self) -> Result<StateSnapshot, PlaybackError> {
        self.apply(PlaybackOp::ToggleAuto).await
    }

    pub async fn hide(&self) -> Result<StateSnapshot, PlaybackError> {
        self.apply(PlaybackOp::Hide).await
    }

    async fn send(&self, message: Message) -> Result<(), PlaybackError> {
        self.inbox
            .send(message)
            .await
            .map_err(|_| PlaybackError::Closed)
    }
}

struct PlaybackActor {
    deck: Deck,
    timer: Option<AdvanceTimer>,
    generation: u64,
    bus: EventBus,
    documents: watch::Sender<QueueDocument>,
    timer_inbox: mpsc::WeakSender<Message>,
}

impl PlaybackActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        info!(items = self.deck.store().len(), "playback task started");
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        info!("playback task stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Apply { op, reply } => {
                let result = self.execute(op).map(|transition| {
                    self.commit(transition);
                    self.deck.snapshot()
                });
                let _ = reply.send(result);
            }
            Message::Snapshot { reply } => {
                let _ = reply.send(self.deck.snapshot());
            }
            Message::ContainsSource { source_id, reply } => {
                let _ = reply.send(self.deck.store().contains_source(&source_id));
            }
            Message::Subscribe { reply } => {
                let _ = reply.send((self.deck.snapshot(), self.bus.subscribe()));
            }
            Message::TimerElapsed { generation } => {
                if self.timer.as_ref().map(AdvanceTimer::generation) != Some(generation) {
                    debug!(generation, "ignoring stale advance timer");
                    return;
                }
                self.timer = None;
                let transition = self.deck.advance();
                self.commit(transition);
            }
        }
    }

    fn execute(&mut self, op: PlaybackOp) -> Result<Transition, StoreError> {
        let deck = &mut self.deck;
        match op {
            PlaybackOp::Show(index) => Ok(deck.show(index)),
            PlaybackOp::Next => Ok(deck.next()),
            PlaybackOp::Prev => Ok(deck.prev()),
            PlaybackOp::ToggleAuto => Ok(deck.toggle_auto()),
            PlaybackOp::Hide => Ok(deck.hide()),
            PlaybackOp::Append(item) => deck.append(item),
            PlaybackOp::RemoveAt(index) => deck.remove_at(index),
            PlaybackOp::Clear => Ok(deck.clear()),
            PlaybackOp::MoveUp(index) => deck.move_up(index),
            PlaybackOp::MoveDown(index) => deck.move_down(index),
            PlaybackOp::PatchItem(index, patch) => deck.patch_item(index, &patch),
            PlaybackOp::PatchSettings(patch) => deck.patch_settings(&patch),
        }
    }

    fn commit(&mut self, transition: Transition) {
        match transition.timer {
            TimerDirective::Keep => {}
            TimerDirective::Cancel => {
                self.timer = None;
            }
            TimerDirective::Arm(after) => {
                self.generation += 1;
                let armed = AdvanceTimer::spawn(self.generation, after, self.timer_inbox.clone());
                let previous = self.timer.replace(armed);
                drop(previous);
                debug!(generation = self.generation, ?after, "advance timer armed");
            }
        }
        for event in transition.events {
            self.bus.publish(event);
        }
        if transition.persist {
            self.documents.send_replace(self.deck.document());
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
