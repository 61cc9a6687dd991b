use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::engine::Message;

/// The single pending auto-advance. Dropping it cancels the sleep.
///
/// Each timer carries the generation it was armed with; the playback task
/// only honours an expiry whose generation matches the timer it currently
/// holds, so an expiry that was already queued when the timer got replaced
/// is ignored.
pub(crate) struct AdvanceTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl AdvanceTimer {
    pub(crate) fn spawn(
        generation: u64,
        after: Duration,
        inbox: mpsc::WeakSender<Message>,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::TimerElapsed { generation }).await;
            }
        });
        Self { generation, task }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for AdvanceTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
