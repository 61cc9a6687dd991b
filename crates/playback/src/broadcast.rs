use shared::protocol::ServerEvent;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of server events to every connected client.
///
/// Delivery is best-effort: publishing with nobody listening is fine, and a
/// subscriber that falls behind loses the oldest events (see
/// [`broadcast::error::RecvError::Lagged`]).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }
}
