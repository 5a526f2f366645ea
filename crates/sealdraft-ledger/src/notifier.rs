//! Broadcast-channel [`Notifier`].

use sealdraft_types::{Notifier, RoundEvent};
use tokio::sync::broadcast;

/// Fans round events out to every subscriber.
///
/// Events published while nobody is subscribed are dropped; slow subscribers
/// observe `RecvError::Lagged` rather than blocking publishers.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<(String, RoundEvent)>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, RoundEvent)> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, event: &RoundEvent) {
        match self.sender.send((topic.to_string(), event.clone())) {
            Ok(receivers) => {
                tracing::debug!(topic, kind = %event.kind, receivers, "event published");
            }
            Err(_) => tracing::debug!(topic, kind = %event.kind, "no subscribers"),
        }
    }
}
