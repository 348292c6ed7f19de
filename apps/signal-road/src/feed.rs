use std::sync::Arc;

use dashmap::DashMap;
use signal_proto::RoomEvent;
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 64;

/// Per-session broadcast of room changes for push subscribers.
#[derive(Clone, Default)]
pub struct RoomFeed {
    channels: Arc<DashMap<String, broadcast::Sender<RoomEvent>>>,
}

impl RoomFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, event: RoomEvent) {
        let sender = self
            .channels
            .get(&event.session_id)
            .map(|entry| entry.value().clone());
        let Some(sender) = sender else {
            return;
        };
        if sender.send(event.clone()).is_err() {
            // Every subscriber is gone.
            self.channels
                .remove_if(&event.session_id, |_, tx| tx.receiver_count() == 0);
        }
    }

    pub fn close(&self, session_id: &str) {
        self.channels.remove(session_id);
    }
}
