use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use signal_proto::SignalingRoom;
use tokio::sync::Mutex;

use super::{room, unix_now, Applied, MailboxPolicy, MailboxStore, RoomMutation};
use crate::error::SignalError;

type RoomSlot = Arc<Mutex<Option<SignalingRoom>>>;

/// Process-local mailbox. Each room sits behind its own mutex so writes to
/// one session serialize without blocking the others.
pub struct MemoryMailbox {
    rooms: DashMap<String, RoomSlot>,
    policy: MailboxPolicy,
}

impl MemoryMailbox {
    pub fn new(policy: MailboxPolicy) -> Self {
        Self {
            rooms: DashMap::new(),
            policy,
        }
    }

    fn slot(&self, session_id: &str) -> RoomSlot {
        // Clone the Arc out so no DashMap guard is held across an await.
        self.rooms
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

#[async_trait]
impl MailboxStore for MemoryMailbox {
    async fn load(&self, session_id: &str) -> Result<Option<SignalingRoom>, SignalError> {
        let slot = match self.rooms.get(session_id) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        let guard = slot.lock().await;
        Ok(guard.clone())
    }

    async fn mutate(
        &self,
        session_id: &str,
        mutation: RoomMutation,
    ) -> Result<Applied, SignalError> {
        let slot = match self.rooms.get(session_id) {
            Some(entry) => entry.clone(),
            None => {
                // Dry run against an empty room; only a write earns an entry.
                let dry_run = room::apply(None, session_id, &mutation, &self.policy, unix_now())?;
                if let Applied::Noop = dry_run {
                    return Ok(dry_run);
                }
                self.slot(session_id)
            }
        };
        let mut guard = slot.lock().await;
        let applied = room::apply(guard.clone(), session_id, &mutation, &self.policy, unix_now())?;
        if let Applied::Write(updated, _) = &applied {
            *guard = Some(updated.clone());
        }
        Ok(applied)
    }

    async fn expire(&self, session_id: &str) -> Result<bool, SignalError> {
        let removed = self.rooms.remove(session_id);
        match removed {
            Some((_, slot)) => Ok(slot.lock().await.is_some()),
            None => Ok(false),
        }
    }
}
