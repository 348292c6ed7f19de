use std::sync::Arc;

use signal_proto::{
    IceCandidateRecord, RoomEvent, SessionDescription, SignalRole, SignalingRoom,
};
use tracing::debug;

use crate::error::SignalError;
use crate::feed::RoomFeed;
use crate::lifecycle::LifecycleBridge;
use crate::mailbox::{Applied, MailboxStore, RoomMutation};
use crate::metrics;

/// Authorized front for the mailbox: every operation runs the session gate
/// first, and every write is announced on the room feed.
#[derive(Clone)]
pub struct MailboxService {
    mailbox: Arc<dyn MailboxStore>,
    bridge: LifecycleBridge,
    feed: RoomFeed,
}

impl MailboxService {
    pub fn new(mailbox: Arc<dyn MailboxStore>, bridge: LifecycleBridge, feed: RoomFeed) -> Self {
        Self {
            mailbox,
            bridge,
            feed,
        }
    }

    pub fn bridge(&self) -> &LifecycleBridge {
        &self.bridge
    }

    pub fn feed(&self) -> &RoomFeed {
        &self.feed
    }

    /// `None` means nobody has called yet.
    pub async fn get_room(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
    ) -> Result<Option<SignalingRoom>, SignalError> {
        let result = async {
            self.bridge.gate().authorize(caller_id, session_id).await?;
            self.mailbox.load(session_id).await
        }
        .await;
        metrics::record("get_room", &result);
        result
    }

    pub async fn post_offer(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
        offer: SessionDescription,
    ) -> Result<(), SignalError> {
        let result = self
            .write(session_id, caller_id, true, |caller| RoomMutation::Offer {
                caller_id: caller,
                offer,
            })
            .await;
        metrics::record("post_offer", &result);
        result
    }

    pub async fn post_answer(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
        answer: SessionDescription,
    ) -> Result<(), SignalError> {
        let result = self
            .write(session_id, caller_id, true, |caller| RoomMutation::Answer {
                caller_id: caller,
                answer,
            })
            .await;
        metrics::record("post_answer", &result);
        result
    }

    pub async fn add_candidate(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
        role: SignalRole,
        candidate: IceCandidateRecord,
    ) -> Result<(), SignalError> {
        let result = self
            .write(session_id, caller_id, true, |_| RoomMutation::Candidate {
                role,
                candidate,
            })
            .await;
        metrics::record("add_candidate", &result);
        result
    }

    /// Hang-up stays available to participants whatever the booking state.
    pub async fn end_room(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
    ) -> Result<(), SignalError> {
        let result = self
            .write(session_id, caller_id, false, |_| RoomMutation::End)
            .await;
        metrics::record("end_room", &result);
        result
    }

    async fn write(
        &self,
        session_id: &str,
        caller_id: Option<&str>,
        needs_signal_gate: bool,
        build: impl FnOnce(String) -> RoomMutation,
    ) -> Result<(), SignalError> {
        if needs_signal_gate {
            self.bridge.ensure_can_signal(caller_id, session_id).await?;
        } else {
            self.bridge.gate().authorize(caller_id, session_id).await?;
        }
        // The gate rejects a missing identity, so this is always populated.
        let caller = caller_id.unwrap_or_default().to_string();
        let mutation = build(caller.clone());

        match self.mailbox.mutate(session_id, mutation).await? {
            Applied::Write(room, kind) => {
                debug!(
                    session = %session_id,
                    caller = %caller,
                    event = ?kind,
                    status = ?room.status,
                    generation = room.generation,
                    "room updated"
                );
                self.feed.publish(RoomEvent {
                    session_id: session_id.to_string(),
                    kind,
                    generation: room.generation,
                });
            }
            Applied::Noop => {
                debug!(session = %session_id, caller = %caller, "end requested for absent room");
            }
        }
        Ok(())
    }
}
