use std::sync::Arc;

use serde::Serialize;
use signal_proto::{BookingStatus, Participants, RoomEvent, RoomEventKind};
use tracing::{debug, info};

use crate::bookings::BookingDirectory;
use crate::error::SignalError;
use crate::feed::RoomFeed;
use crate::gate::SessionGate;
use crate::mailbox::{Applied, MailboxStore, RoomMutation};

/// Post-call work owed to collaborators once a booking settles.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Bookkeeping {
    FinalizeRecordings,
    MarkCompleted,
    IssueCertificate,
    ReleaseHold,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub session_id: String,
    pub status: BookingStatus,
    pub room_expired: bool,
    pub bookkeeping: Vec<Bookkeeping>,
}

/// Reconciles booking state with signaling permission and room lifetime.
#[derive(Clone)]
pub struct LifecycleBridge {
    gate: SessionGate,
    bookings: Arc<dyn BookingDirectory>,
    mailbox: Arc<dyn MailboxStore>,
    feed: RoomFeed,
    require_accepted: bool,
}

impl LifecycleBridge {
    pub fn new(
        bookings: Arc<dyn BookingDirectory>,
        mailbox: Arc<dyn MailboxStore>,
        feed: RoomFeed,
        require_accepted: bool,
    ) -> Self {
        Self {
            gate: SessionGate::new(Arc::clone(&bookings)),
            bookings,
            mailbox,
            feed,
            require_accepted,
        }
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub async fn can_signal(&self, session_id: &str, caller_id: &str) -> bool {
        self.ensure_can_signal(Some(caller_id), session_id)
            .await
            .is_ok()
    }

    /// Participation check plus, when configured, the `accepted` booking gate.
    pub async fn ensure_can_signal(
        &self,
        caller_id: Option<&str>,
        session_id: &str,
    ) -> Result<Participants, SignalError> {
        let participants = self.gate.authorize(caller_id, session_id).await?;
        if !self.require_accepted {
            return Ok(participants);
        }
        let status = self
            .bookings
            .status(session_id)
            .await?
            .ok_or(SignalError::NotFound("session"))?;
        if status != BookingStatus::Accepted {
            debug!(
                session = %session_id,
                status = status.as_str(),
                "signaling refused by booking state"
            );
            return Err(SignalError::InvalidState(format!(
                "booking is {}, signaling requires accepted",
                status.as_str()
            )));
        }
        Ok(participants)
    }

    pub async fn apply_transition(
        &self,
        session_id: &str,
        next: BookingStatus,
    ) -> Result<BridgeOutcome, SignalError> {
        let current = self
            .bookings
            .status(session_id)
            .await?
            .ok_or(SignalError::NotFound("session"))?;

        if current == next {
            return Ok(BridgeOutcome {
                session_id: session_id.to_string(),
                status: current,
                room_expired: false,
                bookkeeping: Vec::new(),
            });
        }
        if !current.can_transition_to(next) {
            return Err(SignalError::InvalidState(format!(
                "cannot move booking from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        self.bookings.set_status(session_id, next).await?;
        info!(
            session = %session_id,
            from = current.as_str(),
            to = next.as_str(),
            "booking transition"
        );

        let room_expired = if next.is_terminal() {
            self.retire_room(session_id).await?
        } else {
            false
        };

        Ok(BridgeOutcome {
            session_id: session_id.to_string(),
            status: next,
            room_expired,
            bookkeeping: bookkeeping_for(next),
        })
    }

    /// Ends any live call, then drops the room so nothing lingers after the
    /// booking settles.
    async fn retire_room(&self, session_id: &str) -> Result<bool, SignalError> {
        let ended = self.mailbox.mutate(session_id, RoomMutation::End).await?;
        if let Applied::Write(room, kind) = ended {
            self.feed.publish(RoomEvent {
                session_id: session_id.to_string(),
                kind,
                generation: room.generation,
            });
        }
        let expired = self.mailbox.expire(session_id).await?;
        if expired {
            self.feed.publish(RoomEvent {
                session_id: session_id.to_string(),
                kind: RoomEventKind::Expired,
                generation: 0,
            });
        }
        self.feed.close(session_id);
        Ok(expired)
    }
}

fn bookkeeping_for(status: BookingStatus) -> Vec<Bookkeeping> {
    match status {
        BookingStatus::Completed => vec![
            Bookkeeping::FinalizeRecordings,
            Bookkeeping::MarkCompleted,
            Bookkeeping::IssueCertificate,
        ],
        BookingStatus::Declined | BookingStatus::Cancelled => vec![Bookkeeping::ReleaseHold],
        BookingStatus::Pending | BookingStatus::Accepted => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::MemoryBookings;
    use crate::mailbox::{MailboxPolicy, MemoryMailbox};
    use signal_proto::{CallSession, SessionDescription};

    async fn bridge(
        status: BookingStatus,
        require_accepted: bool,
    ) -> (LifecycleBridge, Arc<MemoryMailbox>) {
        let bookings = MemoryBookings::new();
        bookings
            .register(CallSession {
                session_id: "s1".into(),
                teacher_id: "t".into(),
                learner_id: "l".into(),
                status,
            })
            .await
            .unwrap();
        let mailbox = Arc::new(MemoryMailbox::new(MailboxPolicy::default()));
        let bridge = LifecycleBridge::new(
            bookings,
            mailbox.clone(),
            RoomFeed::new(),
            require_accepted,
        );
        (bridge, mailbox)
    }

    #[test_timeout::tokio_timeout_test]
    async fn pending_booking_blocks_signaling_when_strict() {
        let (strict, _) = bridge(BookingStatus::Pending, true).await;
        assert!(!strict.can_signal("s1", "t").await);
        assert!(matches!(
            strict.ensure_can_signal(Some("t"), "s1").await,
            Err(SignalError::InvalidState(_))
        ));

        let (lenient, _) = bridge(BookingStatus::Pending, false).await;
        assert!(lenient.can_signal("s1", "t").await);
        assert!(!lenient.can_signal("s1", "stranger").await);
    }

    #[test_timeout::tokio_timeout_test]
    async fn completion_expires_room_and_schedules_bookkeeping() {
        let (bridge, mailbox) = bridge(BookingStatus::Accepted, true).await;
        mailbox
            .mutate(
                "s1",
                RoomMutation::Offer {
                    caller_id: "t".into(),
                    offer: SessionDescription::offer("A"),
                },
            )
            .await
            .unwrap();

        let outcome = bridge
            .apply_transition("s1", BookingStatus::Completed)
            .await
            .unwrap();
        assert!(outcome.room_expired);
        assert_eq!(
            outcome.bookkeeping,
            vec![
                Bookkeeping::FinalizeRecordings,
                Bookkeeping::MarkCompleted,
                Bookkeeping::IssueCertificate
            ]
        );
        assert!(mailbox.load("s1").await.unwrap().is_none());
        assert!(!bridge.can_signal("s1", "t").await);
    }

    #[test_timeout::tokio_timeout_test]
    async fn illegal_transitions_are_rejected() {
        let (bridge, _) = bridge(BookingStatus::Pending, true).await;
        assert!(matches!(
            bridge.apply_transition("s1", BookingStatus::Completed).await,
            Err(SignalError::InvalidState(_))
        ));
        let outcome = bridge
            .apply_transition("s1", BookingStatus::Accepted)
            .await
            .unwrap();
        assert!(!outcome.room_expired);
        assert!(outcome.bookkeeping.is_empty());

        let repeat = bridge
            .apply_transition("s1", BookingStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(repeat.status, BookingStatus::Accepted);
        assert!(matches!(
            bridge.apply_transition("nope", BookingStatus::Accepted).await,
            Err(SignalError::NotFound(_))
        ));
    }
}
