use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use signal_proto::{BookingStatus, CallSession, Participants};

use crate::error::SignalError;

/// Read side of the booking subsystem, plus the two writes the lifecycle
/// bridge needs to mirror booking state.
#[async_trait]
pub trait BookingDirectory: Send + Sync {
    async fn participants(&self, session_id: &str) -> Result<Option<Participants>, SignalError>;
    async fn status(&self, session_id: &str) -> Result<Option<BookingStatus>, SignalError>;
    async fn register(&self, session: CallSession) -> Result<(), SignalError>;
    async fn set_status(&self, session_id: &str, status: BookingStatus)
        -> Result<(), SignalError>;
}

#[derive(Default)]
pub struct MemoryBookings {
    sessions: DashMap<String, CallSession>,
}

impl MemoryBookings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl BookingDirectory for MemoryBookings {
    async fn participants(&self, session_id: &str) -> Result<Option<Participants>, SignalError> {
        Ok(self.sessions.get(session_id).map(|entry| Participants {
            teacher_id: entry.teacher_id.clone(),
            learner_id: entry.learner_id.clone(),
        }))
    }

    async fn status(&self, session_id: &str) -> Result<Option<BookingStatus>, SignalError> {
        Ok(self.sessions.get(session_id).map(|entry| entry.status))
    }

    async fn register(&self, session: CallSession) -> Result<(), SignalError> {
        if session.teacher_id == session.learner_id {
            return Err(SignalError::InvalidPayload(
                "a session needs two distinct participants".into(),
            ));
        }
        match self.sessions.entry(session.session_id.clone()) {
            Entry::Occupied(_) => Err(SignalError::InvalidState(format!(
                "session {} is already registered",
                session.session_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn set_status(
        &self,
        session_id: &str,
        status: BookingStatus,
    ) -> Result<(), SignalError> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                entry.status = status;
                Ok(())
            }
            None => Err(SignalError::NotFound("session")),
        }
    }
}
