use std::sync::Arc;

use signal_proto::Participants;

use crate::bookings::BookingDirectory;
use crate::error::SignalError;

/// Confirms that a caller is one of the two participants of a session.
#[derive(Clone)]
pub struct SessionGate {
    bookings: Arc<dyn BookingDirectory>,
}

impl SessionGate {
    pub fn new(bookings: Arc<dyn BookingDirectory>) -> Self {
        Self { bookings }
    }

    pub async fn authorize(
        &self,
        caller_id: Option<&str>,
        session_id: &str,
    ) -> Result<Participants, SignalError> {
        let caller_id = caller_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(SignalError::Unauthenticated)?;
        let participants = self
            .bookings
            .participants(session_id)
            .await?
            .ok_or(SignalError::NotFound("session"))?;
        if !participants.contains(caller_id) {
            tracing::debug!(
                session = %session_id,
                caller = %caller_id,
                "rejecting non-participant"
            );
            return Err(SignalError::Forbidden);
        }
        Ok(participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::MemoryBookings;
    use signal_proto::{BookingStatus, CallSession};

    async fn gate() -> SessionGate {
        let bookings = MemoryBookings::new();
        bookings
            .register(CallSession {
                session_id: "s1".into(),
                teacher_id: "t".into(),
                learner_id: "l".into(),
                status: BookingStatus::Accepted,
            })
            .await
            .unwrap();
        SessionGate::new(bookings)
    }

    #[test_timeout::tokio_timeout_test]
    async fn participants_pass_and_strangers_do_not() {
        let gate = gate().await;
        assert!(gate.authorize(Some("t"), "s1").await.is_ok());
        assert!(gate.authorize(Some("l"), "s1").await.is_ok());
        assert!(matches!(
            gate.authorize(Some("mallory"), "s1").await,
            Err(SignalError::Forbidden)
        ));
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_identity_and_unknown_session() {
        let gate = gate().await;
        assert!(matches!(
            gate.authorize(None, "s1").await,
            Err(SignalError::Unauthenticated)
        ));
        assert!(matches!(
            gate.authorize(Some(""), "s1").await,
            Err(SignalError::Unauthenticated)
        ));
        assert!(matches!(
            gate.authorize(Some("t"), "nope").await,
            Err(SignalError::NotFound(_))
        ));
    }
}
