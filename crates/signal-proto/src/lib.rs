//! Shared protocol definitions for the call signaling mailbox.
//! Both the `signal-road` server and the call coordinator speak these
//! types, so keep this crate free of runtime dependencies.

use serde::{Deserialize, Serialize};

pub const OFFER_TYPE: &str = "offer";
pub const ANSWER_TYPE: &str = "answer";

/// Lifecycle of a booking as owned by the booking subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Completed,
    Declined,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Cancelled
        )
    }

    /// Allowed booking transitions. Terminal states are final.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Declined)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Completed => "completed",
            BookingStatus::Declined => "declined",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// A booking between exactly two participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSession {
    pub session_id: String,
    pub teacher_id: String,
    pub learner_id: String,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participants {
    pub teacher_id: String,
    pub learner_id: String,
}

impl Participants {
    pub fn contains(&self, caller_id: &str) -> bool {
        self.teacher_id == caller_id || self.learner_id == caller_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Offer posted, no answer yet.
    Open,
    /// Both descriptions exchanged.
    Answered,
    /// Terminated by either participant.
    Ended,
}

/// Which side of the handshake produced a description or candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalRole {
    Offer,
    Answer,
}

impl SignalRole {
    pub fn opposite(self) -> SignalRole {
        match self {
            SignalRole::Offer => SignalRole::Answer,
            SignalRole::Answer => SignalRole::Offer,
        }
    }
}

/// Session description as produced by a peer connection. `typ` is kept as a
/// free-form string so that a mismatched type can be rejected explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub typ: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            typ: OFFER_TYPE.to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            typ: ANSWER_TYPE.to_string(),
            sdp: sdp.into(),
        }
    }

    /// True when the description has the expected type and a non-empty body.
    pub fn is_valid_as(&self, expected_type: &str) -> bool {
        self.typ == expected_type && !self.sdp.trim().is_empty()
    }
}

/// Opaque ICE candidate record, shaped like `RTCIceCandidateInit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidateRecord {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateRecord {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// Structural identity used to deduplicate candidates across polls.
    pub fn dedup_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.candidate.clone())
    }
}

/// The per-session signaling mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalingRoom {
    pub session_id: String,
    pub status: RoomStatus,
    #[serde(default)]
    pub offered_by: Option<String>,
    #[serde(default)]
    pub answered_by: Option<String>,
    #[serde(default)]
    pub offer: Option<SessionDescription>,
    #[serde(default)]
    pub answer: Option<SessionDescription>,
    #[serde(default)]
    pub offer_candidates: Vec<IceCandidateRecord>,
    #[serde(default)]
    pub answer_candidates: Vec<IceCandidateRecord>,
    /// Bumped by every accepted offer.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub updated_at: i64,
}

impl SignalingRoom {
    pub fn has_live_offer(&self) -> bool {
        self.status != RoomStatus::Ended && self.offer.is_some()
    }

    pub fn has_live_answer(&self) -> bool {
        self.status != RoomStatus::Ended && self.answer.is_some()
    }

    /// An offer is waiting for an answer.
    pub fn awaiting_answer(&self) -> bool {
        self.status == RoomStatus::Open && self.offer.is_some() && self.answer.is_none()
    }

    pub fn candidates_for(&self, role: SignalRole) -> &[IceCandidateRecord] {
        match role {
            SignalRole::Offer => &self.offer_candidates,
            SignalRole::Answer => &self.answer_candidates,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidatePost {
    pub role: SignalRole,
    pub candidate: IceCandidateRecord,
}

/// Body of `POST /sessions/:id/signal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "payload", rename_all = "kebab-case")]
pub enum SignalRequest {
    CreateOffer(SessionDescription),
    CreateAnswer(SessionDescription),
    AddCandidate(CandidatePost),
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomEventKind {
    Offer,
    Answer,
    Candidate,
    Ended,
    Expired,
}

/// Change notification published on the push feed after a mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEvent {
    pub session_id: String,
    pub kind: RoomEventKind,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test_timeout::timeout]
    fn signal_request_uses_action_payload_envelope() {
        let req = SignalRequest::AddCandidate(CandidatePost {
            role: SignalRole::Answer,
            candidate: IceCandidateRecord::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host"),
        });
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["action"], "add-candidate");
        assert_eq!(value["payload"]["role"], "answer");

        let end: SignalRequest = serde_json::from_value(json!({"action": "end"})).unwrap();
        assert_eq!(end, SignalRequest::End);
    }

    #[test_timeout::timeout]
    fn description_type_is_checked() {
        assert!(SessionDescription::offer("v=0").is_valid_as(OFFER_TYPE));
        assert!(!SessionDescription::offer("v=0").is_valid_as(ANSWER_TYPE));
        assert!(!SessionDescription::offer("  ").is_valid_as(OFFER_TYPE));
    }

    #[test_timeout::timeout]
    fn booking_transitions_stop_at_terminal_states() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Accepted));
        assert!(BookingStatus::Accepted.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Accepted));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(BookingStatus::Declined.is_terminal());
    }

    #[test_timeout::timeout]
    fn dedup_key_distinguishes_mid() {
        let a = IceCandidateRecord::new("candidate:1");
        let mut b = a.clone();
        b.sdp_mid = Some("0".into());
        assert_ne!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), a.clone().dedup_key());
    }
}
