//! Pure state transitions for a signaling room. Backends load the current
//! record, run [`apply`], and persist the result as one atomic unit.

use signal_proto::{
    IceCandidateRecord, RoomEventKind, RoomStatus, SessionDescription, SignalRole,
    SignalingRoom, ANSWER_TYPE, OFFER_TYPE,
};

use super::{MailboxPolicy, RoomMutation};
use crate::error::SignalError;

/// Result of applying a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Persist this room and announce the change.
    Write(SignalingRoom, RoomEventKind),
    /// Nothing to persist (ending a room that never existed).
    Noop,
}

pub fn apply(
    current: Option<SignalingRoom>,
    session_id: &str,
    mutation: &RoomMutation,
    policy: &MailboxPolicy,
    now: i64,
) -> Result<Applied, SignalError> {
    match mutation {
        RoomMutation::Offer { caller_id, offer } => {
            validate_description(offer, OFFER_TYPE)?;
            let room = post_offer(current, session_id, caller_id, offer, policy, now);
            Ok(Applied::Write(room, RoomEventKind::Offer))
        }
        RoomMutation::Answer { caller_id, answer } => {
            let room = current.ok_or(SignalError::NotFound("room"))?;
            let room = post_answer(room, caller_id, answer, now)?;
            Ok(Applied::Write(room, RoomEventKind::Answer))
        }
        RoomMutation::Candidate { role, candidate } => {
            if candidate.candidate.trim().is_empty() {
                return Err(SignalError::InvalidPayload("empty ice candidate".into()));
            }
            let mut room = current.ok_or(SignalError::NotFound("room"))?;
            push_candidate(&mut room, *role, candidate.clone());
            room.updated_at = now;
            Ok(Applied::Write(room, RoomEventKind::Candidate))
        }
        RoomMutation::End => match current {
            Some(mut room) => {
                room.status = RoomStatus::Ended;
                room.updated_at = now;
                Ok(Applied::Write(room, RoomEventKind::Ended))
            }
            None => Ok(Applied::Noop),
        },
    }
}

fn validate_description(
    description: &SessionDescription,
    expected: &str,
) -> Result<(), SignalError> {
    if description.typ != expected {
        return Err(SignalError::InvalidPayload(format!(
            "expected description type {expected}, got {}",
            description.typ
        )));
    }
    if description.sdp.trim().is_empty() {
        return Err(SignalError::InvalidPayload("empty session description".into()));
    }
    Ok(())
}

fn post_offer(
    current: Option<SignalingRoom>,
    session_id: &str,
    caller_id: &str,
    offer: &SessionDescription,
    policy: &MailboxPolicy,
    now: i64,
) -> SignalingRoom {
    match current {
        Some(mut room) => {
            // Renegotiation: same room identity, fresh handshake.
            room.status = RoomStatus::Open;
            room.offer = Some(offer.clone());
            room.offered_by = Some(caller_id.to_string());
            room.answer = None;
            room.answered_by = None;
            if policy.reset_candidates_on_offer {
                room.offer_candidates.clear();
                room.answer_candidates.clear();
            }
            room.generation += 1;
            room.updated_at = now;
            room
        }
        None => SignalingRoom {
            session_id: session_id.to_string(),
            status: RoomStatus::Open,
            offered_by: Some(caller_id.to_string()),
            answered_by: None,
            offer: Some(offer.clone()),
            answer: None,
            offer_candidates: Vec::new(),
            answer_candidates: Vec::new(),
            generation: 1,
            updated_at: now,
        },
    }
}

fn post_answer(
    mut room: SignalingRoom,
    caller_id: &str,
    answer: &SessionDescription,
    now: i64,
) -> Result<SignalingRoom, SignalError> {
    if room.status != RoomStatus::Open {
        return Err(SignalError::InvalidState(format!(
            "room is {:?}, expected an open offer",
            room.status
        )));
    }
    if room.offer.is_none() {
        return Err(SignalError::InvalidState("no offer to answer".into()));
    }
    validate_description(answer, ANSWER_TYPE)?;
    if room.offered_by.as_deref() == Some(caller_id) {
        return Err(SignalError::InvalidState(
            "caller cannot answer its own offer".into(),
        ));
    }
    room.answer = Some(answer.clone());
    room.answered_by = Some(caller_id.to_string());
    room.status = RoomStatus::Answered;
    room.updated_at = now;
    Ok(room)
}

fn push_candidate(room: &mut SignalingRoom, role: SignalRole, candidate: IceCandidateRecord) {
    match role {
        SignalRole::Offer => room.offer_candidates.push(candidate),
        SignalRole::Answer => room.answer_candidates.push(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn policy(reset: bool) -> MailboxPolicy {
        MailboxPolicy {
            reset_candidates_on_offer: reset,
        }
    }

    fn write(applied: Applied) -> SignalingRoom {
        match applied {
            Applied::Write(room, _) => room,
            Applied::Noop => panic!("expected a write"),
        }
    }

    fn step(room: SignalingRoom, mutation: &RoomMutation, p: &MailboxPolicy) -> SignalingRoom {
        write(apply(Some(room), "s1", mutation, p, NOW).unwrap())
    }

    fn offer(caller: &str, sdp: &str) -> RoomMutation {
        RoomMutation::Offer {
            caller_id: caller.into(),
            offer: SessionDescription::offer(sdp),
        }
    }

    fn answer(caller: &str, sdp: &str) -> RoomMutation {
        RoomMutation::Answer {
            caller_id: caller.into(),
            answer: SessionDescription::answer(sdp),
        }
    }

    fn candidate(role: SignalRole, line: &str) -> RoomMutation {
        RoomMutation::Candidate {
            role,
            candidate: IceCandidateRecord::new(line),
        }
    }

    #[test_timeout::timeout]
    fn first_offer_creates_open_room() {
        let room = write(apply(None, "s1", &offer("t", "A"), &policy(true), NOW).unwrap());
        assert_eq!(room.status, RoomStatus::Open);
        assert_eq!(room.offered_by.as_deref(), Some("t"));
        assert_eq!(room.offer, Some(SessionDescription::offer("A")));
        assert!(room.offer_candidates.is_empty() && room.answer_candidates.is_empty());
        assert_eq!(room.generation, 1);
    }

    #[test_timeout::timeout]
    fn offer_answer_offer_answer_cycles_cleanly() {
        let p = policy(true);
        let mut room = None;
        for round in 0..3 {
            let offered = write(
                apply(room.take(), "s1", &offer("t", &format!("o{round}")), &p, NOW).unwrap(),
            );
            assert_eq!(offered.status, RoomStatus::Open);
            assert!(offered.answer.is_none());
            assert!(offered.answered_by.is_none());

            let answered = write(
                apply(Some(offered), "s1", &answer("l", &format!("a{round}")), &p, NOW).unwrap(),
            );
            assert_eq!(answered.status, RoomStatus::Answered);
            assert_eq!(
                answered.answer,
                Some(SessionDescription::answer(format!("a{round}")))
            );
            assert_eq!(answered.generation, round + 1);
            room = Some(answered);
        }
    }

    #[test_timeout::timeout]
    fn reoffer_candidate_handling_follows_policy() {
        for reset in [true, false] {
            let p = policy(reset);
            let room = write(apply(None, "s1", &offer("t", "A"), &p, NOW).unwrap());
            let room = step(room, &candidate(SignalRole::Offer, "c1"), &p);
            let room = step(room, &candidate(SignalRole::Answer, "c2"), &p);
            let room = step(room, &offer("t", "B"), &p);
            let expected = if reset { 0 } else { 1 };
            assert_eq!(room.offer_candidates.len(), expected);
            assert_eq!(room.answer_candidates.len(), expected);
        }
    }

    #[test_timeout::timeout]
    fn answer_preconditions() {
        let p = policy(true);
        assert!(matches!(
            apply(None, "s1", &answer("l", "B"), &p, NOW),
            Err(SignalError::NotFound(_))
        ));

        let open = write(apply(None, "s1", &offer("t", "A"), &p, NOW).unwrap());
        let bad_type = RoomMutation::Answer {
            caller_id: "l".into(),
            answer: SessionDescription::offer("B"),
        };
        assert!(matches!(
            apply(Some(open.clone()), "s1", &bad_type, &p, NOW),
            Err(SignalError::InvalidPayload(_))
        ));
        assert!(matches!(
            apply(Some(open.clone()), "s1", &answer("t", "B"), &p, NOW),
            Err(SignalError::InvalidState(_))
        ));

        let answered = write(apply(Some(open), "s1", &answer("l", "B"), &p, NOW).unwrap());
        assert!(matches!(
            apply(Some(answered.clone()), "s1", &answer("l", "C"), &p, NOW),
            Err(SignalError::InvalidState(_))
        ));

        let ended = write(apply(Some(answered), "s1", &RoomMutation::End, &p, NOW).unwrap());
        assert!(matches!(
            apply(Some(ended), "s1", &answer("l", "C"), &p, NOW),
            Err(SignalError::InvalidState(_))
        ));
    }

    #[test_timeout::timeout]
    fn offer_payload_is_validated() {
        let p = policy(true);
        let wrong = RoomMutation::Offer {
            caller_id: "t".into(),
            offer: SessionDescription::answer("A"),
        };
        assert!(matches!(
            apply(None, "s1", &wrong, &p, NOW),
            Err(SignalError::InvalidPayload(_))
        ));
        assert!(matches!(
            apply(None, "s1", &offer("t", ""), &p, NOW),
            Err(SignalError::InvalidPayload(_))
        ));
    }

    #[test_timeout::timeout]
    fn candidates_buffer_before_any_answer() {
        let p = policy(true);
        assert!(matches!(
            apply(None, "s1", &candidate(SignalRole::Offer, "c1"), &p, NOW),
            Err(SignalError::NotFound(_))
        ));
        let room = write(apply(None, "s1", &offer("t", "A"), &p, NOW).unwrap());
        let room = step(room, &candidate(SignalRole::Answer, "c9"), &p);
        assert_eq!(room.answer_candidates, vec![IceCandidateRecord::new("c9")]);
        assert!(room.answer.is_none());
    }

    #[test_timeout::timeout]
    fn ending_a_missing_room_is_a_noop() {
        assert_eq!(
            apply(None, "s1", &RoomMutation::End, &policy(true), NOW).unwrap(),
            Applied::Noop
        );
    }

    #[test_timeout::timeout]
    fn offer_after_end_starts_new_negotiation() {
        let p = policy(true);
        let room = write(apply(None, "s1", &offer("t", "A"), &p, NOW).unwrap());
        let room = write(apply(Some(room), "s1", &RoomMutation::End, &p, NOW).unwrap());
        let room = write(apply(Some(room), "s1", &offer("l", "Z"), &p, NOW).unwrap());
        assert_eq!(room.status, RoomStatus::Open);
        assert_eq!(room.offered_by.as_deref(), Some("l"));
        assert_eq!(room.generation, 2);
    }
}
