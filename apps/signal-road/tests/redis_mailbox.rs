use std::sync::Arc;
use std::time::SystemTime;

use signal_proto::{IceCandidateRecord, RoomStatus, SessionDescription, SignalRole};
use signal_road::mailbox::{Applied, MailboxPolicy, MailboxStore, RedisMailbox, RoomMutation};

async fn redis_mailbox() -> Option<RedisMailbox> {
    let url = std::env::var("REDIS_URL").ok()?;
    match RedisMailbox::connect(&url, 60, MailboxPolicy::default()).await {
        Ok(mailbox) => Some(mailbox),
        Err(err) => {
            eprintln!("skipping: redis at {url} unavailable: {err}");
            None
        }
    }
}

fn unique_id(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{name}-{nanos}")
}

fn offer(caller: &str, sdp: &str) -> RoomMutation {
    RoomMutation::Offer {
        caller_id: caller.into(),
        offer: SessionDescription::offer(sdp),
    }
}

#[test_timeout::tokio_timeout_test(60)]
#[ignore = "needs REDIS_URL"]
async fn concurrent_candidates_from_both_roles_survive() {
    let Some(mailbox) = redis_mailbox().await else {
        return;
    };
    let mailbox = Arc::new(mailbox);
    let session = unique_id("redis-candidates");
    mailbox.mutate(&session, offer("t", "v=0 A")).await.unwrap();

    let mut handles = Vec::new();
    for idx in 0..12 {
        let mailbox = Arc::clone(&mailbox);
        let session = session.clone();
        let role = if idx % 2 == 0 {
            SignalRole::Offer
        } else {
            SignalRole::Answer
        };
        handles.push(tokio::spawn(async move {
            mailbox
                .mutate(
                    &session,
                    RoomMutation::Candidate {
                        role,
                        candidate: IceCandidateRecord::new(format!("c{idx}")),
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let room = mailbox.load(&session).await.unwrap().expect("room stored");
    assert_eq!(room.offer_candidates.len(), 6);
    assert_eq!(room.answer_candidates.len(), 6);
    assert_eq!(room.status, RoomStatus::Open);
    mailbox.expire(&session).await.unwrap();
}

#[test_timeout::tokio_timeout_test(60)]
#[ignore = "needs REDIS_URL"]
async fn reoffer_clears_the_previous_answer() {
    let Some(mailbox) = redis_mailbox().await else {
        return;
    };
    let session = unique_id("redis-reoffer");
    mailbox.mutate(&session, offer("t", "v=0 A")).await.unwrap();
    mailbox
        .mutate(
            &session,
            RoomMutation::Answer {
                caller_id: "l".into(),
                answer: SessionDescription::answer("v=0 B"),
            },
        )
        .await
        .unwrap();
    let answered = mailbox.load(&session).await.unwrap().expect("answered room");
    assert_eq!(answered.status, RoomStatus::Answered);

    let applied = mailbox.mutate(&session, offer("l", "v=0 C")).await.unwrap();
    assert!(matches!(applied, Applied::Write(..)));
    let room = mailbox.load(&session).await.unwrap().expect("reoffered room");
    assert_eq!(room.status, RoomStatus::Open);
    assert!(room.answer.is_none());
    assert!(room.answered_by.is_none());
    assert_eq!(room.offered_by.as_deref(), Some("l"));
    assert_eq!(room.generation, answered.generation + 1);
    mailbox.expire(&session).await.unwrap();
}

#[test_timeout::tokio_timeout_test(60)]
#[ignore = "needs REDIS_URL"]
async fn expire_removes_the_room() {
    let Some(mailbox) = redis_mailbox().await else {
        return;
    };
    let session = unique_id("redis-expire");
    mailbox.mutate(&session, offer("t", "v=0 A")).await.unwrap();

    assert!(mailbox.expire(&session).await.unwrap());
    assert!(!mailbox.expire(&session).await.unwrap());
    assert!(mailbox.load(&session).await.unwrap().is_none());
}
