use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use signal_proto::{IceCandidateRecord, SessionDescription, SignalRole, SignalingRoom};
use tracing::warn;

use crate::config::{Config, MailboxBackend};
use crate::error::SignalError;

pub mod memory;
pub mod redis_store;
pub mod room;

pub use memory::MemoryMailbox;
pub use redis_store::RedisMailbox;
pub use room::Applied;

/// A single write against a room. Each backend applies it atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomMutation {
    Offer {
        caller_id: String,
        offer: SessionDescription,
    },
    Answer {
        caller_id: String,
        answer: SessionDescription,
    },
    Candidate {
        role: SignalRole,
        candidate: IceCandidateRecord,
    },
    End,
}

#[derive(Debug, Clone, Copy)]
pub struct MailboxPolicy {
    /// Drop both candidate lists when a new offer supersedes a handshake.
    pub reset_candidates_on_offer: bool,
}

impl Default for MailboxPolicy {
    fn default() -> Self {
        Self {
            reset_candidates_on_offer: true,
        }
    }
}

#[async_trait]
pub trait MailboxStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SignalingRoom>, SignalError>;

    /// Applies `mutation` and returns what was written, if anything.
    async fn mutate(
        &self,
        session_id: &str,
        mutation: RoomMutation,
    ) -> Result<Applied, SignalError>;

    /// Removes the room entirely. Returns whether one existed.
    async fn expire(&self, session_id: &str) -> Result<bool, SignalError>;
}

pub async fn build_mailbox(config: &Config) -> anyhow::Result<Arc<dyn MailboxStore>> {
    let policy = MailboxPolicy {
        reset_candidates_on_offer: config.reset_candidates_on_offer,
    };
    match config.mailbox_backend {
        MailboxBackend::Redis => {
            match RedisMailbox::connect(&config.redis_url, config.room_ttl_seconds, policy).await {
                Ok(mailbox) => Ok(Arc::new(mailbox)),
                Err(err) => {
                    warn!(error = %err, redis = %config.redis_url, "redis mailbox unavailable");
                    Err(err.into())
                }
            }
        }
        MailboxBackend::Memory => Ok(Arc::new(MemoryMailbox::new(policy))),
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
