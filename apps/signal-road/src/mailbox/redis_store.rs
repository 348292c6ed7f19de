use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use signal_proto::SignalingRoom;

use super::{room, unix_now, Applied, MailboxPolicy, MailboxStore, RoomMutation};
use crate::error::SignalError;

/// Retries before a contended compare-and-swap gives up.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Replaces the room record only if it still holds the value we read.
/// ARGV[1] is the expected record ("" for absent), ARGV[2] the new record,
/// ARGV[3] the TTL in seconds.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current == false and ARGV[1] == '') or current == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
  return 1
end
return 0
"#;

/// Rooms stored as one JSON document per session with a sliding TTL.
#[derive(Clone)]
pub struct RedisMailbox {
    redis: ConnectionManager,
    ttl_seconds: u64,
    policy: MailboxPolicy,
    cas: Script,
}

impl RedisMailbox {
    pub async fn connect(
        redis_url: &str,
        ttl_seconds: u64,
        policy: MailboxPolicy,
    ) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self {
            redis,
            ttl_seconds,
            policy,
            cas: Script::new(COMPARE_AND_SET),
        })
    }
}

#[async_trait]
impl MailboxStore for RedisMailbox {
    async fn load(&self, session_id: &str) -> Result<Option<SignalingRoom>, SignalError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(room_key(session_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn mutate(
        &self,
        session_id: &str,
        mutation: RoomMutation,
    ) -> Result<Applied, SignalError> {
        let key = room_key(session_id);
        let mut conn = self.redis.clone();

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let raw: Option<String> = conn.get(&key).await?;
            let current = match raw.as_deref() {
                Some(json) => Some(serde_json::from_str::<SignalingRoom>(json)?),
                None => None,
            };
            let applied = room::apply(current, session_id, &mutation, &self.policy, unix_now())?;
            let Applied::Write(updated, _) = &applied else {
                return Ok(applied);
            };
            let serialized = serde_json::to_string(updated)?;
            let swapped: i32 = self
                .cas
                .key(&key)
                .arg(raw.as_deref().unwrap_or(""))
                .arg(&serialized)
                .arg(self.ttl_seconds)
                .invoke_async(&mut conn)
                .await?;
            if swapped == 1 {
                return Ok(applied);
            }
            tracing::trace!(session = %session_id, attempt, "room changed underneath; retrying");
        }

        Err(SignalError::Backend(format!(
            "room {session_id} too contended to update"
        )))
    }

    async fn expire(&self, session_id: &str) -> Result<bool, SignalError> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn.del(room_key(session_id)).await?;
        Ok(removed > 0)
    }
}

fn room_key(session_id: &str) -> String {
    format!("signal:room:{}", session_id)
}
