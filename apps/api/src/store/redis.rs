//! Redis-backed rate-limit counters and duplicate index, shared by every API
//! replica. Keys are scoped by user so concurrent cycles never contend.

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, Script};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::store::{
    seconds_until_day_end, CounterKey, CounterStore, DuplicateIndex, DuplicateOutcome, StoreError,
};

const KEY_PREFIX: &str = "autoapply";

/// KEYS = counter keys, ARGV = ceiling/ttl pairs.
/// Returns 0 when every counter was incremented, otherwise the 1-based index
/// of the first counter at its ceiling (nothing incremented).
const TRY_INCREMENT_LUA: &str = r#"
for i, key in ipairs(KEYS) do
    local current = tonumber(redis.call('GET', key) or '0')
    if current >= tonumber(ARGV[(i - 1) * 2 + 1]) then
        return i
    end
end
for i, key in ipairs(KEYS) do
    local count = redis.call('INCR', key)
    if count == 1 then
        redis.call('EXPIRE', key, tonumber(ARGV[(i - 1) * 2 + 2]))
    end
end
return 0
"#;

pub struct RedisStore {
    client: Client,
    conn: OnceCell<MultiplexedConnection>,
    script: Script,
}

impl RedisStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
            script: Script::new(TRY_INCREMENT_LUA),
        }
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

/// The window start is part of the key, so a new window starts from a fresh
/// counter and the old one expires on its own.
fn counter_key(key: &CounterKey) -> String {
    format!(
        "{KEY_PREFIX}:rl:{}:{}",
        key.key,
        key.window_start.timestamp()
    )
}

fn duplicate_key(user_id: Uuid, key: &str, now: DateTime<Utc>) -> String {
    format!("{KEY_PREFIX}:dup:{user_id}:{}:{key}", now.format("%Y%m%d"))
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn try_increment(&self, keys: &[CounterKey]) -> Result<Option<usize>, StoreError> {
        if keys.is_empty() {
            return Ok(None);
        }
        let mut conn = self.conn().await?;
        let mut invocation = self.script.prepare_invoke();
        for key in keys {
            invocation
                .key(counter_key(key))
                .arg(key.ceiling)
                .arg(key.window.duration().num_seconds());
        }
        let result: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(match result {
            0 => None,
            i => Some((i - 1) as usize),
        })
    }
}

#[async_trait]
impl DuplicateIndex for RedisStore {
    async fn contains(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let exists: i64 = ::redis::cmd("EXISTS")
            .arg(duplicate_key(user_id, key, now))
            .query_async(&mut conn)
            .await?;
        Ok(exists == 1)
    }

    async fn claim(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let set: Option<String> = ::redis::cmd("SET")
            .arg(duplicate_key(user_id, key, now))
            .arg(DuplicateOutcome::Claimed.as_str())
            .arg("NX")
            .arg("EX")
            .arg(seconds_until_day_end(now))
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn record(
        &self,
        user_id: Uuid,
        key: &str,
        outcome: DuplicateOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let set: Option<String> = ::redis::cmd("SET")
            .arg(duplicate_key(user_id, key, now))
            .arg(outcome.as_str())
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        match set {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("no live claim for '{key}'"))),
        }
    }
}
