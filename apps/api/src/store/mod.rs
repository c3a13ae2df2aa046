//! Persistence seams for the auto-apply engine.
//!
//! Each store is a trait held as `Arc<dyn _>`. PostgreSQL backs configs,
//! cycle records and the review queue; Redis backs the rate-limit counters and
//! the duplicate index; S3 holds screenshots. `memory` implements every trait
//! in-process for tests and single-node deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::config::AutoApplyConfig;
use crate::models::cycle::CycleRecord;
use crate::models::queue::{QueueItem, QueueResolution};

pub mod memory;
pub mod postgres;
pub mod redis;
pub mod s3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(e.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Unavailable(format!("redis: {e}"))
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<AutoApplyConfig>, StoreError>;
    async fn upsert(&self, config: &AutoApplyConfig) -> Result<(), StoreError>;
    async fn list_active(&self) -> Result<Vec<AutoApplyConfig>, StoreError>;
}

#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn insert(&self, record: &CycleRecord) -> Result<(), StoreError>;
    async fn update(&self, record: &CycleRecord) -> Result<(), StoreError>;
    async fn get(&self, user_id: Uuid, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError>;
    async fn latest(&self, user_id: Uuid) -> Result<Option<CycleRecord>, StoreError>;
    /// Most recent first.
    async fn list(&self, user_id: Uuid, limit: u32) -> Result<Vec<CycleRecord>, StoreError>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, item: &QueueItem) -> Result<(), StoreError>;
    /// Unresolved items only, oldest first.
    async fn list_pending(&self, user_id: Uuid) -> Result<Vec<QueueItem>, StoreError>;
    /// Marks a pending item resolved. `NotFound` for a missing item,
    /// `Conflict` if it was already resolved.
    async fn resolve(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        resolution: QueueResolution,
        at: DateTime<Utc>,
    ) -> Result<QueueItem, StoreError>;
}

/// Which fixed window a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
}

impl Window {
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Window::Hour => chrono::Duration::hours(1),
            Window::Day => chrono::Duration::days(1),
        }
    }

    /// Start of the fixed window containing `at`.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.duration().num_seconds();
        let ts = at.timestamp();
        let start = ts - ts.rem_euclid(secs);
        DateTime::from_timestamp(start, 0).unwrap_or(at)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

/// One counter touched by an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKey {
    /// `<user>:<scope>:<window>`; scope is a platform id or `*` for the global cap.
    pub key: String,
    pub window: Window,
    pub window_start: DateTime<Utc>,
    pub ceiling: u32,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments every counter by one if none would pass its ceiling.
    /// Returns `None` when admitted, or the index of the first counter that
    /// would overflow (nothing is incremented in that case).
    async fn try_increment(&self, keys: &[CounterKey]) -> Result<Option<usize>, StoreError>;
}

/// What happened to a claimed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateOutcome {
    Claimed,
    Applied,
    Failed,
    Queued,
}

impl DuplicateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateOutcome::Claimed => "claimed",
            DuplicateOutcome::Applied => "applied",
            DuplicateOutcome::Failed => "failed",
            DuplicateOutcome::Queued => "queued",
        }
    }
}

#[async_trait]
pub trait DuplicateIndex: Send + Sync {
    async fn contains(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Atomic check-and-claim. `false` if the key was already claimed.
    async fn claim(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
    async fn record(
        &self,
        user_id: Uuid,
        key: &str,
        outcome: DuplicateOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores a PNG screenshot and returns a reference to it.
    async fn put_screenshot(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        label: &str,
        png: Vec<u8>,
    ) -> Result<String, StoreError>;
}

/// Seconds until the UTC day containing `now` ends; duplicate claims live this long.
pub fn seconds_until_day_end(now: DateTime<Utc>) -> i64 {
    let day_start = Window::Day.truncate(now);
    (day_start + Window::Day.duration() - now).num_seconds().max(1)
}
