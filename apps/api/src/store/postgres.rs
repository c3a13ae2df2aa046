//! PostgreSQL-backed configs, cycle records and review queue.
//!
//! Tables are created by `migrations/0001_auto_apply.sql`. Status columns are
//! TEXT and converted at the row boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::candidate::JobCandidate;
use crate::models::config::AutoApplyConfig;
use crate::models::cycle::{CycleError, CycleRecord};
use crate::models::queue::{QueueItem, QueueResolution};
use crate::store::{ConfigStore, CycleStore, QueueStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ConfigRow {
    user_id: Uuid,
    keywords: Vec<String>,
    locations: Vec<String>,
    min_salary: Option<i64>,
    daily_limit: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConfigRow> for AutoApplyConfig {
    type Error = StoreError;

    fn try_from(row: ConfigRow) -> Result<Self, Self::Error> {
        let daily_limit = u32::try_from(row.daily_limit)
            .map_err(|_| StoreError::Corrupt(format!("daily_limit {}", row.daily_limit)))?;
        Ok(AutoApplyConfig {
            user_id: row.user_id,
            keywords: row.keywords,
            locations: row.locations,
            min_salary: row.min_salary,
            daily_limit,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ConfigStore for PgStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<AutoApplyConfig>, StoreError> {
        let row: Option<ConfigRow> =
            sqlx::query_as("SELECT * FROM auto_apply_configs WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AutoApplyConfig::try_from).transpose()
    }

    async fn upsert(&self, config: &AutoApplyConfig) -> Result<(), StoreError> {
        let daily_limit = i32::try_from(config.daily_limit)
            .map_err(|_| StoreError::Corrupt(format!("daily_limit {}", config.daily_limit)))?;
        sqlx::query(
            r#"
            INSERT INTO auto_apply_configs
                (user_id, keywords, locations, min_salary, daily_limit, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                keywords = EXCLUDED.keywords,
                locations = EXCLUDED.locations,
                min_salary = EXCLUDED.min_salary,
                daily_limit = EXCLUDED.daily_limit,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.user_id)
        .bind(&config.keywords)
        .bind(&config.locations)
        .bind(config.min_salary)
        .bind(daily_limit)
        .bind(config.is_active)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<AutoApplyConfig>, StoreError> {
        let rows: Vec<ConfigRow> = sqlx::query_as(
            "SELECT * FROM auto_apply_configs WHERE is_active ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AutoApplyConfig::try_from).collect()
    }
}

#[derive(FromRow)]
struct CycleRow {
    cycle_id: Uuid,
    user_id: Uuid,
    cycle_start: DateTime<Utc>,
    cycle_end: Option<DateTime<Utc>>,
    cycle_status: String,
    jobs_searched: i32,
    jobs_matched: i32,
    jobs_applied: i32,
    applications_successful: i32,
    applications_failed: i32,
    errors: Json<Vec<CycleError>>,
    screenshots: Vec<String>,
}

fn count(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

impl TryFrom<CycleRow> for CycleRecord {
    type Error = StoreError;

    fn try_from(row: CycleRow) -> Result<Self, Self::Error> {
        Ok(CycleRecord {
            cycle_id: row.cycle_id,
            user_id: row.user_id,
            cycle_start: row.cycle_start,
            cycle_end: row.cycle_end,
            cycle_status: row.cycle_status.parse().map_err(StoreError::Corrupt)?,
            jobs_searched: count(row.jobs_searched, "jobs_searched")?,
            jobs_matched: count(row.jobs_matched, "jobs_matched")?,
            jobs_applied: count(row.jobs_applied, "jobs_applied")?,
            applications_successful: count(row.applications_successful, "applications_successful")?,
            applications_failed: count(row.applications_failed, "applications_failed")?,
            errors: row.errors.0,
            screenshots: row.screenshots,
        })
    }
}

#[async_trait]
impl CycleStore for PgStore {
    async fn insert(&self, record: &CycleRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auto_apply_cycles
                (cycle_id, user_id, cycle_start, cycle_end, cycle_status,
                 jobs_searched, jobs_matched, jobs_applied,
                 applications_successful, applications_failed, errors, screenshots)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.cycle_id)
        .bind(record.user_id)
        .bind(record.cycle_start)
        .bind(record.cycle_end)
        .bind(record.cycle_status.as_str())
        .bind(record.jobs_searched as i32)
        .bind(record.jobs_matched as i32)
        .bind(record.jobs_applied as i32)
        .bind(record.applications_successful as i32)
        .bind(record.applications_failed as i32)
        .bind(Json(&record.errors))
        .bind(&record.screenshots)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, record: &CycleRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE auto_apply_cycles SET
                cycle_end = $2, cycle_status = $3,
                jobs_searched = $4, jobs_matched = $5, jobs_applied = $6,
                applications_successful = $7, applications_failed = $8,
                errors = $9, screenshots = $10
            WHERE cycle_id = $1
            "#,
        )
        .bind(record.cycle_id)
        .bind(record.cycle_end)
        .bind(record.cycle_status.as_str())
        .bind(record.jobs_searched as i32)
        .bind(record.jobs_matched as i32)
        .bind(record.jobs_applied as i32)
        .bind(record.applications_successful as i32)
        .bind(record.applications_failed as i32)
        .bind(Json(&record.errors))
        .bind(&record.screenshots)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("cycle {}", record.cycle_id)));
        }
        Ok(())
    }

    async fn get(&self, user_id: Uuid, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        let row: Option<CycleRow> = sqlx::query_as(
            "SELECT * FROM auto_apply_cycles WHERE cycle_id = $1 AND user_id = $2",
        )
        .bind(cycle_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CycleRecord::try_from).transpose()
    }

    async fn latest(&self, user_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        Ok(self.list(user_id, 1).await?.into_iter().next())
    }

    async fn list(&self, user_id: Uuid, limit: u32) -> Result<Vec<CycleRecord>, StoreError> {
        let rows: Vec<CycleRow> = sqlx::query_as(
            "SELECT * FROM auto_apply_cycles WHERE user_id = $1 ORDER BY cycle_start DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRecord::try_from).collect()
    }
}

#[derive(FromRow)]
struct QueueRow {
    id: Uuid,
    user_id: Uuid,
    cycle_id: Option<Uuid>,
    candidate: Json<JobCandidate>,
    reason: String,
    queued_at: DateTime<Utc>,
    resolution: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    note: Option<String>,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = StoreError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        Ok(QueueItem {
            id: row.id,
            user_id: row.user_id,
            cycle_id: row.cycle_id,
            candidate: row.candidate.0,
            reason: row.reason.parse().map_err(StoreError::Corrupt)?,
            queued_at: row.queued_at,
            resolution: row
                .resolution
                .map(|r| r.parse::<QueueResolution>())
                .transpose()
                .map_err(StoreError::Corrupt)?,
            resolved_at: row.resolved_at,
            note: row.note,
        })
    }
}

#[async_trait]
impl QueueStore for PgStore {
    async fn insert(&self, item: &QueueItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auto_apply_queue
                (id, user_id, cycle_id, candidate, reason, queued_at, resolution, resolved_at, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.cycle_id)
        .bind(Json(&item.candidate))
        .bind(item.reason.as_str())
        .bind(item.queued_at)
        .bind(item.resolution.map(|r| r.as_str()))
        .bind(item.resolved_at)
        .bind(&item.note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_pending(&self, user_id: Uuid) -> Result<Vec<QueueItem>, StoreError> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT * FROM auto_apply_queue
            WHERE user_id = $1 AND resolution IS NULL
            ORDER BY queued_at ASC, seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueueItem::try_from).collect()
    }

    async fn resolve(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        resolution: QueueResolution,
        at: DateTime<Utc>,
    ) -> Result<QueueItem, StoreError> {
        // Only a pending row is updated, so two concurrent resolutions cannot both win.
        let updated: Option<QueueRow> = sqlx::query_as(
            r#"
            UPDATE auto_apply_queue SET resolution = $3, resolved_at = $4
            WHERE id = $1 AND user_id = $2 AND resolution IS NULL
            RETURNING id, user_id, cycle_id, candidate, reason, queued_at, resolution, resolved_at, note
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .bind(resolution.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return QueueItem::try_from(row);
        }

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM auto_apply_queue WHERE id = $1 AND user_id = $2")
                .bind(item_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Err(StoreError::Conflict(format!(
                "queue item {item_id} already resolved"
            ))),
            None => Err(StoreError::NotFound(format!("queue item {item_id}"))),
        }
    }
}
