//! Cycle activity log.
//!
//! Owns the in-flight `CycleRecord` of every running cycle, applies the
//! counter rules for each candidate outcome and persists the record after
//! every change. Screenshots are uploaded to the artifact store and only
//! their references are kept on the record.
//!
//! Each open record has its own lock; the map of open cycles is only locked
//! for lookups, never across a store write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auto_apply::rate_limiter::DenyReason;
use crate::auto_apply::EngineError;
use crate::models::candidate::JobCandidate;
use crate::models::cycle::{CycleError, CycleRecord, CycleStatus, FailureKind};
use crate::store::{ArtifactStore, CycleStore};

/// What happened to one candidate that got past the duplicate check and the
/// salary filter. Skipped candidates are never recorded.
#[derive(Debug)]
pub enum CandidateOutcome {
    RateLimited(DenyReason),
    Queued,
    Submitted,
    Failed {
        kind: FailureKind,
        message: String,
        screenshot: Option<Vec<u8>>,
    },
}

/// Attempts at persisting the terminal record before giving up.
const FINISH_ATTEMPTS: u32 = 4;
const FINISH_BACKOFF: Duration = Duration::from_millis(250);

type OpenRecord = Arc<Mutex<CycleRecord>>;

pub struct ActivityLog {
    cycles: Arc<dyn CycleStore>,
    artifacts: Arc<dyn ArtifactStore>,
    open: StdMutex<HashMap<Uuid, OpenRecord>>,
}

impl ActivityLog {
    pub fn new(cycles: Arc<dyn CycleStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            cycles,
            artifacts,
            open: StdMutex::new(HashMap::new()),
        }
    }

    /// Persists a `running` record and returns it.
    pub async fn start_cycle(&self, user_id: Uuid) -> Result<CycleRecord, EngineError> {
        let record = CycleRecord::start(user_id);
        self.cycles.insert(&record).await?;
        self.open_set()
            .insert(record.cycle_id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    pub async fn record_search(&self, cycle_id: Uuid, count: u32) -> Result<(), EngineError> {
        self.update(cycle_id, |record| {
            record.jobs_searched += count;
        })
        .await
    }

    pub async fn record_outcome(
        &self,
        cycle_id: Uuid,
        candidate: &JobCandidate,
        outcome: CandidateOutcome,
    ) -> Result<(), EngineError> {
        let (kind, message, screenshot) = match outcome {
            CandidateOutcome::RateLimited(reason) => {
                debug!("Rate limited '{}' on {}: {reason:?}", candidate.title, candidate.platform);
                return self.update(cycle_id, |r| r.jobs_matched += 1).await;
            }
            CandidateOutcome::Queued => {
                return self.update(cycle_id, |r| r.jobs_matched += 1).await;
            }
            CandidateOutcome::Submitted => {
                return self
                    .update(cycle_id, |r| {
                        r.jobs_matched += 1;
                        r.jobs_applied += 1;
                        r.applications_successful += 1;
                    })
                    .await;
            }
            CandidateOutcome::Failed {
                kind,
                message,
                screenshot,
            } => (kind, message, screenshot),
        };

        let user_id = self.owner(cycle_id).await?;
        let identity_key = candidate.identity_key();
        let screenshot_ref = match screenshot {
            Some(png) => match self
                .artifacts
                .put_screenshot(user_id, cycle_id, &artifact_label(&identity_key), png)
                .await
            {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!("Failed to store screenshot for {identity_key}: {e}");
                    None
                }
            },
            None => None,
        };

        let error = CycleError {
            platform: Some(candidate.platform.clone()),
            identity_key: Some(identity_key),
            kind,
            message,
            at: Utc::now(),
        };
        self.update(cycle_id, move |r| {
            r.jobs_matched += 1;
            r.jobs_applied += 1;
            r.applications_failed += 1;
            r.errors.push(error);
            r.screenshots.extend(screenshot_ref);
        })
        .await
    }

    /// Cycle-level error not tied to a candidate.
    pub async fn record_error(
        &self,
        cycle_id: Uuid,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        let error = CycleError {
            platform: None,
            identity_key: None,
            kind,
            message: message.into(),
            at: Utc::now(),
        };
        self.update(cycle_id, move |r| r.errors.push(error)).await
    }

    /// Sets the terminal status and `cycle_end`, retrying the write with
    /// backoff. The record stays open until the terminal state is stored, so
    /// a failed finish can be retried.
    pub async fn finish_cycle(
        &self,
        cycle_id: Uuid,
        status: CycleStatus,
    ) -> Result<CycleRecord, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "cannot finish a cycle as '{}'",
                status.as_str()
            )));
        }

        let entry = self.entry(cycle_id)?;
        let mut record = entry.lock().await;
        if record.cycle_status.is_terminal() {
            return Err(not_open(cycle_id));
        }

        let mut finished = record.clone();
        finished.cycle_status = status;
        finished.cycle_end = Some(Utc::now());

        let mut backoff = FINISH_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.cycles.update(&finished).await {
                Ok(()) => break,
                Err(e) if attempt < FINISH_ATTEMPTS => {
                    warn!(
                        "Finalizing cycle {cycle_id} failed (attempt {attempt}/{FINISH_ATTEMPTS}), \
                         retrying in {backoff:?}: {e}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        *record = finished.clone();
        drop(record);
        self.open_set().remove(&cycle_id);
        Ok(finished)
    }

    pub async fn get(&self, user_id: Uuid, cycle_id: Uuid) -> Result<CycleRecord, EngineError> {
        self.cycles
            .get(user_id, cycle_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("cycle {cycle_id}")))
    }

    pub async fn latest(&self, user_id: Uuid) -> Result<Option<CycleRecord>, EngineError> {
        Ok(self.cycles.latest(user_id).await?)
    }

    pub async fn list(&self, user_id: Uuid, limit: u32) -> Result<Vec<CycleRecord>, EngineError> {
        Ok(self.cycles.list(user_id, limit).await?)
    }

    async fn update<F>(&self, cycle_id: Uuid, apply: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut CycleRecord) + Send,
    {
        let entry = self.entry(cycle_id)?;
        let mut record = entry.lock().await;
        if record.cycle_status.is_terminal() {
            return Err(not_open(cycle_id));
        }
        apply(&mut record);
        debug_assert!(record.counters_consistent(), "cycle counters out of order");
        self.cycles.update(&record).await?;
        Ok(())
    }

    async fn owner(&self, cycle_id: Uuid) -> Result<Uuid, EngineError> {
        let entry = self.entry(cycle_id)?;
        let user_id = entry.lock().await.user_id;
        Ok(user_id)
    }

    fn entry(&self, cycle_id: Uuid) -> Result<OpenRecord, EngineError> {
        self.open_set()
            .get(&cycle_id)
            .cloned()
            .ok_or_else(|| not_open(cycle_id))
    }

    fn open_set(&self) -> MutexGuard<'_, HashMap<Uuid, OpenRecord>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_open(cycle_id: Uuid) -> EngineError {
    EngineError::Conflict(format!("cycle {cycle_id} is not running"))
}

fn artifact_label(identity_key: &str) -> String {
    identity_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
