//! Control surface of the auto-apply engine, plus its cron trigger.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auto_apply::activity::ActivityLog;
use crate::auto_apply::orchestrator::CycleOrchestrator;
use crate::auto_apply::queue::ReviewQueue;
use crate::auto_apply::{EngineError, StopSignal};
use crate::models::candidate::JobCandidate;
use crate::models::config::{AutoApplyConfig, ConfigUpdate};
use crate::models::cycle::CycleRecord;
use crate::models::queue::{QueueItem, QueueReason, QueueResolution};
use crate::store::ConfigStore;

type Running = Arc<Mutex<HashMap<Uuid, StopSignal>>>;

pub struct AutoApplyEngine {
    configs: Arc<dyn ConfigStore>,
    orchestrator: Arc<CycleOrchestrator>,
    activity: Arc<ActivityLog>,
    queue: ReviewQueue,
    running: Running,
}

impl AutoApplyEngine {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        orchestrator: CycleOrchestrator,
        activity: Arc<ActivityLog>,
        queue: ReviewQueue,
    ) -> Self {
        Self {
            configs,
            orchestrator: Arc::new(orchestrator),
            activity,
            queue,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────────────────

    pub async fn create_or_update_config(
        &self,
        update: ConfigUpdate,
    ) -> Result<AutoApplyConfig, EngineError> {
        let user_id = update.user_id;
        let current = self
            .configs
            .get(user_id)
            .await?
            .unwrap_or_else(|| AutoApplyConfig::new(user_id));

        let config = current.apply(update).map_err(EngineError::Validation)?;
        self.configs.upsert(&config).await?;
        info!(
            "Saved auto-apply config for {user_id} (active={}, daily_limit={})",
            config.is_active, config.daily_limit
        );
        Ok(config)
    }

    pub async fn get_config(&self, user_id: Uuid) -> Result<AutoApplyConfig, EngineError> {
        self.configs
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no auto-apply config for {user_id}")))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Cycles
    // ────────────────────────────────────────────────────────────────────────

    /// Starts a cycle in the background and returns its `running` record.
    pub async fn start(&self, user_id: Uuid) -> Result<CycleRecord, EngineError> {
        let (record, task) = self.prepare(user_id).await?;
        tokio::spawn(task);
        Ok(record)
    }

    /// Runs a cycle to completion on the caller's task.
    #[cfg(test)]
    pub async fn run_cycle(&self, user_id: Uuid) -> Result<CycleRecord, EngineError> {
        let (_, task) = self.prepare(user_id).await?;
        task.await
    }

    /// Requests a cooperative stop; the cycle ends after its in-flight candidate.
    pub fn stop(&self, user_id: Uuid) -> Result<(), EngineError> {
        match lock(&self.running).get(&user_id) {
            Some(signal) => {
                signal.stop();
                info!("Stop requested for user {user_id}");
                Ok(())
            }
            None => Err(EngineError::NotFound(format!(
                "no running cycle for user {user_id}"
            ))),
        }
    }

    pub fn is_running(&self, user_id: Uuid) -> bool {
        lock(&self.running).contains_key(&user_id)
    }

    /// Starts a cycle for every active config that is not already running.
    /// Returns how many were started.
    pub async fn run_scheduled(&self) -> Result<usize, EngineError> {
        let configs = self.configs.list_active().await?;
        let mut started = 0;
        for config in configs {
            if self.is_running(config.user_id) {
                continue;
            }
            match self.start(config.user_id).await {
                Ok(_) => started += 1,
                Err(EngineError::Conflict(_)) => {}
                Err(e) => warn!("Scheduled cycle for {} not started: {e}", config.user_id),
            }
        }
        Ok(started)
    }

    /// Registers the user as running and persists the `running` record. The
    /// returned future drives the cycle; the user is deregistered when it
    /// completes, panics or is dropped.
    async fn prepare(
        &self,
        user_id: Uuid,
    ) -> Result<
        (
            CycleRecord,
            impl Future<Output = Result<CycleRecord, EngineError>> + Send + 'static,
        ),
        EngineError,
    > {
        let config = self.get_config(user_id).await?;
        config.validate().map_err(EngineError::Validation)?;
        if !config.is_active {
            return Err(EngineError::Validation(format!(
                "auto-apply is not active for user {user_id}"
            )));
        }
        if config.keywords.is_empty() {
            return Err(EngineError::Validation(
                "at least one keyword is required".to_string(),
            ));
        }

        let stop = StopSignal::new();
        let registration = Registration::claim(&self.running, user_id, stop.clone())?;
        let record = self.activity.start_cycle(user_id).await?;

        let cycle_id = record.cycle_id;
        let orchestrator = self.orchestrator.clone();
        let span = info_span!("cycle", %user_id, %cycle_id);
        let task = async move {
            let _registration = registration;
            info!("Cycle started");
            let result = orchestrator.run(&config, cycle_id, &stop).await;
            if let Err(e) = &result {
                error!("Cycle could not be finalized: {e}");
            }
            result
        }
        .instrument(span);

        Ok((record, task))
    }

    pub async fn get_activity_log(
        &self,
        user_id: Uuid,
        cycle_id: Option<Uuid>,
    ) -> Result<CycleRecord, EngineError> {
        match cycle_id {
            Some(cycle_id) => self.activity.get(user_id, cycle_id).await,
            None => self
                .activity
                .latest(user_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("no cycles for user {user_id}"))),
        }
    }

    pub async fn list_cycles(&self, user_id: Uuid, limit: u32) -> Result<Vec<CycleRecord>, EngineError> {
        self.activity.list(user_id, limit).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Review queue
    // ────────────────────────────────────────────────────────────────────────

    pub async fn list_queue(&self, user_id: Uuid) -> Result<Vec<QueueItem>, EngineError> {
        self.queue.list(user_id).await
    }

    pub async fn enqueue_manual(
        &self,
        user_id: Uuid,
        candidate: JobCandidate,
        note: Option<String>,
    ) -> Result<QueueItem, EngineError> {
        if candidate.title.trim().is_empty() || candidate.company.trim().is_empty() {
            return Err(EngineError::Validation(
                "candidate needs a title and a company".to_string(),
            ));
        }
        self.queue
            .enqueue(user_id, None, candidate, QueueReason::ManualReviewRequested, note)
            .await
    }

    pub async fn resolve_queue_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        resolution: QueueResolution,
    ) -> Result<QueueItem, EngineError> {
        self.queue.resolve(user_id, item_id, resolution).await
    }
}

fn lock(running: &Running) -> MutexGuard<'_, HashMap<Uuid, StopSignal>> {
    running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Entry in the running set, removed on drop.
struct Registration {
    running: Running,
    user_id: Uuid,
}

impl Registration {
    fn claim(running: &Running, user_id: Uuid, stop: StopSignal) -> Result<Self, EngineError> {
        let mut set = lock(running);
        if set.contains_key(&user_id) {
            return Err(EngineError::Conflict(format!(
                "a cycle is already running for user {user_id}"
            )));
        }
        set.insert(user_id, stop);
        Ok(Self {
            running: running.clone(),
            user_id,
        })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.user_id);
    }
}

/// Cron job that fires `run_scheduled`. The caller starts the scheduler.
pub async fn build_scheduler(engine: Arc<AutoApplyEngine>, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let engine = engine.clone();
        Box::pin(async move {
            match engine.run_scheduled().await {
                Ok(0) => {}
                Ok(n) => info!("Scheduler started {n} auto-apply cycle(s)"),
                Err(e) => error!("Scheduled auto-apply run failed: {e}"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}
