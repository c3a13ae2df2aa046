use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auto_apply::EngineError;
use crate::models::candidate::JobCandidate;
use crate::models::queue::{QueueItem, QueueReason, QueueResolution};
use crate::store::{QueueStore, StoreError};

/// Manual-review queue. Items are only ever added by the engine; users
/// resolve them. Nothing expires.
#[derive(Clone)]
pub struct ReviewQueue {
    store: Arc<dyn QueueStore>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue(
        &self,
        user_id: Uuid,
        cycle_id: Option<Uuid>,
        candidate: JobCandidate,
        reason: QueueReason,
        note: Option<String>,
    ) -> Result<QueueItem, EngineError> {
        let item = QueueItem::new(user_id, cycle_id, candidate, reason, note);
        self.store.insert(&item).await?;
        info!(
            "Queued '{}' at {} for review ({})",
            item.candidate.title,
            item.candidate.company,
            reason.as_str()
        );
        Ok(item)
    }

    /// Pending items, oldest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<QueueItem>, EngineError> {
        Ok(self.store.list_pending(user_id).await?)
    }

    pub async fn resolve(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        resolution: QueueResolution,
    ) -> Result<QueueItem, EngineError> {
        match self.store.resolve(user_id, item_id, resolution, Utc::now()).await {
            Ok(item) => Ok(item),
            Err(StoreError::NotFound(_)) => {
                Err(EngineError::NotFound(format!("queue item {item_id}")))
            }
            Err(StoreError::Conflict(_)) => Err(EngineError::Conflict(format!(
                "queue item {item_id} is already resolved"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
