use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::auto_apply::EngineError;
use crate::store::{DuplicateIndex, DuplicateOutcome, StoreError};

/// Per-user duplicate gate in front of every application attempt.
///
/// A claim is taken the moment a candidate is admitted, before the attempt
/// runs, and is kept even if the attempt fails. Claims clear at the end of
/// the UTC day.
#[derive(Clone)]
pub struct DuplicateDetector {
    index: Arc<dyn DuplicateIndex>,
}

impl DuplicateDetector {
    pub fn new(index: Arc<dyn DuplicateIndex>) -> Self {
        Self { index }
    }

    pub async fn is_duplicate(&self, user_id: Uuid, identity_key: &str) -> Result<bool, EngineError> {
        self.index
            .contains(user_id, identity_key, Utc::now())
            .await
            .map_err(|e| EngineError::Infrastructure(format!("duplicate index: {e}")))
    }

    /// Returns `false` when another candidate got there first.
    pub async fn claim(&self, user_id: Uuid, identity_key: &str) -> Result<bool, EngineError> {
        self.index
            .claim(user_id, identity_key, Utc::now())
            .await
            .map_err(|e| EngineError::Infrastructure(format!("duplicate index: {e}")))
    }

    pub async fn record(
        &self,
        user_id: Uuid,
        identity_key: &str,
        outcome: DuplicateOutcome,
    ) -> Result<(), EngineError> {
        match self.index.record(user_id, identity_key, outcome, Utc::now()).await {
            Ok(()) => Ok(()),
            // claim expired at the day boundary mid-attempt
            Err(StoreError::NotFound(_)) => {
                debug!("No live claim for {identity_key}; outcome {} not stored", outcome.as_str());
                Ok(())
            }
            Err(e) => Err(EngineError::Infrastructure(format!("duplicate index: {e}"))),
        }
    }
}
