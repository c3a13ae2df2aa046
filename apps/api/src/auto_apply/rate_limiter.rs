//! Admission control per platform and per user.
//!
//! Three fixed windows are checked together: the platform's hour window, the
//! platform's day window and the user's global day window (`daily_limit`).
//! The counter store increments all three or none.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auto_apply::platforms::PlatformRegistry;
use crate::auto_apply::EngineError;
use crate::store::{CounterKey, CounterStore, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Hourly,
    Daily,
    GlobalDaily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied(DenyReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    registry: Arc<PlatformRegistry>,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(registry: Arc<PlatformRegistry>, store: Arc<dyn CounterStore>) -> Self {
        Self { registry, store }
    }

    pub async fn admit(
        &self,
        user_id: Uuid,
        platform: &str,
        daily_limit: u32,
    ) -> Result<Admission, EngineError> {
        self.admit_at(user_id, platform, daily_limit, Utc::now()).await
    }

    /// Fails closed: a counter store error is returned as an infrastructure
    /// error and nothing is admitted.
    pub async fn admit_at(
        &self,
        user_id: Uuid,
        platform: &str,
        daily_limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Admission, EngineError> {
        let spec = self
            .registry
            .get(platform)
            .ok_or_else(|| EngineError::Validation(format!("unknown platform '{platform}'")))?;
        let platform = spec.id.to_lowercase();

        let keys = [
            counter(user_id, &platform, Window::Hour, spec.hourly_limit, now),
            counter(user_id, &platform, Window::Day, spec.daily_limit, now),
            counter(user_id, "*", Window::Day, daily_limit, now),
        ];

        let denied = self
            .store
            .try_increment(&keys)
            .await
            .map_err(|e| EngineError::Infrastructure(format!("rate-limit counters: {e}")))?;

        Ok(match denied {
            None => Admission::Admitted,
            Some(0) => Admission::Denied(DenyReason::Hourly),
            Some(1) => Admission::Denied(DenyReason::Daily),
            Some(_) => Admission::Denied(DenyReason::GlobalDaily),
        })
    }
}

fn counter(user_id: Uuid, scope: &str, window: Window, ceiling: u32, now: DateTime<Utc>) -> CounterKey {
    CounterKey {
        key: format!("{user_id}:{scope}:{}", window.as_str()),
        window,
        window_start: window.truncate(now),
        ceiling,
    }
}
