//! Auto-apply cycle engine.
//!
//! A cycle searches for postings matching a user's `AutoApplyConfig`, filters
//! out duplicates and over-budget platforms, and submits applications through
//! the platform's strategy (direct API, browser automation or email).
//! Postings the engine cannot handle land in the review queue. Every cycle
//! produces exactly one finalized `CycleRecord`.
//!
//! ```text
//! engine::start ─► orchestrator::run ─► search ─► per candidate:
//!     salary filter ─► duplicate check ─► dispatch
//!         unsupported ─► claim ─► queue
//!         otherwise   ─► admit ─► claim ─► cover letter ─► attempt ─► record
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::store::StoreError;

pub mod activity;
pub mod duplicate;
pub mod engine;
pub mod handlers;
pub mod orchestrator;
pub mod platforms;
pub mod prompts;
pub mod providers;
pub mod queue;
pub mod rate_limiter;
pub mod session;
pub mod submit;
pub mod webdriver;

#[cfg(test)]
pub mod testing;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => EngineError::NotFound(m),
            StoreError::Conflict(m) => EngineError::Conflict(m),
            other => EngineError::Infrastructure(other.to_string()),
        }
    }
}

/// Cooperative stop flag, checked by the orchestrator between candidates.
#[derive(Debug, Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
