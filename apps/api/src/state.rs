use std::sync::Arc;

use crate::auto_apply::engine::AutoApplyEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutoApplyEngine>,
}
