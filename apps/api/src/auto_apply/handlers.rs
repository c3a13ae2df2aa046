//! Axum route handlers for the Auto-Apply API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::JobCandidate;
use crate::models::config::{AutoApplyConfig, ConfigUpdate};
use crate::models::cycle::CycleRecord;
use crate::models::queue::{QueueItem, QueueResolution};
use crate::state::AppState;

const DEFAULT_CYCLE_PAGE: u32 = 20;
const MAX_CYCLE_PAGE: u32 = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UserIdBody {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Uuid,
    pub cycle_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CyclesQuery {
    pub user_id: Uuid,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub cycle_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub user_id: Uuid,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub user_id: Uuid,
    pub candidate: JobCandidate,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub user_id: Uuid,
    pub resolution: QueueResolution,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// PUT /api/v1/auto-apply/config
///
/// Creates the config on first save; later saves merge the provided fields.
pub async fn handle_put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<AutoApplyConfig>, AppError> {
    let config = state.engine.create_or_update_config(update).await?;
    Ok(Json(config))
}

/// GET /api/v1/auto-apply/config
pub async fn handle_get_config(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<AutoApplyConfig>, AppError> {
    Ok(Json(state.engine.get_config(params.user_id).await?))
}

/// POST /api/v1/auto-apply/start
///
/// Returns immediately; the cycle runs in the background.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(body): Json<UserIdBody>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    let record = state.engine.start(body.user_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            cycle_id: record.cycle_id,
            status: record.cycle_status.as_str().to_string(),
        }),
    ))
}

/// POST /api/v1/auto-apply/stop
pub async fn handle_stop(
    State(state): State<AppState>,
    Json(body): Json<UserIdBody>,
) -> Result<(StatusCode, Json<StopResponse>), AppError> {
    state.engine.stop(body.user_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StopResponse {
            user_id: body.user_id,
            status: "stopping".to_string(),
        }),
    ))
}

/// GET /api/v1/auto-apply/activity
///
/// The given cycle, or the latest one when `cycle_id` is omitted.
pub async fn handle_get_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<CycleRecord>, AppError> {
    let record = state
        .engine
        .get_activity_log(params.user_id, params.cycle_id)
        .await?;
    Ok(Json(record))
}

/// GET /api/v1/auto-apply/cycles
pub async fn handle_list_cycles(
    State(state): State<AppState>,
    Query(params): Query<CyclesQuery>,
) -> Result<Json<Vec<CycleRecord>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_CYCLE_PAGE)
        .clamp(1, MAX_CYCLE_PAGE);
    Ok(Json(state.engine.list_cycles(params.user_id, limit).await?))
}

/// GET /api/v1/auto-apply/queue
pub async fn handle_list_queue(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    Ok(Json(state.engine.list_queue(params.user_id).await?))
}

/// POST /api/v1/auto-apply/queue
///
/// Puts a posting in front of the user for manual review.
pub async fn handle_enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<QueueItem>), AppError> {
    let item = state
        .engine
        .enqueue_manual(request.user_id, request.candidate, request.note)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /api/v1/auto-apply/queue/:id/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<QueueItem>, AppError> {
    let item = state
        .engine
        .resolve_queue_item(request.user_id, item_id, request.resolution)
        .await?;
    Ok(Json(item))
}
