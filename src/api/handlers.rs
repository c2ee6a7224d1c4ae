//! API Handlers
//!
//! HTTP request handlers for each admin endpoint. Every handler is a thin
//! wrapper over one [`CacheService`] operation.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, InvalidatePatternRequest, InvalidateTagsRequest,
    InvalidationResponse, SetRequest, SetResponse, StatsResponse,
};
use crate::service::CacheService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CacheService>,
}

impl AppState {
    pub fn new(service: Arc<CacheService>) -> Self {
        Self { service }
    }
}

/// Handler for PUT /cache
///
/// Stores a value in both layers, tagged when `tags` is present.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }

    let ttl = Duration::from_secs(req.ttl.unwrap_or(0));
    match &req.tags {
        Some(tags) if !tags.is_empty() => {
            state
                .service
                .set_with_tags(&req.key, req.value.as_bytes(), ttl, tags)
                .await?
        }
        _ => state.service.set(&req.key, req.value.as_bytes(), ttl).await?,
    }

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.service.get(&key).await?;
    Ok(Json(GetResponse::new(key, &value)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.service.delete(std::slice::from_ref(&key)).await?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /invalidate/tags
pub async fn invalidate_tags_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateTagsRequest>,
) -> Result<Json<InvalidationResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }

    info!(tags = ?req.tags, "manual tag invalidation");
    let report = state.service.invalidate_by_tag(&req.tags).await?;
    Ok(Json(report.into()))
}

/// Handler for POST /invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidatePatternRequest>,
) -> Result<Json<InvalidationResponse>> {
    info!(pattern = %req.pattern, "manual pattern invalidation");
    let report = state.service.invalidate_by_pattern(&req.pattern).await?;
    Ok(Json(report.into()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        service: state.service.get_stats(),
        local: state.service.local_stats(),
        remote: state.service.remote_metrics(),
    })
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    state.service.reset_stats();
    stats_handler(State(state)).await
}

/// Handler for GET /health
///
/// Runs a fresh remote check rather than reporting the last periodic one,
/// alongside the breaker state seen by the request path.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.service.health_monitor().check_now().await;
    let breaker = state.service.remote().breaker().snapshot();
    Json(HealthResponse::from_status(status, breaker))
}
