use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::pipeline::{PipelineError, ProcessOptions};
use crate::profile::MergedProfile;
use crate::providers::ProviderId;
use crate::ratelimit::RateStatus;
use crate::scoring::LeadScore;
use crate::service::{LeadReport, LeadService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LeadService>,
}

impl AppState {
    pub fn new(service: Arc<LeadService>) -> Self {
        Self { service }
    }
}

/// Routes without `/metrics` (the Prometheus recorder is process-global and
/// merged in by `crate::app`).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status/rate-limits", get(rate_limits))
        .route("/leads/{isrc}", post(process_lead))
        .route("/score", post(score_profile))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub enum ApiError {
    Validation(String),
    Cancelled,
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Validation(v) => ApiError::Validation(v.to_string()),
            PipelineError::Cancelled => ApiError::Cancelled,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Validation(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "processing cancelled".to_string(),
            ),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

async fn rate_limits(State(state): State<AppState>) -> Json<BTreeMap<ProviderId, RateStatus>> {
    Json(state.service.pipeline().limiter().status_all())
}

async fn process_lead(
    State(state): State<AppState>,
    Path(isrc): Path<String>,
    Query(options): Query<ProcessOptions>,
) -> Result<Json<LeadReport>, ApiError> {
    let report = state.service.process(&isrc, options).await?;
    Ok(Json(report))
}

async fn score_profile(
    State(state): State<AppState>,
    Json(profile): Json<MergedProfile>,
) -> Json<LeadScore> {
    Json(state.service.rescore(&profile))
}
