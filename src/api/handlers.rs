use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use std::sync::Arc;

use crate::api::models::*;
use crate::api::AppState;
use crate::error::ServiceError;

// ========== STATUS ==========

pub async fn read_root() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: Some("GeoLife Next Location Prediction API".to_string()),
        status: "active".to_string(),
    })
}

pub async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: None,
        status: "healthy".to_string(),
    })
}

// ========== CLUSTERING ==========

pub async fn cluster_locations(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ClusteringRequest>, JsonRejection>,
) -> Result<Json<ClusteringResponse>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::Validation(e.body_text()))?;
    tracing::info!(
        uid = %request.uid,
        distance = request.distance,
        min_k = request.min_k,
        "attempting to cluster"
    );

    let outcome = run_blocking(move || {
        state.cluster(&request.uid, request.distance, request.min_k)
    })
    .await?;

    Ok(Json(ClusteringResponse {
        df: outcome.trips,
        scores: outcome.scores,
    }))
}

// ========== PREDICTION ==========

pub async fn predict_next_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<Vec<Vec<f64>>>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::Validation(e.body_text()))?;
    tracing::info!(uid = %request.uid, "attempting to predict");

    let features = request.into_features()?;
    tracing::debug!(feature_names = ?state.model().feature_names(), ?features, "processed features");

    let prediction = run_blocking(move || state.predict(&features)).await?;
    tracing::debug!(?prediction, "prediction complete");

    Ok(Json(prediction))
}

/// Run CPU-bound work off the async reactor
async fn run_blocking<T, F>(work: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServiceError::Inference(format!("worker task failed: {}", e)))?
}
