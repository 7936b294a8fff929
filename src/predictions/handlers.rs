use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, extractors::AuthUser, sessions::ClientMeta},
    error::{ApiError, AppJson},
    predictions::dto::{
        DashboardResponse, HistoryItem, HistoryResponse, MlHealthResponse, PageInfo, PageQuery,
        PredictionRequest, PredictionResponse,
    },
    state::AppState,
};

const DASHBOARD_RECENT: i64 = 5;

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/prediction/diabetes", post(predict_diabetes))
        .route("/prediction/health", get(ml_health))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/dashboard", get(dashboard))
        .route("/user/predictions", get(list_predictions))
        .route("/user/predictions/:id", delete(delete_prediction))
}

/// Validates, runs inference, then records the outcome best effort.
#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn predict_diabetes(
    State(state): State<AppState>,
    auth: AuthUser,
    meta: ClientMeta,
    AppJson(payload): AppJson<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let input = payload.validate()?;

    let result = state.ml.predict(&input).await?;
    let saved = state
        .recorder()
        .record(auth.user.id, &input, &result, &meta)
        .await;

    Ok(Json(PredictionResponse {
        record_id: saved.as_ref().map(|r| r.id),
        saved: saved.is_some(),
        result,
        timestamp: OffsetDateTime::now_utc(),
    }))
}

#[instrument(skip(state))]
pub async fn ml_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<MlHealthResponse>) {
    match state.ml.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(MlHealthResponse {
                status: "healthy",
                ml_service: state.ml.base_url().to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "inference service health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(MlHealthResponse {
                    status: "unhealthy",
                    ml_service: state.ml.base_url().to_string(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn list_predictions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<PageQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let (page, limit) = q.resolve()?;
    let (records, total) = state.recorder().history(auth.user.id, page, limit).await?;

    Ok(Json(HistoryResponse {
        predictions: records.into_iter().map(HistoryItem::from).collect(),
        pagination: PageInfo::new(page, limit, total),
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id, prediction_id = %id))]
pub async fn delete_prediction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // an unparseable id cannot name a record the caller owns
    let id = Uuid::parse_str(&id).map_err(|_| {
        ApiError::NotFound("Prediction not found or does not belong to user".into())
    })?;
    state.recorder().delete(auth.user.id, id).await?;
    info!("prediction deleted by owner");
    Ok(Json(serde_json::json!({
        "message": "Prediction deleted successfully"
    })))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let recorder = state.recorder();
    let stats = recorder.stats(auth.user.id).await?;
    let recent = recorder.recent(auth.user.id, DASHBOARD_RECENT).await?;

    Ok(Json(DashboardResponse {
        user: PublicUser::of(&auth.user, OffsetDateTime::now_utc().date()),
        stats,
        recent_predictions: recent.into_iter().map(HistoryItem::from).collect(),
    }))
}
