//! Schedule Window REST API Routes

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tempo_core::ScheduleWindow;
use tempo_storage::ScheduleStore;

use crate::{
    error::{ApiError, ApiResult},
    extractors::CallerIdentity,
    services::window_service,
    state::AppState,
    types::{DateRangeQuery, MaterializeRequest},
};

/// GET /api/v1/schedule-windows - List materialized windows in a range
#[utoipa::path(
    get,
    path = "/api/v1/schedule-windows",
    tag = "Windows",
    params(
        ("fromDateMs" = i64, Query, description = "Range start (epoch ms)"),
        ("toDateMs" = i64, Query, description = "Range end (epoch ms)"),
    ),
    responses(
        (status = 200, description = "Materialized windows", body = Vec<ScheduleWindow>),
        (status = 400, description = "Invalid date range", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn list_windows(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<impl IntoResponse> {
    if range.from_date_ms > range.to_date_ms {
        return Err(ApiError::invalid_date_range(range.from_date_ms, range.to_date_ms));
    }
    let windows = window_service::list_windows(
        store.as_ref(),
        caller.user_id,
        range.from_date_ms,
        range.to_date_ms,
    )
    .await?;
    Ok(Json(windows))
}

/// POST /api/v1/schedule-windows/materialize - Rebuild windows for a range
#[utoipa::path(
    post,
    path = "/api/v1/schedule-windows/materialize",
    tag = "Windows",
    request_body = MaterializeRequest,
    responses(
        (status = 200, description = "Materialized windows", body = Vec<ScheduleWindow>),
        (status = 400, description = "Invalid date range", body = ApiError),
        (status = 404, description = "No availability configured", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn materialize_windows(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Json(req): Json<MaterializeRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.from_date_ms > req.to_date_ms {
        return Err(ApiError::invalid_date_range(req.from_date_ms, req.to_date_ms));
    }
    let windows = window_service::materialize(
        store.as_ref(),
        caller.user_id,
        req.from_date_ms,
        req.to_date_ms,
    )
    .await?;
    Ok(Json(windows))
}

/// Create the schedule-window routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(list_windows))
        .route("/materialize", axum::routing::post(materialize_windows))
}
