//! Availability & Calendar Exception REST API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use tempo_core::{AvailabilityRule, CalendarException, EntityId};
use tempo_storage::ScheduleStore;

use crate::{
    config::ApiConfig,
    error::{ApiError, ApiResult},
    extractors::CallerIdentity,
    services::window_service,
    state::AppState,
    types::{CreateExceptionRequest, DateRangeQuery, ReplaceAvailabilityRequest},
};

/// GET /api/v1/availability - List the caller's availability rules
#[utoipa::path(
    get,
    path = "/api/v1/availability",
    tag = "Availability",
    responses(
        (status = 200, description = "Availability rules", body = Vec<AvailabilityRule>),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn list_availability(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
) -> ApiResult<impl IntoResponse> {
    let rules = store.availability_list(caller.user_id).await?;
    Ok(Json(rules))
}

/// PUT /api/v1/availability - Replace the caller's rules wholesale
#[utoipa::path(
    put,
    path = "/api/v1/availability",
    tag = "Availability",
    request_body = ReplaceAvailabilityRequest,
    responses(
        (status = 200, description = "Rules replaced", body = Vec<AvailabilityRule>),
        (status = 400, description = "Invalid rule", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn replace_availability(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Json(req): Json<ReplaceAvailabilityRequest>,
) -> ApiResult<impl IntoResponse> {
    let rules: Vec<AvailabilityRule> = req
        .rules
        .iter()
        .map(|rule| {
            AvailabilityRule::new(caller.user_id, rule.day_of_week, rule.start_min, rule.end_min)
        })
        .collect();

    let stored = window_service::replace_availability(
        store.as_ref(),
        caller.user_id,
        rules,
        config.materialize_horizon_days,
    )
    .await?;
    Ok(Json(stored))
}

/// GET /api/v1/availability/exceptions - List exceptions in a date range
#[utoipa::path(
    get,
    path = "/api/v1/availability/exceptions",
    tag = "Availability",
    params(
        ("fromDateMs" = i64, Query, description = "Range start (epoch ms)"),
        ("toDateMs" = i64, Query, description = "Range end (epoch ms)"),
    ),
    responses(
        (status = 200, description = "Calendar exceptions", body = Vec<CalendarException>),
        (status = 400, description = "Invalid date range", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn list_exceptions(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<impl IntoResponse> {
    if range.from_date_ms > range.to_date_ms {
        return Err(ApiError::invalid_date_range(range.from_date_ms, range.to_date_ms));
    }
    let exceptions = store
        .exception_list(caller.user_id, range.from_date_ms, range.to_date_ms)
        .await?;
    Ok(Json(exceptions))
}

/// POST /api/v1/availability/exceptions - Record a one-off exception
#[utoipa::path(
    post,
    path = "/api/v1/availability/exceptions",
    tag = "Availability",
    request_body = CreateExceptionRequest,
    responses(
        (status = 201, description = "Exception created", body = CalendarException),
        (status = 400, description = "Invalid interval", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn create_exception(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Json(req): Json<CreateExceptionRequest>,
) -> ApiResult<impl IntoResponse> {
    let exception = CalendarException::new(
        caller.user_id,
        req.date_ms,
        req.start_min,
        req.end_min,
        req.kind,
    );
    let created = window_service::add_exception(
        store.as_ref(),
        exception,
        config.materialize_horizon_days,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /api/v1/availability/exceptions/{id} - Remove an exception
#[utoipa::path(
    delete,
    path = "/api/v1/availability/exceptions/{id}",
    tag = "Availability",
    params(("id" = Uuid, Path, description = "Exception ID")),
    responses(
        (status = 204, description = "Exception removed"),
        (status = 404, description = "Exception not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn delete_exception(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
) -> ApiResult<StatusCode> {
    window_service::remove_exception(
        store.as_ref(),
        caller.user_id,
        id,
        config.materialize_horizon_days,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the availability routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(list_availability))
        .route("/", axum::routing::put(replace_availability))
        .route("/exceptions", axum::routing::get(list_exceptions))
        .route("/exceptions", axum::routing::post(create_exception))
        .route("/exceptions/:id", axum::routing::delete(delete_exception))
}
