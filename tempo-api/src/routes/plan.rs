//! Schedule Plan REST API Routes
//!
//! Plan lifecycle (get-or-create, apply, discard, revert, history) and the
//! optimization entry points (reschedule, deep-optimize, fallback chain).

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use tempo_core::{EntityId, Executor, SchedulePlan};
use tempo_storage::ScheduleStore;

use crate::{
    config::ApiConfig,
    error::{ApiError, ApiResult},
    extractors::CallerIdentity,
    services::{optimizer_service, plan_service},
    state::AppState,
    types::{
        DateRangeQuery, DeepOptimizeRequest, FallbackOptimizeRequest, OptimizationResult,
        PlanDetailResponse, PlanHistoryQuery, PlanHistoryResponse, TriggerRescheduleRequest,
    },
};

/// POST /api/v1/schedule-plans - Get or create the caller's active plan
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans",
    tag = "Plans",
    responses(
        (status = 200, description = "Active plan", body = SchedulePlan),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn get_or_create_active_plan(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::get_or_create_active_plan(
        store.as_ref(),
        caller.user_id,
        caller.tenant_id,
        config.plan_horizon_days,
    )
    .await?;
    Ok(Json(plan))
}

/// GET /api/v1/schedule-plans/active - The caller's active plan
#[utoipa::path(
    get,
    path = "/api/v1/schedule-plans/active",
    tag = "Plans",
    responses(
        (status = 200, description = "Active plan", body = SchedulePlan),
        (status = 404, description = "No active plan", body = ApiError),
    )
)]
pub async fn get_active_plan(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::get_active_plan(store.as_ref(), caller.user_id).await?;
    Ok(Json(plan))
}

/// GET /api/v1/schedule-plans/active/detail - Active plan with events/tasks/stats
#[utoipa::path(
    get,
    path = "/api/v1/schedule-plans/active/detail",
    tag = "Plans",
    params(
        ("fromDateMs" = i64, Query, description = "Range start (epoch ms)"),
        ("toDateMs" = i64, Query, description = "Range end (epoch ms)"),
    ),
    responses(
        (status = 200, description = "Active plan detail", body = PlanDetailResponse),
        (status = 400, description = "Invalid date range", body = ApiError),
        (status = 404, description = "No active plan", body = ApiError),
    )
)]
pub async fn get_active_plan_detail(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::get_active_plan(store.as_ref(), caller.user_id).await?;
    let detail = plan_service::get_plan_detail(
        store.as_ref(),
        caller.user_id,
        plan.id,
        range.from_date_ms,
        range.to_date_ms,
    )
    .await?;
    Ok(Json(detail))
}

/// GET /api/v1/schedule-plans/history - Archived plans, newest first
#[utoipa::path(
    get,
    path = "/api/v1/schedule-plans/history",
    tag = "Plans",
    params(
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("pageSize" = Option<i64>, Query, description = "Page size (max 50)"),
    ),
    responses(
        (status = 200, description = "Plan history", body = PlanHistoryResponse),
    )
)]
pub async fn get_plan_history(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(query): Query<PlanHistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let history = plan_service::get_plan_history(
        store.as_ref(),
        caller.user_id,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(10),
    )
    .await?;
    Ok(Json(history))
}

/// POST /api/v1/schedule-plans/reschedule - Hybrid reschedule of the active plan
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans/reschedule",
    tag = "Plans",
    request_body = TriggerRescheduleRequest,
    responses(
        (status = 200, description = "Optimization result", body = OptimizationResult),
        (status = 404, description = "No active plan", body = ApiError),
        (status = 409, description = "Proposed plan already exists", body = ApiError),
    )
)]
pub async fn trigger_reschedule(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(executor): State<Arc<dyn Executor>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Json(req): Json<TriggerRescheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = optimizer_service::execute_optimization(
        store.as_ref(),
        executor.as_ref(),
        caller.user_id,
        optimizer_service::reschedule_params(req.strategy),
        config.clone_horizon_days,
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/schedule-plans/deep-optimize - Solver-specific optimization
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans/deep-optimize",
    tag = "Plans",
    request_body = DeepOptimizeRequest,
    responses(
        (status = 200, description = "Optimization result", body = OptimizationResult),
        (status = 404, description = "No active plan", body = ApiError),
        (status = 409, description = "Proposed plan already exists for this algorithm", body = ApiError),
    )
)]
pub async fn trigger_deep_optimize(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(executor): State<Arc<dyn Executor>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Json(req): Json<DeepOptimizeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = optimizer_service::execute_optimization(
        store.as_ref(),
        executor.as_ref(),
        caller.user_id,
        optimizer_service::deep_optimize_params(req.strategy, req.max_time_sec),
        config.clone_horizon_days,
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/schedule-plans/optimize-with-fallback - Fallback-chain optimization
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans/optimize-with-fallback",
    tag = "Plans",
    request_body = FallbackOptimizeRequest,
    responses(
        (status = 200, description = "Optimization result", body = OptimizationResult),
        (status = 404, description = "No active plan", body = ApiError),
        (status = 409, description = "Proposed plan already exists", body = ApiError),
    )
)]
pub async fn trigger_fallback_optimize(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(executor): State<Arc<dyn Executor>>,
    State(config): State<Arc<ApiConfig>>,
    caller: CallerIdentity,
    Json(req): Json<FallbackOptimizeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = optimizer_service::execute_optimization(
        store.as_ref(),
        executor.as_ref(),
        caller.user_id,
        optimizer_service::fallback_chain_params(req.max_time_sec),
        config.clone_horizon_days,
    )
    .await?;
    Ok(Json(result))
}

/// GET /api/v1/schedule-plans/{id} - Plan detail in a date range
#[utoipa::path(
    get,
    path = "/api/v1/schedule-plans/{id}",
    tag = "Plans",
    params(
        ("id" = Uuid, Path, description = "Plan ID"),
        ("fromDateMs" = i64, Query, description = "Range start (epoch ms)"),
        ("toDateMs" = i64, Query, description = "Range end (epoch ms)"),
    ),
    responses(
        (status = 200, description = "Plan detail", body = PlanDetailResponse),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
    )
)]
pub async fn get_plan_detail(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<impl IntoResponse> {
    let detail = plan_service::get_plan_detail(
        store.as_ref(),
        caller.user_id,
        id,
        range.from_date_ms,
        range.to_date_ms,
    )
    .await?;
    Ok(Json(detail))
}

/// POST /api/v1/schedule-plans/{id} - Apply a proposed plan
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans/{id}",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Proposed plan ID")),
    responses(
        (status = 200, description = "Now-active plan", body = SchedulePlan),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
        (status = 409, description = "Plan is not proposed", body = ApiError),
    )
)]
pub async fn apply_plan(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::apply_proposed_plan(store.as_ref(), caller.user_id, id).await?;
    Ok(Json(plan))
}

/// DELETE /api/v1/schedule-plans/{id} - Discard a proposed plan
#[utoipa::path(
    delete,
    path = "/api/v1/schedule-plans/{id}",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Proposed plan ID")),
    responses(
        (status = 200, description = "Archived plan", body = SchedulePlan),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
        (status = 409, description = "Plan cannot be discarded", body = ApiError),
    )
)]
pub async fn discard_plan(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::discard_plan(store.as_ref(), caller.user_id, id).await?;
    Ok(Json(plan))
}

/// POST /api/v1/schedule-plans/{id}/revert - Revert to an archived plan
#[utoipa::path(
    post,
    path = "/api/v1/schedule-plans/{id}/revert",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Archived plan ID")),
    responses(
        (status = 200, description = "New active plan", body = SchedulePlan),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
        (status = 409, description = "Plan is not archived", body = ApiError),
    )
)]
pub async fn revert_plan(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let plan = plan_service::revert_to_plan(store.as_ref(), caller.user_id, id).await?;
    Ok(Json(plan))
}

/// Create the schedule-plan routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::post(get_or_create_active_plan))
        .route("/active", axum::routing::get(get_active_plan))
        .route("/active/detail", axum::routing::get(get_active_plan_detail))
        .route("/history", axum::routing::get(get_plan_history))
        .route("/reschedule", axum::routing::post(trigger_reschedule))
        .route("/deep-optimize", axum::routing::post(trigger_deep_optimize))
        .route(
            "/optimize-with-fallback",
            axum::routing::post(trigger_fallback_optimize),
        )
        .route("/:id", axum::routing::get(get_plan_detail))
        .route("/:id", axum::routing::post(apply_plan))
        .route("/:id", axum::routing::delete(discard_plan))
        .route("/:id/revert", axum::routing::post(revert_plan))
}
