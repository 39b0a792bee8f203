//! Schedule Task REST API Routes

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use tempo_core::ScheduleTask;
use tempo_storage::ScheduleStore;

use crate::{
    error::{ApiError, ApiResult},
    extractors::CallerIdentity,
    services::plan_service,
    state::AppState,
    types::ListTasksQuery,
};

/// GET /api/v1/schedule-tasks - List a plan's task snapshots
#[utoipa::path(
    get,
    path = "/api/v1/schedule-tasks",
    tag = "Tasks",
    params(
        ("planId" = Option<Uuid>, Query, description = "Plan ID (defaults to the active plan)"),
    ),
    responses(
        (status = 200, description = "Task snapshots", body = Vec<ScheduleTask>),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
    )
)]
pub async fn list_tasks(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<impl IntoResponse> {
    let plan = match query.plan_id {
        Some(plan_id) => plan_service::get_plan_owned(store.as_ref(), caller.user_id, plan_id).await?,
        None => plan_service::get_active_plan(store.as_ref(), caller.user_id).await?,
    };

    let tasks = store.task_list_by_plan(plan.id).await?;
    Ok(Json(tasks))
}

/// Create the schedule-task routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new().route("/", axum::routing::get(list_tasks))
}
