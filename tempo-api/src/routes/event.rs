//! Schedule Event REST API Routes
//!
//! Listing, batch save, and the move/complete/split/skip operations.
//! Ownership is enforced through the owning plan before any mutation.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use tempo_core::{EntityId, EventStatus, ScheduleEvent};
use tempo_storage::ScheduleStore;

use crate::{
    config::PollerConfig,
    error::{ApiError, ApiResult},
    extractors::CallerIdentity,
    services::{event_service, plan_service},
    state::AppState,
    types::{
        CompleteEventRequest, CompleteEventResponse, EventInput, ListEventsQuery,
        MoveEventRequest, MoveEventResponse, SaveEventsRequest, SplitEventRequest,
        SplitEventResponse,
    },
};

/// Resolve an event and verify the caller owns its plan.
async fn get_event_owned(
    store: &dyn ScheduleStore,
    caller: CallerIdentity,
    event_id: EntityId,
) -> ApiResult<ScheduleEvent> {
    let event = store
        .event_get(event_id)
        .await?
        .ok_or_else(|| ApiError::event_not_found(event_id))?;
    plan_service::get_plan_owned(store, caller.user_id, event.schedule_plan_id).await?;
    Ok(event)
}

fn build_event(plan_id: EntityId, input: &EventInput) -> ScheduleEvent {
    let mut event = ScheduleEvent::new(
        plan_id,
        input.schedule_task_id,
        input.date_ms,
        input.start_min,
        input.end_min,
        input.title.clone(),
    );
    if let Some(id) = input.id {
        event.id = id;
    }
    event.status = input.status.unwrap_or(EventStatus::Planned);
    event.is_pinned = input.is_pinned;
    event
}

/// GET /api/v1/schedule-events - List events by plan and date range
#[utoipa::path(
    get,
    path = "/api/v1/schedule-events",
    tag = "Events",
    params(
        ("planId" = Option<Uuid>, Query, description = "Plan ID (defaults to the active plan)"),
        ("fromDateMs" = i64, Query, description = "Range start (epoch ms)"),
        ("toDateMs" = i64, Query, description = "Range end (epoch ms)"),
    ),
    responses(
        (status = 200, description = "Events in range", body = Vec<ScheduleEvent>),
        (status = 400, description = "Invalid date range", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    )
)]
pub async fn list_events(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.from_date_ms > query.to_date_ms {
        return Err(ApiError::invalid_date_range(query.from_date_ms, query.to_date_ms));
    }

    let plan = match query.plan_id {
        Some(plan_id) => plan_service::get_plan_owned(store.as_ref(), caller.user_id, plan_id).await?,
        None => plan_service::get_active_plan(store.as_ref(), caller.user_id).await?,
    };

    let events = event_service::list_events(
        store.as_ref(),
        plan.id,
        query.from_date_ms,
        query.to_date_ms,
    )
    .await?;
    Ok(Json(events))
}

/// POST /api/v1/schedule-events - Save a validated batch of events
#[utoipa::path(
    post,
    path = "/api/v1/schedule-events",
    tag = "Events",
    request_body = SaveEventsRequest,
    responses(
        (status = 200, description = "Saved events", body = Vec<ScheduleEvent>),
        (status = 400, description = "Validation failed (overlap, bad interval)", body = ApiError),
        (status = 403, description = "Plan belongs to another user", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
    )
)]
pub async fn save_events(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Json(req): Json<SaveEventsRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan =
        plan_service::get_plan_owned(store.as_ref(), caller.user_id, req.schedule_plan_id).await?;

    let events: Vec<ScheduleEvent> = req
        .events
        .iter()
        .map(|input| build_event(plan.id, input))
        .collect();

    let saved = event_service::save_batch(store.as_ref(), plan.id, events).await?;
    Ok(Json(saved))
}

/// POST /api/v1/schedule-events/{id}/move - Relocate and pin an event
#[utoipa::path(
    post,
    path = "/api/v1/schedule-events/{id}/move",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = MoveEventRequest,
    responses(
        (status = 200, description = "Move result with conflict report", body = MoveEventResponse),
        (status = 400, description = "Invalid target slot or terminal event", body = ApiError),
        (status = 404, description = "Event not found", body = ApiError),
    )
)]
pub async fn move_event(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(poller_config): State<Arc<PollerConfig>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
    Json(req): Json<MoveEventRequest>,
) -> ApiResult<impl IntoResponse> {
    get_event_owned(store.as_ref(), caller, id).await?;

    let outcome = event_service::move_event(
        store.as_ref(),
        id,
        req.new_date_ms,
        req.new_start_min,
        req.new_end_min,
        poller_config.debounce_chrono(),
    )
    .await?;

    Ok(Json(MoveEventResponse {
        event: outcome.event,
        has_conflicts: outcome.has_conflicts,
        conflicting_events: outcome.conflicting_events,
    }))
}

/// POST /api/v1/schedule-events/{id}/complete - Mark an event done
#[utoipa::path(
    post,
    path = "/api/v1/schedule-events/{id}/complete",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = CompleteEventRequest,
    responses(
        (status = 200, description = "Completion result", body = CompleteEventResponse),
        (status = 400, description = "Invalid actual times", body = ApiError),
        (status = 404, description = "Event not found", body = ApiError),
        (status = 409, description = "Event is terminal", body = ApiError),
    )
)]
pub async fn complete_event(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(poller_config): State<Arc<PollerConfig>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
    Json(req): Json<CompleteEventRequest>,
) -> ApiResult<impl IntoResponse> {
    get_event_owned(store.as_ref(), caller, id).await?;

    let outcome = event_service::complete_event(
        store.as_ref(),
        id,
        req.actual_start_min,
        req.actual_end_min,
        poller_config.debounce_chrono(),
    )
    .await?;

    Ok(Json(CompleteEventResponse {
        event: outcome.event,
        all_parts_completed: outcome.all_parts_completed,
        remaining_parts: outcome.remaining_parts,
        total_actual_min: outcome.total_actual_min,
    }))
}

/// POST /api/v1/schedule-events/{id}/split - Split an event into two parts
#[utoipa::path(
    post,
    path = "/api/v1/schedule-events/{id}/split",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = SplitEventRequest,
    responses(
        (status = 200, description = "Split result", body = SplitEventResponse),
        (status = 400, description = "Invalid split point", body = ApiError),
        (status = 404, description = "Event not found", body = ApiError),
    )
)]
pub async fn split_event(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(poller_config): State<Arc<PollerConfig>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
    Json(req): Json<SplitEventRequest>,
) -> ApiResult<impl IntoResponse> {
    get_event_owned(store.as_ref(), caller, id).await?;

    let outcome = event_service::split_event(
        store.as_ref(),
        id,
        req.split_point_min,
        req.min_split_duration_min.unwrap_or_default(),
        poller_config.debounce_chrono(),
    )
    .await?;

    Ok(Json(SplitEventResponse {
        original_event: outcome.original,
        new_event: outcome.new_part,
        total_parts: outcome.total_parts,
    }))
}

/// POST /api/v1/schedule-events/{id}/skip - Skip an event (terminal)
#[utoipa::path(
    post,
    path = "/api/v1/schedule-events/{id}/skip",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Skipped event", body = ScheduleEvent),
        (status = 404, description = "Event not found", body = ApiError),
        (status = 409, description = "Event is terminal", body = ApiError),
    )
)]
pub async fn skip_event(
    State(store): State<Arc<dyn ScheduleStore>>,
    caller: CallerIdentity,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    get_event_owned(store.as_ref(), caller, id).await?;
    let event = event_service::skip_event(store.as_ref(), id).await?;
    Ok(Json(event))
}

/// Create the schedule-event routes router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(list_events))
        .route("/", axum::routing::post(save_events))
        .route("/:id/move", axum::routing::post(move_event))
        .route("/:id/complete", axum::routing::post(complete_event))
        .route("/:id/split", axum::routing::post(split_event))
        .route("/:id/skip", axum::routing::post(skip_event))
}
