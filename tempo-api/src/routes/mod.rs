//! REST API route modules and router assembly.

pub mod availability;
pub mod event;
pub mod plan;
pub mod task;
pub mod window;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tempo_storage::ScheduleStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::PollerConfig,
    error::{ApiError, ApiResult},
    events::{self, IngestOutcome},
    state::AppState,
    types::{EventAck, HealthResponse, TaskEventEnvelope},
};

/// GET /api/v1/health - Liveness and store health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(
    State(store): State<Arc<dyn ScheduleStore>>,
) -> ApiResult<impl IntoResponse> {
    let store_healthy = store.health_check().await.unwrap_or(false);
    Ok(Json(HealthResponse {
        status: if store_healthy { "ok" } else { "degraded" }.to_string(),
        store_healthy,
    }))
}

/// POST /api/v1/events/task - Ingest a task-lifecycle event
///
/// The transport adapter (message consumer, gateway) delivers events here;
/// processing is idempotent keyed by `meta.eventId`.
#[utoipa::path(
    post,
    path = "/api/v1/events/task",
    tag = "Events",
    request_body = TaskEventEnvelope,
    responses(
        (status = 200, description = "Event processed or deduplicated", body = EventAck),
        (status = 400, description = "Malformed envelope", body = ApiError),
        (status = 404, description = "No active plan for the event's user", body = ApiError),
    )
)]
pub async fn ingest_task_event(
    State(store): State<Arc<dyn ScheduleStore>>,
    State(config): State<Arc<crate::config::ApiConfig>>,
    State(poller_config): State<Arc<PollerConfig>>,
    Json(envelope): Json<TaskEventEnvelope>,
) -> ApiResult<impl IntoResponse> {
    if envelope.meta.event_id.trim().is_empty() {
        return Err(ApiError::invalid_input("meta.eventId must not be empty"));
    }

    let outcome = events::ingest_task_event(
        store.as_ref(),
        &envelope,
        config.plan_horizon_days,
        poller_config.debounce_chrono(),
    )
    .await?;

    Ok(Json(EventAck {
        event_id: envelope.meta.event_id,
        duplicate: outcome == IngestOutcome::Duplicate,
    }))
}

/// Assemble the full API router.
pub fn create_api_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/events/task", post(ingest_task_event))
        .nest("/availability", availability::create_router())
        .nest("/schedule-windows", window::create_router())
        .nest("/schedule-events", event::create_router())
        .nest("/schedule-plans", plan::create_router())
        .nest("/schedule-tasks", task::create_router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        // Dev mode: allow all origins.
        return CorsLayer::permissive();
    }

    let parsed: Vec<axum::http::HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
