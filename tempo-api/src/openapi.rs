//! OpenAPI document for the Tempo API.

use utoipa::OpenApi;

use crate::routes;
use crate::types;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tempo Scheduling API",
        description = "Availability-driven task scheduling: windows, plans, events, and the reschedule queue.",
        license(name = "MIT"),
    ),
    paths(
        routes::health,
        routes::ingest_task_event,
        routes::availability::list_availability,
        routes::availability::replace_availability,
        routes::availability::list_exceptions,
        routes::availability::create_exception,
        routes::availability::delete_exception,
        routes::window::list_windows,
        routes::window::materialize_windows,
        routes::event::list_events,
        routes::event::save_events,
        routes::event::move_event,
        routes::event::complete_event,
        routes::event::split_event,
        routes::event::skip_event,
        routes::plan::get_or_create_active_plan,
        routes::plan::get_active_plan,
        routes::plan::get_active_plan_detail,
        routes::plan::get_plan_history,
        routes::plan::trigger_reschedule,
        routes::plan::trigger_deep_optimize,
        routes::plan::trigger_fallback_optimize,
        routes::plan::get_plan_detail,
        routes::plan::apply_plan,
        routes::plan::discard_plan,
        routes::plan::revert_plan,
        routes::task::list_tasks,
    ),
    components(schemas(
        crate::error::ApiError,
        crate::error::ErrorCode,
        types::AvailabilityRuleInput,
        types::ReplaceAvailabilityRequest,
        types::CreateExceptionRequest,
        types::DateRangeQuery,
        types::MaterializeRequest,
        types::EventInput,
        types::SaveEventsRequest,
        types::MoveEventRequest,
        types::MoveEventResponse,
        types::CompleteEventRequest,
        types::CompleteEventResponse,
        types::SplitEventRequest,
        types::SplitEventResponse,
        types::TriggerRescheduleRequest,
        types::DeepOptimizeRequest,
        types::FallbackOptimizeRequest,
        types::PlanStats,
        types::PlanDetailResponse,
        types::PlanHistoryResponse,
        types::OptimizationResult,
        types::HealthResponse,
        types::EventMeta,
        types::TaskEventPayload,
        types::TaskEventKind,
        types::TaskEventEnvelope,
        types::EventAck,
        tempo_core::AvailabilityRule,
        tempo_core::CalendarException,
        tempo_core::ScheduleWindow,
        tempo_core::SchedulePlan,
        tempo_core::ScheduleTask,
        tempo_core::ScheduleEvent,
        tempo_core::AvailabilityStatus,
        tempo_core::ExceptionKind,
        tempo_core::PlanType,
        tempo_core::PlanStatus,
        tempo_core::Priority,
        tempo_core::TaskScheduleStatus,
        tempo_core::EventStatus,
        tempo_core::RescheduleStrategy,
        tempo_core::Algorithm,
        tempo_core::StrategyKind,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).expect("serialize openapi doc");
        assert!(json.contains("/api/v1/schedule-plans/reschedule"));
        assert!(json.contains("/api/v1/schedule-windows/materialize"));
    }
}
