//! Request/response DTOs for the REST surface.
//!
//! Wire format is camelCase JSON. Core entities serialize directly in
//! responses; these types cover everything the entities don't.

use serde::{Deserialize, Serialize};
use tempo_core::{
    EntityId, EventStatus, ExceptionKind, Priority, RescheduleStrategy, ScheduleEvent,
    SchedulePlan, ScheduleTask, StrategyKind,
};
use utoipa::ToSchema;

// ============================================================================
// AVAILABILITY
// ============================================================================

/// One rule in a wholesale availability replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRuleInput {
    /// Day of week, Sunday = 0.
    pub day_of_week: i16,
    pub start_min: i32,
    pub end_min: i32,
}

/// PUT /availability body: replaces the user's rules wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAvailabilityRequest {
    pub rules: Vec<AvailabilityRuleInput>,
}

/// POST /availability/exceptions body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExceptionRequest {
    pub date_ms: i64,
    pub start_min: i32,
    pub end_min: i32,
    pub kind: ExceptionKind,
}

// ============================================================================
// WINDOWS
// ============================================================================

/// Epoch-millisecond date range; `from > to` is always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub from_date_ms: i64,
    pub to_date_ms: i64,
}

/// POST /schedule-windows/materialize body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeRequest {
    pub from_date_ms: i64,
    pub to_date_ms: i64,
}

// ============================================================================
// EVENTS
// ============================================================================

/// One event in a batch save. Without an `id` the event is created; with
/// one, the existing event is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub id: Option<EntityId>,
    #[schema(value_type = String, format = "uuid")]
    pub schedule_task_id: EntityId,
    pub date_ms: i64,
    pub start_min: i32,
    pub end_min: i32,
    pub title: String,
    /// Defaults to `PLANNED`.
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub is_pinned: bool,
}

/// POST /schedule-events body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveEventsRequest {
    #[schema(value_type = String, format = "uuid")]
    pub schedule_plan_id: EntityId,
    pub events: Vec<EventInput>,
}

/// GET /schedule-events query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    /// Defaults to the caller's active plan.
    #[schema(value_type = Option<String>, format = "uuid")]
    pub plan_id: Option<EntityId>,
    pub from_date_ms: i64,
    pub to_date_ms: i64,
}

/// POST /schedule-events/{id}/move body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveEventRequest {
    pub new_date_ms: i64,
    pub new_start_min: i32,
    pub new_end_min: i32,
}

/// Result of a move; a conflict does not block the move, it signals that a
/// reschedule trigger was enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveEventResponse {
    pub event: ScheduleEvent,
    pub has_conflicts: bool,
    pub conflicting_events: Vec<ScheduleEvent>,
}

/// POST /schedule-events/{id}/complete body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEventRequest {
    pub actual_start_min: i32,
    pub actual_end_min: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEventResponse {
    pub event: ScheduleEvent,
    pub all_parts_completed: bool,
    pub remaining_parts: i64,
    pub total_actual_min: i32,
}

/// POST /schedule-events/{id}/split body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SplitEventRequest {
    pub split_point_min: i32,
    /// Defaults to the engine minimum (30 minutes).
    pub min_split_duration_min: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SplitEventResponse {
    pub original_event: ScheduleEvent,
    pub new_event: ScheduleEvent,
    pub total_parts: i32,
}

// ============================================================================
// PLANS & OPTIMIZATION
// ============================================================================

/// POST /schedule-plans/reschedule body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRescheduleRequest {
    /// Defaults to `RIPPLE`.
    pub strategy: Option<RescheduleStrategy>,
}

/// POST /schedule-plans/deep-optimize body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeepOptimizeRequest {
    pub strategy: StrategyKind,
    pub max_time_sec: Option<i32>,
}

/// POST /schedule-plans/optimize-with-fallback body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FallbackOptimizeRequest {
    pub max_time_sec: Option<i32>,
}

/// GET /schedule-plans/history query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanHistoryQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Aggregate statistics over a plan's tasks and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    pub total_tasks: i64,
    pub scheduled_tasks: i64,
    pub unscheduled_tasks: i64,
    pub total_duration_min: i64,
    pub scheduled_min: i64,
    /// scheduled minutes / total estimated minutes, in percent.
    pub utilization_pct: f64,
}

impl PlanStats {
    /// Derive stats from a plan's tasks and the events placed for them.
    pub fn compute(tasks: &[ScheduleTask], events: &[ScheduleEvent]) -> Self {
        let total_tasks = tasks.len() as i64;
        let total_duration_min: i64 = tasks.iter().map(|t| i64::from(t.duration_min)).sum();

        let mut scheduled_task_ids = std::collections::HashSet::new();
        let mut scheduled_min: i64 = 0;
        for event in events {
            scheduled_task_ids.insert(event.schedule_task_id);
            scheduled_min += i64::from(event.duration_minutes());
        }

        let scheduled_tasks = scheduled_task_ids.len() as i64;
        let utilization_pct = if total_duration_min > 0 {
            scheduled_min as f64 / total_duration_min as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_tasks,
            scheduled_tasks,
            unscheduled_tasks: total_tasks - scheduled_tasks,
            total_duration_min,
            scheduled_min,
            utilization_pct,
        }
    }
}

/// Full plan view: the plan, its events in a range, the tasks those events
/// reference, and aggregate stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanDetailResponse {
    pub plan: SchedulePlan,
    pub events: Vec<ScheduleEvent>,
    pub tasks: Vec<ScheduleTask>,
    pub stats: PlanStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanHistoryResponse {
    pub plans: Vec<SchedulePlan>,
    pub total_count: i64,
}

/// Outcome of an optimization run. An executor failure is reported here
/// (`success: false` + `errorMessage`), not as a transport error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub success: bool,
    pub duration_ms: i64,
    pub tasks_scheduled: i64,
    pub tasks_unscheduled: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_plan: Option<PlanDetailResponse>,
}

// ============================================================================
// TASKS
// ============================================================================

/// GET /schedule-tasks query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    /// Defaults to the caller's active plan.
    #[schema(value_type = Option<String>, format = "uuid")]
    pub plan_id: Option<EntityId>,
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub store_healthy: bool,
}

// ============================================================================
// INBOUND TASK EVENTS
// ============================================================================

/// Metadata envelope carried by every task-lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub event_id: String,
    pub event_type: String,
    pub source: String,
    pub version: String,
    pub timestamp: i64,
    pub trace_id: Option<String>,
}

/// Task fields carried by created/updated events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventPayload {
    #[schema(value_type = String, format = "uuid")]
    pub task_id: EntityId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: EntityId,
    #[schema(value_type = String, format = "uuid")]
    pub tenant_id: EntityId,
    pub title: String,
    pub duration_min: i32,
    pub priority: Priority,
    #[serde(default)]
    pub is_deep_work: bool,
    pub earliest_start_ms: Option<i64>,
    pub deadline_ms: Option<i64>,
    pub preferred_start_ms: Option<i64>,
    #[serde(default)]
    pub allow_split: bool,
    #[serde(default)]
    pub min_split_duration_min: i32,
    #[serde(default)]
    pub max_split_count: i32,
    #[serde(default)]
    #[schema(value_type = Vec<String>, format = "uuid")]
    pub dependent_task_ids: Vec<EntityId>,
    #[serde(default)]
    pub buffer_before_min: i32,
    #[serde(default)]
    pub buffer_after_min: i32,
    pub category: Option<String>,
}

/// Typed payload of a task-lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum TaskEventKind {
    TaskCreated {
        task: TaskEventPayload,
    },
    TaskUpdated {
        task: TaskEventPayload,
    },
    TaskDeleted {
        #[schema(value_type = String, format = "uuid")]
        task_id: EntityId,
        #[schema(value_type = String, format = "uuid")]
        user_id: EntityId,
    },
    TaskBulkDeleted {
        #[schema(value_type = Vec<String>, format = "uuid")]
        task_ids: Vec<EntityId>,
        #[schema(value_type = String, format = "uuid")]
        user_id: EntityId,
    },
}

/// Full inbound event: envelope plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventEnvelope {
    pub meta: EventMeta,
    #[serde(flatten)]
    pub payload: TaskEventKind,
}

/// Acknowledgement for an ingested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventAck {
    pub event_id: String,
    /// `true` when the event had already been processed and was skipped.
    pub duplicate: bool,
}
