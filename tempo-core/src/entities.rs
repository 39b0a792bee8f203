//! Core entity structures.
//!
//! Entities carry their own domain behavior (state transitions, overlap
//! checks, split/clone logic); persistence is the storage layer's problem.

use crate::enums::{
    AvailabilityStatus, EventStatus, ExceptionKind, PlanStatus, PlanType, Priority,
    TaskScheduleStatus,
};
use crate::error::{ScheduleError, ScheduleResult};
use crate::{
    absolute_ms, compute_snapshot_hash, day_start_utc, is_valid_interval, new_entity_id,
    Algorithm, EntityId, Timestamp, DAY_MS, DEFAULT_MIN_SPLIT_DURATION_MIN,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// AVAILABILITY & EXCEPTIONS
// ============================================================================

/// Recurring weekly availability rule: "on this weekday I am available
/// from `start_min` to `end_min`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRule {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    /// Day of week, Sunday = 0.
    pub day_of_week: i16,
    pub start_min: i32,
    pub end_min: i32,
    pub status: AvailabilityStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl AvailabilityRule {
    pub fn new(user_id: EntityId, day_of_week: i16, start_min: i32, end_min: i32) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            user_id,
            day_of_week,
            start_min,
            end_min,
            status: AvailabilityStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        (0..=6).contains(&self.day_of_week) && is_valid_interval(self.start_min, self.end_min)
    }

    pub fn is_active(&self) -> bool {
        self.status == AvailabilityStatus::Active
    }
}

/// One-off calendar exception on a specific date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CalendarException {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    /// Day-truncated epoch milliseconds (UTC midnight).
    pub date_ms: i64,
    pub start_min: i32,
    pub end_min: i32,
    pub kind: ExceptionKind,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl CalendarException {
    pub fn new(
        user_id: EntityId,
        date_ms: i64,
        start_min: i32,
        end_min: i32,
        kind: ExceptionKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            user_id,
            date_ms: day_start_utc(date_ms),
            start_min,
            end_min,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.date_ms > 0 && is_valid_interval(self.start_min, self.end_min)
    }
}

/// Materialized concrete available interval for one day.
///
/// A pure value derived from rules and exceptions; regenerated wholesale
/// whenever its inputs change, never hand-edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindow {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    pub date_ms: i64,
    pub start_min: i32,
    pub end_min: i32,
}

impl ScheduleWindow {
    pub fn duration_minutes(&self) -> i32 {
        self.end_min - self.start_min
    }
}

// ============================================================================
// SCHEDULE PLAN
// ============================================================================

/// Versioned container for a full schedule (tasks + events) over a date
/// horizon. Exactly one plan per user is `Active` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlan {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: EntityId,
    pub start_date_ms: i64,
    pub end_date_ms: Option<i64>,
    pub plan_name: String,
    pub plan_type: PlanType,
    pub algorithm_used: Algorithm,
    pub optimization_score: Option<f64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub optimization_timestamp: Option<Timestamp>,
    pub optimization_duration_ms: Option<i64>,
    pub optimization_error: Option<String>,
    pub version: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub parent_plan_id: Option<EntityId>,
    pub status: PlanStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl SchedulePlan {
    /// First plan for a user: a rolling horizon starting today.
    pub fn new_rolling(user_id: EntityId, tenant_id: EntityId, horizon_days: i64) -> Self {
        let now = Utc::now();
        let start = day_start_utc(now.timestamp_millis());
        Self {
            id: new_entity_id(),
            user_id,
            tenant_id,
            start_date_ms: start,
            end_date_ms: Some(start + horizon_days * DAY_MS),
            plan_name: "My Schedule".to_string(),
            plan_type: PlanType::Rolling,
            algorithm_used: Algorithm::Hybrid,
            optimization_score: None,
            optimization_timestamp: None,
            optimization_duration_ms: None,
            optimization_error: None,
            version: 1,
            parent_plan_id: None,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next version of this plan, proposed and not yet optimized.
    ///
    /// Copies the identity fields, bumps `version`, points `parent_plan_id`
    /// back here, and clears all optimization results.
    pub fn create_next_version(&self) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            start_date_ms: self.start_date_ms,
            end_date_ms: self.end_date_ms,
            plan_name: self.plan_name.clone(),
            plan_type: self.plan_type,
            algorithm_used: self.algorithm_used,
            optimization_score: None,
            optimization_timestamp: None,
            optimization_duration_ms: None,
            optimization_error: None,
            version: self.version + 1,
            parent_plan_id: Some(self.id),
            status: PlanStatus::Proposed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn belongs_to(&self, user_id: EntityId) -> bool {
        self.user_id == user_id
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// Validated state-machine transition.
    pub fn transition_to(&mut self, next: PlanStatus) -> ScheduleResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ScheduleError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter `Optimizing`, recording which algorithm is running.
    pub fn start_optimization(&mut self, algorithm: Algorithm) -> ScheduleResult<()> {
        self.transition_to(PlanStatus::Optimizing)?;
        self.algorithm_used = algorithm;
        self.optimization_timestamp = Some(Utc::now());
        self.optimization_error = None;
        Ok(())
    }

    /// Finish optimization successfully; the plan is ready for review.
    pub fn complete_optimization(&mut self, score: f64, duration_ms: i64) -> ScheduleResult<()> {
        self.transition_to(PlanStatus::Proposed)?;
        self.optimization_score = Some(score);
        self.optimization_duration_ms = Some(duration_ms);
        Ok(())
    }

    /// Record an optimization failure. The error message stays visible on
    /// the plan so the user sees why it failed.
    pub fn fail_optimization(&mut self, reason: impl Into<String>) {
        // Best-effort: a failure must stick even from unexpected states.
        self.status = PlanStatus::Failed;
        self.optimization_error = Some(reason.into());
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// SCHEDULE TASK
// ============================================================================

/// Per-plan snapshot of an external work item, carrying its scheduling
/// constraints. One row per (plan, external task); cloned whenever the
/// plan is cloned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTask {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub schedule_plan_id: EntityId,
    /// External task identity preserved across plan clones.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: EntityId,
    pub task_snapshot_hash: String,
    pub title: String,
    pub duration_min: i32,
    pub priority: Priority,
    pub priority_score: f64,
    pub category: Option<String>,
    pub is_deep_work: bool,
    pub earliest_start_ms: Option<i64>,
    pub deadline_ms: Option<i64>,
    pub preferred_start_ms: Option<i64>,
    pub allow_split: bool,
    pub min_split_duration_min: i32,
    pub max_split_count: i32,
    pub is_pinned: bool,
    pub pinned_start_ms: Option<i64>,
    pub pinned_end_ms: Option<i64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>, format = "uuid"))]
    pub dependent_task_ids: Vec<EntityId>,
    pub buffer_before_min: i32,
    pub buffer_after_min: i32,
    pub schedule_status: TaskScheduleStatus,
    pub unscheduled_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl ScheduleTask {
    /// Hash over the constraint-relevant fields only. Title and category
    /// are display-only and excluded: changing them must not trigger a
    /// reschedule.
    pub fn calculate_snapshot_hash(&self) -> String {
        let deadline = self.deadline_ms.map(|v| v.to_string()).unwrap_or_default();
        let earliest = self
            .earliest_start_ms
            .map(|v| v.to_string())
            .unwrap_or_default();
        let deps = self
            .dependent_task_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        compute_snapshot_hash(&[
            &self.duration_min.to_string(),
            self.priority.as_str(),
            &deadline,
            &earliest,
            &format!(
                "{}-{}-{}",
                self.allow_split, self.min_split_duration_min, self.max_split_count
            ),
            &deps,
            &format!("{}-{}", self.buffer_before_min, self.buffer_after_min),
        ])
    }

    pub fn has_constraints_changed(&self, incoming_hash: &str) -> bool {
        self.task_snapshot_hash != incoming_hash
    }

    // === Pinning ===

    /// Pin to an absolute time range. A pinned task counts as manually
    /// scheduled.
    pub fn pin_to(&mut self, start_ms: i64, end_ms: i64) {
        self.is_pinned = true;
        self.pinned_start_ms = Some(start_ms);
        self.pinned_end_ms = Some(end_ms);
        self.schedule_status = TaskScheduleStatus::Scheduled;
        self.updated_at = Utc::now();
    }

    pub fn unpin(&mut self) {
        self.is_pinned = false;
        self.pinned_start_ms = None;
        self.pinned_end_ms = None;
        self.schedule_status = TaskScheduleStatus::Pending;
        self.updated_at = Utc::now();
    }

    // === Scoring ===

    /// Base score by priority, plus an urgency boost when the deadline is
    /// near and a flat bonus for deep work.
    pub fn recalculate_priority_score(&mut self, now_ms: i64) {
        let base = match self.priority {
            Priority::High => 100.0,
            Priority::Medium => 50.0,
            Priority::Low => 10.0,
        };

        let urgency = match self.deadline_ms {
            Some(deadline) => {
                let remaining_min = (deadline - now_ms) / 60_000;
                if remaining_min <= 0 {
                    500.0
                } else if remaining_min < 1_440 {
                    200.0
                } else if remaining_min < 4_320 {
                    50.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let deep_work = if self.is_deep_work { 20.0 } else { 0.0 };

        self.priority_score = base + urgency + deep_work;
    }

    // === Scheduling checks ===

    /// Whether a chunk of `duration_min` minutes is an acceptable placement
    /// unit for this task.
    pub fn is_valid_chunk(&self, duration_min: i32) -> bool {
        if !self.allow_split {
            return duration_min >= self.duration_min;
        }
        duration_min >= self.min_split_duration_min
    }

    pub fn total_duration_with_buffer(&self) -> i32 {
        self.duration_min + self.buffer_before_min + self.buffer_after_min
    }

    pub fn is_overdue(&self, now_ms: i64) -> bool {
        matches!(self.deadline_ms, Some(deadline) if deadline < now_ms)
    }

    /// Whether the optimizer should consider this task for a plan covering
    /// `[from_ms, to_ms]`: not completed, not past its deadline window, and
    /// not starting after the horizon.
    pub fn is_schedulable_for(&self, from_ms: i64, to_ms: i64) -> bool {
        if self.schedule_status == TaskScheduleStatus::Completed {
            return false;
        }
        if matches!(self.deadline_ms, Some(deadline) if deadline < from_ms) {
            return false;
        }
        if matches!(self.earliest_start_ms, Some(earliest) if earliest > to_ms) {
            return false;
        }
        true
    }

    // === Lifecycle ===

    pub fn mark_scheduled(&mut self) {
        self.schedule_status = TaskScheduleStatus::Scheduled;
        self.unscheduled_reason = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_unschedulable(&mut self, reason: impl Into<String>) {
        self.schedule_status = TaskScheduleStatus::Unschedulable;
        self.unscheduled_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.schedule_status = TaskScheduleStatus::Completed;
        self.unscheduled_reason = None;
        self.updated_at = Utc::now();
    }

    pub fn reset_status(&mut self) {
        self.schedule_status = TaskScheduleStatus::Pending;
        self.unscheduled_reason = None;
        self.updated_at = Utc::now();
    }

    /// Snapshot clone owned by another plan. New row id, same external
    /// `task_id` linkage.
    pub fn clone_for_plan(&self, new_plan_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            schedule_plan_id: new_plan_id,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

// ============================================================================
// SCHEDULE EVENT
// ============================================================================

/// Concrete placed time-block instance of a schedule task.
///
/// `part_index`/`total_parts`/`linked_event_id` encode a task split into
/// multiple non-contiguous blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub schedule_plan_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub schedule_task_id: EntityId,
    /// Day-truncated epoch milliseconds (UTC midnight).
    pub date_ms: i64,
    pub start_min: i32,
    pub end_min: i32,
    pub title: String,
    pub part_index: i32,
    pub total_parts: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub linked_event_id: Option<EntityId>,
    pub status: EventStatus,
    pub is_pinned: bool,
    pub utility_score: Option<f64>,
    pub actual_start_min: Option<i32>,
    pub actual_end_min: Option<i32>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl ScheduleEvent {
    pub fn new(
        plan_id: EntityId,
        task_id: EntityId,
        date_ms: i64,
        start_min: i32,
        end_min: i32,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            schedule_plan_id: plan_id,
            schedule_task_id: task_id,
            date_ms: day_start_utc(date_ms),
            start_min,
            end_min,
            title: title.into(),
            part_index: 1,
            total_parts: 1,
            linked_event_id: None,
            status: EventStatus::Planned,
            is_pinned: false,
            utility_score: None,
            actual_start_min: None,
            actual_end_min: None,
            created_at: now,
            updated_at: now,
        }
    }

    // === Basic checks ===

    pub fn is_valid(&self) -> bool {
        self.date_ms > 0
            && is_valid_interval(self.start_min, self.end_min)
            && self.part_index >= 1
            && self.total_parts >= 1
            && self.part_index <= self.total_parts
    }

    pub fn belongs_to_plan(&self, plan_id: EntityId) -> bool {
        self.schedule_plan_id == plan_id
    }

    pub fn duration_minutes(&self) -> i32 {
        self.end_min - self.start_min
    }

    /// Only planned events can be moved, split, or resized.
    pub fn can_be_modified(&self) -> bool {
        self.status == EventStatus::Planned
    }

    pub fn has_actual_times(&self) -> bool {
        self.actual_start_min.is_some() && self.actual_end_min.is_some()
    }

    pub fn is_multi_part(&self) -> bool {
        self.total_parts > 1
    }

    // === Overlap detection ===

    /// Two events overlap when they share a plan and a date and their
    /// minute intervals intersect.
    pub fn overlaps_with(&self, other: &ScheduleEvent) -> bool {
        if self.date_ms != other.date_ms || self.schedule_plan_id != other.schedule_plan_id {
            return false;
        }
        self.start_min.max(other.start_min) < self.end_min.min(other.end_min)
    }

    /// Whether `[start_min, end_min)` on `date_ms` intersects this event.
    pub fn overlaps_interval(&self, date_ms: i64, start_min: i32, end_min: i32) -> bool {
        self.date_ms == date_ms && self.start_min.max(start_min) < self.end_min.min(end_min)
    }

    // === Movement ===

    /// Relocate and pin. The caller pins the owning task to the same
    /// absolute range in the same transaction.
    pub fn move_and_pin(&mut self, new_date_ms: i64, new_start: i32, new_end: i32) -> ScheduleResult<()> {
        if !is_valid_interval(new_start, new_end) {
            return Err(ScheduleError::validation(format!(
                "invalid time range: {}-{}",
                new_start, new_end
            )));
        }
        if !self.can_be_modified() {
            return Err(ScheduleError::validation(format!(
                "cannot move event with status {}",
                self.status
            )));
        }

        self.date_ms = day_start_utc(new_date_ms);
        self.start_min = new_start;
        self.end_min = new_end;
        self.is_pinned = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Absolute epoch-ms start of the planned interval.
    pub fn absolute_start_ms(&self) -> i64 {
        absolute_ms(self.date_ms, self.start_min)
    }

    /// Absolute epoch-ms end of the planned interval.
    pub fn absolute_end_ms(&self) -> i64 {
        absolute_ms(self.date_ms, self.end_min)
    }

    // === Completion ===

    pub fn mark_done(&mut self, actual_start: i32, actual_end: i32) -> ScheduleResult<()> {
        if !self.status.can_transition_to(EventStatus::Done) {
            return Err(ScheduleError::InvalidTransition {
                from: self.status.to_string(),
                to: EventStatus::Done.to_string(),
            });
        }
        if !is_valid_interval(actual_start, actual_end) {
            return Err(ScheduleError::validation(format!(
                "invalid actual time range: {}-{}",
                actual_start, actual_end
            )));
        }

        self.status = EventStatus::Done;
        self.actual_start_min = Some(actual_start);
        self.actual_end_min = Some(actual_end);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_skipped(&mut self) -> ScheduleResult<()> {
        if !self.status.can_transition_to(EventStatus::Skipped) {
            return Err(ScheduleError::InvalidTransition {
                from: self.status.to_string(),
                to: EventStatus::Skipped.to_string(),
            });
        }
        self.status = EventStatus::Skipped;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn actual_duration(&self) -> i32 {
        match (self.actual_start_min, self.actual_end_min) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    // === Split ===

    /// A split needs a planned event long enough for two minimum parts.
    pub fn can_split(&self, min_split_duration: i32) -> bool {
        let min = if min_split_duration <= 0 {
            DEFAULT_MIN_SPLIT_DURATION_MIN
        } else {
            min_split_duration
        };
        self.can_be_modified() && self.duration_minutes() >= 2 * min
    }

    /// Shrink this event to `[start, split_point)` and return the new
    /// sibling part `[split_point, end)`. Part re-indexing across the task
    /// is the service layer's job.
    pub fn split(&mut self, split_point_min: i32, min_split_duration: i32) -> ScheduleResult<ScheduleEvent> {
        let min = if min_split_duration <= 0 {
            DEFAULT_MIN_SPLIT_DURATION_MIN
        } else {
            min_split_duration
        };

        if !self.can_be_modified() {
            return Err(ScheduleError::validation(format!(
                "cannot split event with status {}",
                self.status
            )));
        }

        let before = split_point_min - self.start_min;
        let after = self.end_min - split_point_min;
        if before < min || after < min {
            return Err(ScheduleError::InvalidSplitPoint);
        }

        let original_end = self.end_min;
        self.end_min = split_point_min;
        self.updated_at = Utc::now();

        let now = Utc::now();
        Ok(ScheduleEvent {
            id: new_entity_id(),
            schedule_plan_id: self.schedule_plan_id,
            schedule_task_id: self.schedule_task_id,
            date_ms: self.date_ms,
            start_min: split_point_min,
            end_min: original_end,
            title: self.title.clone(),
            part_index: self.part_index + 1,
            total_parts: self.total_parts + 1,
            linked_event_id: Some(self.id),
            status: EventStatus::Planned,
            is_pinned: self.is_pinned,
            utility_score: None,
            actual_start_min: None,
            actual_end_min: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Clone owned by another plan, rewired to the cloned task row.
    pub fn clone_for_plan(&self, new_plan_id: EntityId, new_task_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            schedule_plan_id: new_plan_id,
            schedule_task_id: new_task_id,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(start_min: i32, end_min: i32) -> ScheduleEvent {
        ScheduleEvent::new(
            new_entity_id(),
            new_entity_id(),
            DAY_MS * 19_000,
            start_min,
            end_min,
            "deep work",
        )
    }

    fn sample_task() -> ScheduleTask {
        let now = Utc::now();
        ScheduleTask {
            id: new_entity_id(),
            user_id: new_entity_id(),
            tenant_id: new_entity_id(),
            schedule_plan_id: new_entity_id(),
            task_id: new_entity_id(),
            task_snapshot_hash: String::new(),
            title: "write report".to_string(),
            duration_min: 120,
            priority: Priority::Medium,
            priority_score: 0.0,
            category: None,
            is_deep_work: false,
            earliest_start_ms: None,
            deadline_ms: None,
            preferred_start_ms: None,
            allow_split: true,
            min_split_duration_min: 30,
            max_split_count: 3,
            is_pinned: false,
            pinned_start_ms: None,
            pinned_end_ms: None,
            dependent_task_ids: Vec::new(),
            buffer_before_min: 0,
            buffer_after_min: 0,
            schedule_status: TaskScheduleStatus::Pending,
            unscheduled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_event_overlap_same_date_only() {
        let mut a = sample_event(600, 660);
        let mut b = sample_event(630, 690);
        b.schedule_plan_id = a.schedule_plan_id;
        b.date_ms = a.date_ms;
        assert!(a.overlaps_with(&b));

        b.date_ms = a.date_ms + DAY_MS;
        assert!(!a.overlaps_with(&b));

        b.date_ms = a.date_ms;
        a.end_min = 630;
        // Touching endpoints do not overlap.
        assert!(!a.overlaps_with(&b));
    }

    #[test]
    fn test_move_and_pin() {
        let mut event = sample_event(600, 660);
        let date = event.date_ms + DAY_MS;
        event.move_and_pin(date, 540, 600).unwrap();
        assert_eq!(event.date_ms, date);
        assert_eq!((event.start_min, event.end_min), (540, 600));
        assert!(event.is_pinned);

        assert!(event.move_and_pin(date, 660, 600).is_err());

        event.mark_skipped().unwrap();
        assert!(event.move_and_pin(date, 540, 600).is_err());
    }

    #[test]
    fn test_mark_done_requires_actual_times_in_range() {
        let mut event = sample_event(600, 660);
        assert!(event.mark_done(660, 600).is_err());
        assert!(event.mark_done(-5, 600).is_err());

        event.mark_done(605, 665).unwrap();
        assert_eq!(event.status, EventStatus::Done);
        assert_eq!(event.actual_duration(), 60);

        // Terminal: no further transitions.
        assert!(event.mark_skipped().is_err());
        assert!(event.mark_done(600, 660).is_err());
    }

    #[test]
    fn test_split_conservation() {
        let mut event = sample_event(540, 660);
        let total_before = event.duration_minutes();

        let new_part = event.split(600, 30).unwrap();
        assert_eq!(event.end_min, 600);
        assert_eq!(new_part.start_min, 600);
        assert_eq!(new_part.end_min, 660);
        assert_eq!(
            event.duration_minutes() + new_part.duration_minutes(),
            total_before
        );
        assert_eq!(new_part.part_index, event.part_index + 1);
        assert_eq!(new_part.linked_event_id, Some(event.id));
        assert_eq!(new_part.schedule_task_id, event.schedule_task_id);
    }

    #[test]
    fn test_split_rejects_undersized_parts() {
        let mut event = sample_event(540, 660);
        assert!(matches!(
            event.split(560, 30),
            Err(ScheduleError::InvalidSplitPoint)
        ));
        assert!(matches!(
            event.split(650, 30),
            Err(ScheduleError::InvalidSplitPoint)
        ));
        // Event untouched after a failed split.
        assert_eq!((event.start_min, event.end_min), (540, 660));
    }

    #[test]
    fn test_can_split_needs_room_for_two_parts() {
        let event = sample_event(540, 599);
        assert!(!event.can_split(30));
        let event = sample_event(540, 600);
        assert!(event.can_split(30));
    }

    #[test]
    fn test_plan_versioning() {
        let plan = SchedulePlan::new_rolling(new_entity_id(), new_entity_id(), 30);
        assert_eq!(plan.version, 1);
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(plan.start_date_ms % DAY_MS, 0);

        let next = plan.create_next_version();
        assert_eq!(next.version, 2);
        assert_eq!(next.parent_plan_id, Some(plan.id));
        assert_eq!(next.status, PlanStatus::Proposed);
        assert_eq!(next.user_id, plan.user_id);
        assert!(next.optimization_score.is_none());
    }

    #[test]
    fn test_plan_optimization_lifecycle() {
        let plan = SchedulePlan::new_rolling(new_entity_id(), new_entity_id(), 30);
        let mut proposed = plan.create_next_version();

        proposed.start_optimization(Algorithm::CpSat).unwrap();
        assert_eq!(proposed.status, PlanStatus::Optimizing);
        assert_eq!(proposed.algorithm_used, Algorithm::CpSat);
        assert!(proposed.optimization_timestamp.is_some());

        proposed.complete_optimization(0.92, 1_500).unwrap();
        assert_eq!(proposed.status, PlanStatus::Proposed);
        assert_eq!(proposed.optimization_score, Some(0.92));
        assert_eq!(proposed.optimization_duration_ms, Some(1_500));
    }

    #[test]
    fn test_plan_fail_records_reason() {
        let plan = SchedulePlan::new_rolling(new_entity_id(), new_entity_id(), 30);
        let mut proposed = plan.create_next_version();
        proposed.start_optimization(Algorithm::Milp).unwrap();
        proposed.fail_optimization("solver timed out");
        assert_eq!(proposed.status, PlanStatus::Failed);
        assert_eq!(
            proposed.optimization_error.as_deref(),
            Some("solver timed out")
        );
    }

    #[test]
    fn test_plan_rejects_illegal_transition() {
        let mut plan = SchedulePlan::new_rolling(new_entity_id(), new_entity_id(), 30);
        let err = plan.transition_to(PlanStatus::Proposed).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_task_snapshot_hash_ignores_title() {
        let mut task = sample_task();
        task.task_snapshot_hash = task.calculate_snapshot_hash();

        let mut renamed = task.clone();
        renamed.title = "write the report".to_string();
        assert!(!task.has_constraints_changed(&renamed.calculate_snapshot_hash()));

        let mut tightened = task.clone();
        tightened.duration_min = 90;
        assert!(task.has_constraints_changed(&tightened.calculate_snapshot_hash()));
    }

    #[test]
    fn test_task_priority_score() {
        let now_ms = Utc::now().timestamp_millis();
        let mut task = sample_task();
        task.priority = Priority::High;
        task.recalculate_priority_score(now_ms);
        assert_eq!(task.priority_score, 100.0);

        task.deadline_ms = Some(now_ms + 12 * 60 * 60 * 1000);
        task.recalculate_priority_score(now_ms);
        assert_eq!(task.priority_score, 300.0);

        task.is_deep_work = true;
        task.recalculate_priority_score(now_ms);
        assert_eq!(task.priority_score, 320.0);

        task.deadline_ms = Some(now_ms - 1);
        task.recalculate_priority_score(now_ms);
        assert_eq!(task.priority_score, 620.0);
    }

    #[test]
    fn test_task_pin_and_clone() {
        let mut task = sample_task();
        task.pin_to(1_000, 2_000);
        assert!(task.is_pinned);
        assert_eq!(task.schedule_status, TaskScheduleStatus::Scheduled);

        let new_plan = new_entity_id();
        let clone = task.clone_for_plan(new_plan);
        assert_ne!(clone.id, task.id);
        assert_eq!(clone.schedule_plan_id, new_plan);
        assert_eq!(clone.task_id, task.task_id);
        assert_eq!(clone.pinned_start_ms, Some(1_000));
    }

    #[test]
    fn test_task_schedulability_window() {
        let mut task = sample_task();
        assert!(task.is_schedulable_for(0, DAY_MS));

        task.deadline_ms = Some(100);
        assert!(!task.is_schedulable_for(200, DAY_MS));

        task.deadline_ms = None;
        task.earliest_start_ms = Some(DAY_MS * 2);
        assert!(!task.is_schedulable_for(0, DAY_MS));

        task.earliest_start_ms = None;
        task.mark_completed();
        assert!(!task.is_schedulable_for(0, DAY_MS));
    }

    #[test]
    fn test_task_unpin_and_overdue() {
        let now_ms = Utc::now().timestamp_millis();
        let mut task = sample_task();
        task.pin_to(1_000, 2_000);
        task.unpin();
        assert!(!task.is_pinned);
        assert!(task.pinned_start_ms.is_none());
        assert_eq!(task.schedule_status, TaskScheduleStatus::Pending);

        assert!(!task.is_overdue(now_ms));
        task.deadline_ms = Some(now_ms - 1);
        assert!(task.is_overdue(now_ms));

        task.buffer_before_min = 10;
        task.buffer_after_min = 5;
        assert_eq!(task.total_duration_with_buffer(), 135);
    }

    #[test]
    fn test_event_part_predicates() {
        let mut event = sample_event(540, 660);
        assert!(!event.is_multi_part());
        assert!(!event.has_actual_times());

        let part = event.split(600, 30).unwrap();
        assert!(part.is_multi_part());

        event.mark_done(540, 600).unwrap();
        assert!(event.has_actual_times());
    }

    #[test]
    fn test_valid_chunk() {
        let mut task = sample_task();
        assert!(task.is_valid_chunk(30));
        assert!(!task.is_valid_chunk(29));

        task.allow_split = false;
        assert!(!task.is_valid_chunk(60));
        assert!(task.is_valid_chunk(120));
    }
}
