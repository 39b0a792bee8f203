//! Reschedule queue items and batches.
//!
//! A queue item records "something changed, re-optimize this plan". Items
//! are debounced per `(plan, entity, trigger)` key and drained per plan by
//! a single worker at a time.

use crate::enums::{EntityKind, QueueStatus, RescheduleStrategy, TriggerType};
use crate::{new_entity_id, EntityId, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// Typed change payload carried by a queue item, keyed by its trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "trigger", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum ChangePayload {
    TaskAdded {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: EntityId,
    },
    TaskUpdated {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: EntityId,
    },
    TaskDeleted {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: EntityId,
    },
    ConstraintChange {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: EntityId,
    },
    EventMove {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        event_id: EntityId,
        date_ms: i64,
        start_min: i32,
        end_min: i32,
        #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>, format = "uuid"))]
        conflicting_event_ids: Vec<EntityId>,
    },
    EventSplit {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        event_id: EntityId,
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        new_event_id: EntityId,
    },
    EventComplete {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        event_id: EntityId,
    },
    WindowChange {
        from_date_ms: i64,
        to_date_ms: i64,
    },
}

impl ChangePayload {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            ChangePayload::TaskAdded { .. } => TriggerType::TaskAdded,
            ChangePayload::TaskUpdated { .. } => TriggerType::TaskUpdated,
            ChangePayload::TaskDeleted { .. } => TriggerType::TaskDeleted,
            ChangePayload::ConstraintChange { .. } => TriggerType::ConstraintChange,
            ChangePayload::EventMove { .. } => TriggerType::EventMove,
            ChangePayload::EventSplit { .. } => TriggerType::EventSplit,
            ChangePayload::EventComplete { .. } => TriggerType::EventComplete,
            ChangePayload::WindowChange { .. } => TriggerType::WindowChange,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ChangePayload::TaskAdded { .. }
            | ChangePayload::TaskUpdated { .. }
            | ChangePayload::TaskDeleted { .. }
            | ChangePayload::ConstraintChange { .. } => EntityKind::Task,
            ChangePayload::EventMove { .. }
            | ChangePayload::EventSplit { .. }
            | ChangePayload::EventComplete { .. } => EntityKind::Event,
            ChangePayload::WindowChange { .. } => EntityKind::Window,
        }
    }
}

/// A pending "re-optimize" trigger for one plan.
///
/// Uniqueness key is `(schedule_plan_id, entity_id, trigger_type)` while
/// `Pending`: a repeated trigger merges into the existing row, refreshing
/// the payload, debounce deadline, and priority rather than duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RescheduleQueueItem {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub schedule_plan_id: EntityId,
    pub trigger_type: TriggerType,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    pub change_payload: ChangePayload,
    pub status: QueueStatus,
    /// Drain priority; lower is more urgent.
    pub priority: i32,
    /// Quiet-period deadline; the item is not due before this.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub debounce_until: Timestamp,
    /// Set once at first insert and never refreshed: bounds how long
    /// continuous debouncing can starve an item.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub first_created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub processed_at: Option<Timestamp>,
    pub processing_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

impl RescheduleQueueItem {
    pub fn new(
        user_id: EntityId,
        plan_id: EntityId,
        entity_id: EntityId,
        payload: ChangePayload,
        debounce: Duration,
    ) -> Self {
        let now = Utc::now();
        let trigger_type = payload.trigger_type();
        Self {
            id: new_entity_id(),
            user_id,
            schedule_plan_id: plan_id,
            trigger_type,
            entity_id,
            entity_kind: payload.entity_kind(),
            change_payload: payload,
            status: QueueStatus::Pending,
            priority: trigger_type.default_priority(),
            debounce_until: now + debounce,
            first_created_at: now,
            created_at: now,
            updated_at: now,
            processed_at: None,
            processing_duration_ms: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Whether the item is due at `now`: its quiet period elapsed, or it
    /// has waited past the starvation bound since first creation.
    pub fn is_due(&self, now: Timestamp, max_wait: Duration) -> bool {
        self.status == QueueStatus::Pending
            && (self.debounce_until <= now || self.first_created_at + max_wait <= now)
    }
}

/// One worker's unit of work: all due items of a single plan.
#[derive(Debug, Clone)]
pub struct RescheduleBatch {
    pub user_id: EntityId,
    pub plan_id: EntityId,
    pub strategy: RescheduleStrategy,
    /// Optional solver-runtime hint; bounding the actual runtime is the
    /// executor's responsibility.
    pub max_time_sec: Option<i32>,
    pub items: Vec<RescheduleQueueItem>,
}

impl RescheduleBatch {
    pub fn new(user_id: EntityId, plan_id: EntityId, strategy: RescheduleStrategy) -> Self {
        Self {
            user_id,
            plan_id,
            strategy,
            max_time_sec: None,
            items: Vec::new(),
        }
    }

    pub fn item_ids(&self) -> Vec<EntityId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn affected_task_ids(&self) -> Vec<EntityId> {
        self.items
            .iter()
            .filter(|item| item.entity_kind == EntityKind::Task)
            .map(|item| item.entity_id)
            .collect()
    }

    /// Pick a strategy from the batch's trigger mix: removals and
    /// constraint changes invalidate existing placements broadly, manual
    /// edits only need local insertion, everything else ripples.
    pub fn determine_strategy(items: &[RescheduleQueueItem]) -> RescheduleStrategy {
        let mut has_structural = false;
        let mut has_manual_edit = false;

        for item in items {
            match item.trigger_type {
                TriggerType::TaskDeleted
                | TriggerType::ConstraintChange
                | TriggerType::WindowChange => has_structural = true,
                TriggerType::EventMove | TriggerType::EventSplit | TriggerType::EventComplete => {
                    has_manual_edit = true
                }
                TriggerType::TaskAdded | TriggerType::TaskUpdated => {}
            }
        }

        if has_structural {
            RescheduleStrategy::FullReplan
        } else if has_manual_edit {
            RescheduleStrategy::Insertion
        } else {
            RescheduleStrategy::Ripple
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(payload: ChangePayload) -> RescheduleQueueItem {
        RescheduleQueueItem::new(
            new_entity_id(),
            new_entity_id(),
            new_entity_id(),
            payload,
            Duration::seconds(30),
        )
    }

    #[test]
    fn test_payload_trigger_mapping() {
        let task_id = new_entity_id();
        let payload = ChangePayload::TaskDeleted { task_id };
        assert_eq!(payload.trigger_type(), TriggerType::TaskDeleted);
        assert_eq!(payload.entity_kind(), EntityKind::Task);

        let payload = ChangePayload::EventMove {
            event_id: new_entity_id(),
            date_ms: 0,
            start_min: 600,
            end_min: 660,
            conflicting_event_ids: vec![],
        };
        assert_eq!(payload.trigger_type(), TriggerType::EventMove);
        assert_eq!(payload.entity_kind(), EntityKind::Event);
    }

    #[test]
    fn test_payload_round_trips_as_tagged_json() {
        let payload = ChangePayload::WindowChange {
            from_date_ms: 0,
            to_date_ms: 86_400_000,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["trigger"], "WINDOW_CHANGE");
        let back: ChangePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_is_due_respects_debounce_and_starvation() {
        let mut queued = item(ChangePayload::TaskAdded {
            task_id: new_entity_id(),
        });
        let now = Utc::now();
        let max_wait = Duration::minutes(5);

        // Freshly debounced: not due.
        assert!(!queued.is_due(now, max_wait));

        // Quiet period elapsed.
        queued.debounce_until = now - Duration::seconds(1);
        assert!(queued.is_due(now, max_wait));

        // Continuously refreshed, but first_created_at is past the bound.
        queued.debounce_until = now + Duration::seconds(30);
        queued.first_created_at = now - Duration::minutes(6);
        assert!(queued.is_due(now, max_wait));

        queued.status = QueueStatus::Processing;
        assert!(!queued.is_due(now, max_wait));
    }

    #[test]
    fn test_strategy_selection_table() {
        let deleted = item(ChangePayload::TaskDeleted {
            task_id: new_entity_id(),
        });
        let moved = item(ChangePayload::EventMove {
            event_id: new_entity_id(),
            date_ms: 0,
            start_min: 0,
            end_min: 60,
            conflicting_event_ids: vec![],
        });
        let added = item(ChangePayload::TaskAdded {
            task_id: new_entity_id(),
        });

        assert_eq!(
            RescheduleBatch::determine_strategy(&[deleted.clone(), moved.clone()]),
            RescheduleStrategy::FullReplan
        );
        assert_eq!(
            RescheduleBatch::determine_strategy(&[moved]),
            RescheduleStrategy::Insertion
        );
        assert_eq!(
            RescheduleBatch::determine_strategy(&[added]),
            RescheduleStrategy::Ripple
        );
        assert_eq!(
            RescheduleBatch::determine_strategy(&[]),
            RescheduleStrategy::Ripple
        );
    }
}
