//! Schedule event engine.
//!
//! Batch validation, overlap enforcement, and the move/complete/split/skip
//! state machine. Every mutating operation persists the event together
//! with its dependent task row (pin, completion flag) in one atomic store
//! call, so the event and its owning task snapshot never diverge.

use chrono::Duration;
use tempo_core::{
    ChangePayload, EntityId, EventStatus, RescheduleQueueItem, ScheduleError, ScheduleEvent,
    ScheduleResult,
};
use tempo_storage::ScheduleStore;

/// Result of moving an event. A conflict does not block the move; it is
/// reported and a reschedule trigger is enqueued instead.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub event: ScheduleEvent,
    pub has_conflicts: bool,
    pub conflicting_events: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub event: ScheduleEvent,
    pub all_parts_completed: bool,
    pub remaining_parts: i64,
    pub total_actual_min: i32,
}

#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub original: ScheduleEvent,
    pub new_part: ScheduleEvent,
    pub total_parts: i32,
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Validate a batch: plan membership, interval invariant, default status,
/// then pairwise overlap within the batch (O(n²), bounded by realistic
/// batch sizes).
pub fn validate_batch(plan_id: EntityId, events: &mut [ScheduleEvent]) -> ScheduleResult<()> {
    for event in events.iter() {
        if !event.belongs_to_plan(plan_id) {
            return Err(ScheduleError::validation(
                "event does not belong to the target plan",
            ));
        }
        if !event.is_valid() {
            return Err(ScheduleError::validation(format!(
                "invalid event interval {}-{} on {}",
                event.start_min, event.end_min, event.date_ms
            )));
        }
    }

    for i in 0..events.len() {
        for j in (i + 1)..events.len() {
            if events[i].overlaps_with(&events[j]) {
                return Err(ScheduleError::validation("events overlap within batch"));
            }
        }
    }

    Ok(())
}

/// Reject any batch event that overlaps an already-stored event of the
/// plan. Existing events are loaded once for the min/max date span the
/// batch touches; an event updates itself without self-conflict.
pub async fn validate_no_overlap_with_existing(
    store: &dyn ScheduleStore,
    plan_id: EntityId,
    events: &[ScheduleEvent],
) -> ScheduleResult<()> {
    if events.is_empty() {
        return Ok(());
    }

    let min_date = events.iter().map(|e| e.date_ms).min().unwrap_or_default();
    let max_date = events.iter().map(|e| e.date_ms).max().unwrap_or_default();
    let existing = store
        .event_list_by_plan_range(plan_id, min_date, max_date)
        .await?;

    for new_event in events {
        for existing_event in &existing {
            if new_event.id == existing_event.id {
                continue;
            }
            if new_event.overlaps_with(existing_event) {
                return Err(ScheduleError::validation(
                    "event overlaps an existing event",
                ));
            }
        }
    }

    Ok(())
}

/// Validate and persist a batch of events.
pub async fn save_batch(
    store: &dyn ScheduleStore,
    plan_id: EntityId,
    mut events: Vec<ScheduleEvent>,
) -> ScheduleResult<Vec<ScheduleEvent>> {
    validate_batch(plan_id, &mut events)?;
    validate_no_overlap_with_existing(store, plan_id, &events).await?;
    store.event_save_batch(&events).await?;
    Ok(events)
}

/// List a plan's events in an inclusive date range.
pub async fn list_events(
    store: &dyn ScheduleStore,
    plan_id: EntityId,
    from_date_ms: i64,
    to_date_ms: i64,
) -> ScheduleResult<Vec<ScheduleEvent>> {
    if from_date_ms > to_date_ms {
        return Err(ScheduleError::validation("fromDateMs is after toDateMs"));
    }
    store
        .event_list_by_plan_range(plan_id, from_date_ms, to_date_ms)
        .await
}

/// Sibling events of the plan colliding with `[start, end)` on `date_ms`.
pub async fn find_conflicting_events(
    store: &dyn ScheduleStore,
    plan_id: EntityId,
    date_ms: i64,
    start_min: i32,
    end_min: i32,
    exclude_event_id: EntityId,
) -> ScheduleResult<Vec<ScheduleEvent>> {
    let events = store
        .event_list_by_plan_range(plan_id, date_ms, date_ms)
        .await?;
    Ok(events
        .into_iter()
        .filter(|e| e.id != exclude_event_id && e.overlaps_interval(date_ms, start_min, end_min))
        .collect())
}

// ============================================================================
// MUTATIONS
// ============================================================================

async fn get_event(store: &dyn ScheduleStore, event_id: EntityId) -> ScheduleResult<ScheduleEvent> {
    store
        .event_get(event_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule event"))
}

/// Relocate an event and pin it (and its owning task) to the new slot.
///
/// A collision with a sibling event does not block the move: the move is
/// persisted, `has_conflicts` is reported, and an `EVENT_MOVE` trigger is
/// enqueued in the same transaction so the optimizer can resolve it.
pub async fn move_event(
    store: &dyn ScheduleStore,
    event_id: EntityId,
    new_date_ms: i64,
    new_start_min: i32,
    new_end_min: i32,
    debounce: Duration,
) -> ScheduleResult<MoveOutcome> {
    let mut event = get_event(store, event_id).await?;

    if !event.can_be_modified() {
        return Err(ScheduleError::validation(format!(
            "cannot move event with status {}",
            event.status
        )));
    }

    let conflicts = find_conflicting_events(
        store,
        event.schedule_plan_id,
        tempo_core::day_start_utc(new_date_ms),
        new_start_min,
        new_end_min,
        event.id,
    )
    .await?;

    event.move_and_pin(new_date_ms, new_start_min, new_end_min)?;

    let mut task = store
        .task_get(event.schedule_task_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule task"))?;
    task.pin_to(event.absolute_start_ms(), event.absolute_end_ms());

    let enqueue = if conflicts.is_empty() {
        None
    } else {
        Some(RescheduleQueueItem::new(
            task.user_id,
            event.schedule_plan_id,
            event.id,
            ChangePayload::EventMove {
                event_id: event.id,
                date_ms: event.date_ms,
                start_min: event.start_min,
                end_min: event.end_min,
                conflicting_event_ids: conflicts.iter().map(|e| e.id).collect(),
            },
            debounce,
        ))
    };

    store.event_move_apply(&event, &task, enqueue).await?;

    Ok(MoveOutcome {
        event,
        has_conflicts: !conflicts.is_empty(),
        conflicting_events: conflicts,
    })
}

/// Complete an event with its actual times. When the last planned part of
/// a multi-part task completes, the task is marked completed in the same
/// transaction.
pub async fn complete_event(
    store: &dyn ScheduleStore,
    event_id: EntityId,
    actual_start_min: i32,
    actual_end_min: i32,
    debounce: Duration,
) -> ScheduleResult<CompleteOutcome> {
    let mut event = get_event(store, event_id).await?;
    event.mark_done(actual_start_min, actual_end_min)?;

    // This event was still counted as planned in the store.
    let remaining = store
        .event_count_by_task_and_status(event.schedule_task_id, EventStatus::Planned)
        .await?
        .saturating_sub(1);

    let mut task = store
        .task_get(event.schedule_task_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule task"))?;

    let task_update = if remaining == 0 {
        task.mark_completed();
        Some(&task)
    } else {
        None
    };

    let enqueue = Some(RescheduleQueueItem::new(
        task.user_id,
        event.schedule_plan_id,
        event.id,
        ChangePayload::EventComplete { event_id: event.id },
        debounce,
    ));

    store
        .event_complete_apply(&event, task_update, enqueue)
        .await?;

    let siblings = store.event_list_by_task(event.schedule_task_id).await?;
    let total_actual_min: i32 = siblings
        .iter()
        .map(|e| if e.id == event.id { &event } else { e })
        .filter(|e| e.status == EventStatus::Done)
        .map(|e| e.actual_duration())
        .sum();

    Ok(CompleteOutcome {
        event,
        all_parts_completed: remaining == 0,
        remaining_parts: remaining,
        total_actual_min,
    })
}

/// Split an event at `split_point_min` into two sibling parts.
///
/// Both resulting sub-durations must meet the minimum; later parts of the
/// task are re-indexed and `total_parts` is updated task-wide, all in one
/// transaction.
pub async fn split_event(
    store: &dyn ScheduleStore,
    event_id: EntityId,
    split_point_min: i32,
    min_split_duration_min: i32,
    debounce: Duration,
) -> ScheduleResult<SplitOutcome> {
    let mut event = get_event(store, event_id).await?;

    if !event.can_split(min_split_duration_min) {
        return Err(ScheduleError::validation(
            "event is too short to split or is not planned",
        ));
    }

    let task = store
        .task_get(event.schedule_task_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule task"))?;

    let mut new_part = event.split(split_point_min, min_split_duration_min)?;

    let new_total = event.total_parts + 1;
    event.total_parts = new_total;
    new_part.total_parts = new_total;

    let enqueue = Some(RescheduleQueueItem::new(
        task.user_id,
        event.schedule_plan_id,
        event.id,
        ChangePayload::EventSplit {
            event_id: event.id,
            new_event_id: new_part.id,
        },
        debounce,
    ));

    store.event_split_apply(&event, &new_part, enqueue).await?;

    Ok(SplitOutcome {
        original: event,
        new_part,
        total_parts: new_total,
    })
}

/// Skip an event. Terminal.
pub async fn skip_event(
    store: &dyn ScheduleStore,
    event_id: EntityId,
) -> ScheduleResult<ScheduleEvent> {
    let mut event = get_event(store, event_id).await?;
    event.mark_skipped()?;
    store.event_update(&event).await?;
    Ok(event)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempo_core::{
        new_entity_id, Priority, SchedulePlan, ScheduleTask, TaskScheduleStatus, TriggerType,
        DAY_MS,
    };
    use tempo_storage::MemoryStore;

    const DATE: i64 = 19_000 * DAY_MS;

    struct Fixture {
        store: MemoryStore,
        plan: SchedulePlan,
        task: ScheduleTask,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = SchedulePlan::new_rolling(user, new_entity_id(), 30);
        store.plan_insert(&plan).await.unwrap();

        let now = Utc::now();
        let task = ScheduleTask {
            id: new_entity_id(),
            user_id: user,
            tenant_id: plan.tenant_id,
            schedule_plan_id: plan.id,
            task_id: new_entity_id(),
            task_snapshot_hash: String::new(),
            title: "write report".into(),
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
            dependent_task_ids: vec![],
            buffer_before_min: 0,
            buffer_after_min: 0,
            schedule_status: TaskScheduleStatus::Pending,
            unscheduled_reason: None,
            created_at: now,
            updated_at: now,
        };
        store.task_insert(&task).await.unwrap();

        Fixture { store, plan, task }
    }

    fn event(fx: &Fixture, start: i32, end: i32) -> ScheduleEvent {
        ScheduleEvent::new(fx.plan.id, fx.task.id, DATE, start, end, "write report")
    }

    #[tokio::test]
    async fn test_validate_batch_rejects_overlap() {
        let fx = fixture().await;
        let mut events = vec![event(&fx, 540, 660), event(&fx, 600, 720)];
        let err = validate_batch(fx.plan.id, &mut events).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::validation("events overlap within batch")
        );
    }

    #[tokio::test]
    async fn test_validate_batch_rejects_foreign_plan() {
        let fx = fixture().await;
        let mut events = vec![event(&fx, 540, 660)];
        let err = validate_batch(new_entity_id(), &mut events).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_save_batch_rejects_overlap_with_existing() {
        let fx = fixture().await;
        save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 660)])
            .await
            .unwrap();

        let err = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 600, 720)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::validation("event overlaps an existing event")
        );

        // Non-overlapping second batch is accepted.
        save_batch(&fx.store, fx.plan.id, vec![event(&fx, 660, 720)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_batch_allows_self_update() {
        let fx = fixture().await;
        let saved = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 660)])
            .await
            .unwrap();

        let mut updated = saved[0].clone();
        updated.end_min = 630;
        save_batch(&fx.store, fx.plan.id, vec![updated]).await.unwrap();
    }

    #[tokio::test]
    async fn test_move_without_conflicts() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 600)])
            .await
            .unwrap()
            .remove(0);

        let outcome = move_event(&fx.store, ev.id, DATE + DAY_MS, 600, 660, Duration::seconds(30))
            .await
            .unwrap();
        assert!(!outcome.has_conflicts);
        assert!(outcome.event.is_pinned);

        // Task was pinned to the absolute slot in the same transaction.
        let task = fx.store.task_get(fx.task.id).await.unwrap().unwrap();
        assert!(task.is_pinned);
        assert_eq!(task.pinned_start_ms, Some(outcome.event.absolute_start_ms()));
        assert_eq!(task.schedule_status, TaskScheduleStatus::Scheduled);

        // No conflicts, no trigger.
        assert_eq!(fx.store.queue_pending_count(fx.plan.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_move_with_conflict_enqueues_trigger() {
        let fx = fixture().await;
        // Moving E (10:00-11:00) onto pinned F (10:30-11:30) conflicts but
        // does not block; exactly one EVENT_MOVE item is enqueued.
        let mut f = event(&fx, 630, 690);
        f.is_pinned = true;
        let saved = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 600, 660), f])
            .await
            .unwrap_err();
        // The two batch events overlap, so seed them on separate days first.
        assert!(matches!(saved, ScheduleError::Validation { .. }));

        let e = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 600, 660)])
            .await
            .unwrap()
            .remove(0);
        let mut f = ScheduleEvent::new(fx.plan.id, fx.task.id, DATE + DAY_MS, 630, 690, "f");
        f.is_pinned = true;
        fx.store.event_save_batch(&[f.clone()]).await.unwrap();

        let outcome = move_event(&fx.store, e.id, DATE + DAY_MS, 630, 690, Duration::seconds(30))
            .await
            .unwrap();
        assert!(outcome.has_conflicts);
        assert_eq!(outcome.conflicting_events.len(), 1);
        assert_eq!(outcome.conflicting_events[0].id, f.id);

        assert_eq!(fx.store.queue_pending_count(fx.plan.id).await.unwrap(), 1);
        assert_eq!(
            fx.store.queue_key_count(fx.plan.id, e.id, TriggerType::EventMove),
            1
        );
    }

    #[tokio::test]
    async fn test_move_terminal_event_fails() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 600)])
            .await
            .unwrap()
            .remove(0);
        skip_event(&fx.store, ev.id).await.unwrap();

        let err = move_event(&fx.store, ev.id, DATE, 600, 660, Duration::seconds(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_complete_last_part_marks_task_completed() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 600)])
            .await
            .unwrap()
            .remove(0);

        let outcome = complete_event(&fx.store, ev.id, 545, 610, Duration::seconds(30))
            .await
            .unwrap();
        assert!(outcome.all_parts_completed);
        assert_eq!(outcome.remaining_parts, 0);
        assert_eq!(outcome.total_actual_min, 65);

        let task = fx.store.task_get(fx.task.id).await.unwrap().unwrap();
        assert_eq!(task.schedule_status, TaskScheduleStatus::Completed);

        // Completion always enqueues a trigger.
        assert_eq!(fx.store.queue_pending_count(fx.plan.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_complete_one_of_two_parts_keeps_task_open() {
        let fx = fixture().await;
        let first = event(&fx, 540, 600);
        let second = ScheduleEvent::new(fx.plan.id, fx.task.id, DATE + DAY_MS, 540, 600, "p2");
        fx.store
            .event_save_batch(&[first.clone(), second])
            .await
            .unwrap();

        let outcome = complete_event(&fx.store, first.id, 540, 600, Duration::seconds(30))
            .await
            .unwrap();
        assert!(!outcome.all_parts_completed);
        assert_eq!(outcome.remaining_parts, 1);

        let task = fx.store.task_get(fx.task.id).await.unwrap().unwrap();
        assert_ne!(task.schedule_status, TaskScheduleStatus::Completed);
    }

    #[tokio::test]
    async fn test_split_updates_all_parts() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 660)])
            .await
            .unwrap()
            .remove(0);

        let outcome = split_event(&fx.store, ev.id, 600, 30, Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(outcome.total_parts, 2);
        assert_eq!(outcome.original.end_min, 600);
        assert_eq!(outcome.new_part.start_min, 600);
        assert_eq!(outcome.new_part.end_min, 660);
        assert_eq!(
            outcome.original.duration_minutes() + outcome.new_part.duration_minutes(),
            120
        );

        let parts = fx.store.event_list_by_task(fx.task.id).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.total_parts == 2));
        assert_eq!(parts[0].part_index, 1);
        assert_eq!(parts[1].part_index, 2);

        // Split enqueues a trigger.
        assert_eq!(fx.store.queue_pending_count(fx.plan.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_split_invalid_point() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 660)])
            .await
            .unwrap()
            .remove(0);

        let err = split_event(&fx.store, ev.id, 555, 30, Duration::seconds(30))
            .await
            .unwrap_err();
        assert_eq!(err, ScheduleError::InvalidSplitPoint);

        // Nothing persisted on failure.
        let parts = fx.store.event_list_by_task(fx.task.id).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!((parts[0].start_min, parts[0].end_min), (540, 660));
    }

    #[tokio::test]
    async fn test_skip_is_terminal() {
        let fx = fixture().await;
        let ev = save_batch(&fx.store, fx.plan.id, vec![event(&fx, 540, 600)])
            .await
            .unwrap()
            .remove(0);

        let skipped = skip_event(&fx.store, ev.id).await.unwrap();
        assert_eq!(skipped.status, EventStatus::Skipped);

        let err = skip_event(&fx.store, ev.id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTransition { .. }));
    }
}
