//! Inbound task-lifecycle event handlers.
//!
//! The task service emits created/updated/deleted events; handlers
//! translate them into schedule-task snapshots and reschedule triggers.
//! Processing is deduplicated by event id, and every handler is also safe
//! to invoke twice for the same event (the dedup record only
//! short-circuits work, it is not load-bearing for correctness).

use chrono::{Duration, Utc};
use tempo_core::{
    new_entity_id, ChangeKind, ChangePayload, EntityId, ScheduleResult, ScheduleTask,
    TaskScheduleStatus,
};
use tempo_storage::ScheduleStore;

use crate::services::{plan_service, queue_service};
use crate::types::{TaskEventEnvelope, TaskEventKind, TaskEventPayload};

/// Outcome of ingesting one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed,
    Duplicate,
}

/// Dispatch an envelope to its handler, with event-id dedup.
pub async fn ingest_task_event(
    store: &dyn ScheduleStore,
    envelope: &TaskEventEnvelope,
    plan_horizon_days: i64,
    debounce: Duration,
) -> ScheduleResult<IngestOutcome> {
    let already_processed = store
        .processed_event_check_and_record(
            &envelope.meta.event_id,
            &envelope.meta.event_type,
            &envelope.meta.source,
        )
        .await?;
    if already_processed {
        tracing::info!(
            event_id = %envelope.meta.event_id,
            event_type = %envelope.meta.event_type,
            "duplicate event skipped"
        );
        return Ok(IngestOutcome::Duplicate);
    }

    match &envelope.payload {
        TaskEventKind::TaskCreated { task } => {
            handle_task_created(store, task, plan_horizon_days, debounce).await?
        }
        TaskEventKind::TaskUpdated { task } => handle_task_updated(store, task, debounce).await?,
        TaskEventKind::TaskDeleted { task_id, user_id } => {
            handle_task_deleted(store, *user_id, *task_id, debounce).await?
        }
        TaskEventKind::TaskBulkDeleted { task_ids, user_id } => {
            for task_id in task_ids {
                handle_task_deleted(store, *user_id, *task_id, debounce).await?;
            }
        }
    }

    Ok(IngestOutcome::Processed)
}

/// New external task: snapshot it into the active plan and enqueue a
/// `TASK_ADDED` trigger. Re-invocation is a no-op once the snapshot
/// exists.
pub async fn handle_task_created(
    store: &dyn ScheduleStore,
    payload: &TaskEventPayload,
    plan_horizon_days: i64,
    debounce: Duration,
) -> ScheduleResult<()> {
    let plan = plan_service::get_or_create_active_plan(
        store,
        payload.user_id,
        payload.tenant_id,
        plan_horizon_days,
    )
    .await?;

    if store
        .task_get_by_plan_and_task(plan.id, payload.task_id)
        .await?
        .is_some()
    {
        tracing::warn!(task_id = %payload.task_id, plan_id = %plan.id, "snapshot already exists");
        return Ok(());
    }

    let task = snapshot_from_payload(plan.id, payload);
    store.task_insert(&task).await?;

    queue_service::enqueue(
        store,
        payload.user_id,
        plan.id,
        task.id,
        ChangePayload::TaskAdded { task_id: task.id },
        debounce,
    )
    .await
}

/// Task edit: sync the snapshot against the incoming constraint hash and
/// enqueue a `CONSTRAINT_CHANGE` trigger when scheduling-relevant fields
/// changed. Display-only edits update the snapshot silently.
pub async fn handle_task_updated(
    store: &dyn ScheduleStore,
    payload: &TaskEventPayload,
    debounce: Duration,
) -> ScheduleResult<()> {
    let plan = plan_service::get_active_plan(store, payload.user_id).await?;

    let Some(mut existing) = store
        .task_get_by_plan_and_task(plan.id, payload.task_id)
        .await?
    else {
        // Update raced ahead of the create; treat it as a create.
        return handle_task_created(store, payload, 30, debounce).await;
    };

    let change = sync_snapshot(&mut existing, payload);
    if change == ChangeKind::None {
        return Ok(());
    }
    store.task_update(&existing).await?;

    if change == ChangeKind::Constraint {
        queue_service::enqueue(
            store,
            payload.user_id,
            plan.id,
            existing.id,
            ChangePayload::ConstraintChange {
                task_id: existing.id,
            },
            debounce,
        )
        .await?;
    }

    Ok(())
}

/// Task removal: drop the snapshot and enqueue a `TASK_DELETED` trigger.
pub async fn handle_task_deleted(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    task_id: EntityId,
    debounce: Duration,
) -> ScheduleResult<()> {
    let plan = plan_service::get_active_plan(store, user_id).await?;

    let Some(snapshot) = store.task_get_by_plan_and_task(plan.id, task_id).await? else {
        // Already gone; deletion is idempotent.
        return Ok(());
    };

    store.task_delete(snapshot.id).await?;

    queue_service::enqueue(
        store,
        user_id,
        plan.id,
        snapshot.id,
        ChangePayload::TaskDeleted {
            task_id: snapshot.id,
        },
        debounce,
    )
    .await
}

/// Build a fresh snapshot row from an event payload.
fn snapshot_from_payload(plan_id: EntityId, payload: &TaskEventPayload) -> ScheduleTask {
    let now = Utc::now();
    let mut task = ScheduleTask {
        id: new_entity_id(),
        user_id: payload.user_id,
        tenant_id: payload.tenant_id,
        schedule_plan_id: plan_id,
        task_id: payload.task_id,
        task_snapshot_hash: String::new(),
        title: payload.title.clone(),
        duration_min: payload.duration_min,
        priority: payload.priority,
        priority_score: 0.0,
        category: payload.category.clone(),
        is_deep_work: payload.is_deep_work,
        earliest_start_ms: payload.earliest_start_ms,
        deadline_ms: payload.deadline_ms,
        preferred_start_ms: payload.preferred_start_ms,
        allow_split: payload.allow_split,
        min_split_duration_min: payload.min_split_duration_min,
        max_split_count: payload.max_split_count,
        is_pinned: false,
        pinned_start_ms: None,
        pinned_end_ms: None,
        dependent_task_ids: payload.dependent_task_ids.clone(),
        buffer_before_min: payload.buffer_before_min,
        buffer_after_min: payload.buffer_after_min,
        schedule_status: TaskScheduleStatus::Pending,
        unscheduled_reason: None,
        created_at: now,
        updated_at: now,
    };
    task.task_snapshot_hash = task.calculate_snapshot_hash();
    task.recalculate_priority_score(now.timestamp_millis());
    task
}

/// Overwrite a snapshot from an incoming payload and classify the change.
fn sync_snapshot(existing: &mut ScheduleTask, payload: &TaskEventPayload) -> ChangeKind {
    let cosmetic_changed =
        existing.title != payload.title || existing.category != payload.category;

    existing.title = payload.title.clone();
    existing.category = payload.category.clone();
    existing.duration_min = payload.duration_min;
    existing.priority = payload.priority;
    existing.is_deep_work = payload.is_deep_work;
    existing.earliest_start_ms = payload.earliest_start_ms;
    existing.deadline_ms = payload.deadline_ms;
    existing.preferred_start_ms = payload.preferred_start_ms;
    existing.allow_split = payload.allow_split;
    existing.min_split_duration_min = payload.min_split_duration_min;
    existing.max_split_count = payload.max_split_count;
    existing.dependent_task_ids = payload.dependent_task_ids.clone();
    existing.buffer_before_min = payload.buffer_before_min;
    existing.buffer_after_min = payload.buffer_after_min;

    let incoming_hash = existing.calculate_snapshot_hash();
    let constraints_changed = existing.has_constraints_changed(&incoming_hash);
    if constraints_changed {
        existing.task_snapshot_hash = incoming_hash;
        existing.reset_status();
        existing.recalculate_priority_score(Utc::now().timestamp_millis());
        return ChangeKind::Constraint;
    }

    if cosmetic_changed {
        existing.updated_at = Utc::now();
        return ChangeKind::Cosmetic;
    }

    ChangeKind::None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventMeta;
    use tempo_core::{Priority, ScheduleError, TriggerType};
    use tempo_storage::MemoryStore;

    fn payload(user: EntityId, task_id: EntityId) -> TaskEventPayload {
        TaskEventPayload {
            task_id,
            user_id: user,
            tenant_id: user,
            title: "write report".into(),
            duration_min: 60,
            priority: Priority::Medium,
            is_deep_work: false,
            earliest_start_ms: None,
            deadline_ms: None,
            preferred_start_ms: None,
            allow_split: true,
            min_split_duration_min: 30,
            max_split_count: 2,
            dependent_task_ids: vec![],
            buffer_before_min: 0,
            buffer_after_min: 0,
            category: None,
        }
    }

    fn envelope(event_id: &str, payload: TaskEventKind) -> TaskEventEnvelope {
        TaskEventEnvelope {
            meta: EventMeta {
                event_id: event_id.into(),
                event_type: "task".into(),
                source: "task-service".into(),
                version: "1".into(),
                timestamp: Utc::now().timestamp_millis(),
                trace_id: None,
            },
            payload,
        }
    }

    fn debounce() -> Duration {
        Duration::seconds(30)
    }

    #[tokio::test]
    async fn test_task_created_builds_plan_snapshot_and_trigger() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();

        handle_task_created(&store, &payload(user, task_id), 30, debounce())
            .await
            .unwrap();

        let plan = store.plan_get_active(user).await.unwrap().unwrap();
        let snapshot = store
            .task_get_by_plan_and_task(plan.id, task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.task_id, task_id);
        assert!(!snapshot.task_snapshot_hash.is_empty());
        assert!(snapshot.priority_score > 0.0);

        assert_eq!(store.queue_pending_count(plan.id).await.unwrap(), 1);
        assert_eq!(
            store.queue_key_count(plan.id, snapshot.id, TriggerType::TaskAdded),
            1
        );
    }

    #[tokio::test]
    async fn test_task_created_twice_is_idempotent() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();
        let p = payload(user, task_id);

        handle_task_created(&store, &p, 30, debounce()).await.unwrap();
        handle_task_created(&store, &p, 30, debounce()).await.unwrap();

        let plan = store.plan_get_active(user).await.unwrap().unwrap();
        assert_eq!(store.task_list_by_plan(plan.id).await.unwrap().len(), 1);
        assert_eq!(store.queue_pending_count(plan.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_constraint_update_enqueues_trigger() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();
        let mut p = payload(user, task_id);
        handle_task_created(&store, &p, 30, debounce()).await.unwrap();
        let plan = store.plan_get_active(user).await.unwrap().unwrap();

        p.duration_min = 90;
        handle_task_updated(&store, &p, debounce()).await.unwrap();

        let snapshot = store
            .task_get_by_plan_and_task(plan.id, task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.duration_min, 90);
        assert_eq!(snapshot.schedule_status, TaskScheduleStatus::Pending);

        assert_eq!(
            store.queue_key_count(plan.id, snapshot.id, TriggerType::ConstraintChange),
            1
        );
    }

    #[tokio::test]
    async fn test_cosmetic_update_skips_trigger() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();
        let mut p = payload(user, task_id);
        handle_task_created(&store, &p, 30, debounce()).await.unwrap();
        let plan = store.plan_get_active(user).await.unwrap().unwrap();
        let snapshot = store
            .task_get_by_plan_and_task(plan.id, task_id)
            .await
            .unwrap()
            .unwrap();

        p.title = "write the quarterly report".into();
        handle_task_updated(&store, &p, debounce()).await.unwrap();

        let updated = store.task_get(snapshot.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "write the quarterly report");
        // TASK_ADDED from creation is the only pending item.
        assert_eq!(store.queue_pending_count(plan.id).await.unwrap(), 1);
        assert_eq!(
            store.queue_key_count(plan.id, snapshot.id, TriggerType::ConstraintChange),
            0
        );
    }

    #[tokio::test]
    async fn test_task_deleted_drops_snapshot_and_enqueues() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();
        handle_task_created(&store, &payload(user, task_id), 30, debounce())
            .await
            .unwrap();
        let plan = store.plan_get_active(user).await.unwrap().unwrap();
        let snapshot = store
            .task_get_by_plan_and_task(plan.id, task_id)
            .await
            .unwrap()
            .unwrap();

        handle_task_deleted(&store, user, task_id, debounce()).await.unwrap();
        assert!(store.task_get(snapshot.id).await.unwrap().is_none());
        assert_eq!(
            store.queue_key_count(plan.id, snapshot.id, TriggerType::TaskDeleted),
            1
        );

        // Deleting again is a no-op, not an error.
        handle_task_deleted(&store, user, task_id, debounce()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ingest_dedups_by_event_id() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let task_id = new_entity_id();
        let env = envelope(
            "evt-1",
            TaskEventKind::TaskCreated {
                task: payload(user, task_id),
            },
        );

        let first = ingest_task_event(&store, &env, 30, debounce()).await.unwrap();
        assert_eq!(first, IngestOutcome::Processed);

        let second = ingest_task_event(&store, &env, 30, debounce()).await.unwrap();
        assert_eq!(second, IngestOutcome::Duplicate);

        let plan = store.plan_get_active(user).await.unwrap().unwrap();
        assert_eq!(store.task_list_by_plan(plan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let ids = [new_entity_id(), new_entity_id()];
        for id in ids {
            handle_task_created(&store, &payload(user, id), 30, debounce())
                .await
                .unwrap();
        }
        let plan = store.plan_get_active(user).await.unwrap().unwrap();

        let env = envelope(
            "evt-bulk",
            TaskEventKind::TaskBulkDeleted {
                task_ids: ids.to_vec(),
                user_id: user,
            },
        );
        ingest_task_event(&store, &env, 30, debounce()).await.unwrap();

        assert!(store.task_list_by_plan(plan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_active_plan_is_not_found() {
        let store = MemoryStore::new();
        let err = handle_task_updated(
            &store,
            &payload(new_entity_id(), new_entity_id()),
            DEBOUNCE,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ScheduleError::not_found("schedule plan"));
    }
}
