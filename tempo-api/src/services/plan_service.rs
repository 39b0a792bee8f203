//! Schedule plan lifecycle.
//!
//! Get-or-create of the first active plan, clone-on-propose, and the
//! apply/discard/revert transitions. Every multi-row step (clone, apply,
//! revert) goes through one atomic store call so partial application is
//! impossible.

use chrono::Utc;
use std::collections::HashMap;
use tempo_core::{
    day_start_utc, Algorithm, EntityId, PlanStatus, ScheduleError, ScheduleEvent, SchedulePlan,
    ScheduleResult, ScheduleTask, DAY_MS,
};
use tempo_storage::ScheduleStore;

use crate::types::{PlanDetailResponse, PlanHistoryResponse, PlanStats};

/// Result of cloning a plan: the new plan plus the old→new task row
/// translation table.
#[derive(Debug, Clone)]
pub struct ClonedPlan {
    pub plan: SchedulePlan,
    pub task_id_mapping: HashMap<EntityId, EntityId>,
    pub task_count: usize,
    pub event_count: usize,
}

/// Fetch a plan and enforce ownership.
pub async fn get_plan_owned(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    plan_id: EntityId,
) -> ScheduleResult<SchedulePlan> {
    let plan = store
        .plan_get(plan_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule plan"))?;
    if !plan.belongs_to(user_id) {
        return Err(ScheduleError::forbidden("plan belongs to another user"));
    }
    Ok(plan)
}

/// The user's active plan; `NotFound` when none exists.
pub async fn get_active_plan(
    store: &dyn ScheduleStore,
    user_id: EntityId,
) -> ScheduleResult<SchedulePlan> {
    store
        .plan_get_active(user_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("schedule plan"))
}

/// The user's active plan, creating a first rolling plan when none exists.
pub async fn get_or_create_active_plan(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    tenant_id: EntityId,
    horizon_days: i64,
) -> ScheduleResult<SchedulePlan> {
    if let Some(plan) = store.plan_get_active(user_id).await? {
        return Ok(plan);
    }

    let plan = SchedulePlan::new_rolling(user_id, tenant_id, horizon_days);
    store.plan_insert(&plan).await?;
    tracing::info!(%user_id, plan_id = %plan.id, "created initial active plan");
    Ok(plan)
}

/// Clone `source` into a new proposed version: the plan row, every task
/// row (translation table old→new), and every event in the forward
/// horizon, rewritten through the translation table. One transaction;
/// failure aborts with no partial state.
pub async fn clone_plan(
    store: &dyn ScheduleStore,
    source: &SchedulePlan,
    algorithm: Algorithm,
    clone_horizon_days: i64,
) -> ScheduleResult<ClonedPlan> {
    let mut new_plan = source.create_next_version();
    new_plan.algorithm_used = algorithm;

    let tasks = store.task_list_by_plan(source.id).await?;
    let mut task_id_mapping = HashMap::with_capacity(tasks.len());
    let cloned_tasks: Vec<ScheduleTask> = tasks
        .iter()
        .map(|task| {
            let clone = task.clone_for_plan(new_plan.id);
            task_id_mapping.insert(task.id, clone.id);
            clone
        })
        .collect();

    let horizon_end =
        day_start_utc(Utc::now().timestamp_millis()) + clone_horizon_days * DAY_MS;
    let events = store
        .event_list_by_plan_range(source.id, source.start_date_ms, horizon_end)
        .await?;
    let cloned_events: Vec<ScheduleEvent> = events
        .iter()
        .map(|event| {
            let task_id = task_id_mapping
                .get(&event.schedule_task_id)
                .copied()
                .unwrap_or(event.schedule_task_id);
            event.clone_for_plan(new_plan.id, task_id)
        })
        .collect();

    store
        .plan_insert_deep(&new_plan, &cloned_tasks, &cloned_events, &[])
        .await?;

    tracing::info!(
        source_plan = %source.id,
        new_plan = %new_plan.id,
        version = new_plan.version,
        tasks = cloned_tasks.len(),
        events = cloned_events.len(),
        "cloned plan into proposed version"
    );

    Ok(ClonedPlan {
        plan: new_plan,
        task_id_mapping,
        task_count: cloned_tasks.len(),
        event_count: cloned_events.len(),
    })
}

/// Apply a proposed plan: the current active plan is archived and the
/// candidate becomes active, atomically.
pub async fn apply_proposed_plan(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    plan_id: EntityId,
) -> ScheduleResult<SchedulePlan> {
    let mut candidate = get_plan_owned(store, user_id, plan_id).await?;
    if candidate.status != PlanStatus::Proposed {
        return Err(ScheduleError::conflict(format!(
            "plan is {}, only a proposed plan can be applied",
            candidate.status
        )));
    }

    let current_active = store.plan_get_active(user_id).await?;
    if let Some(active) = &current_active {
        if active.id == candidate.id {
            return Ok(candidate);
        }
    }

    let mut updates = Vec::new();
    if let Some(mut active) = current_active {
        active.transition_to(PlanStatus::Archived)?;
        updates.push(active);
    }
    candidate.transition_to(PlanStatus::Active)?;
    updates.push(candidate.clone());

    store.plan_update_many(&updates).await?;
    tracing::info!(%user_id, plan_id = %candidate.id, "applied proposed plan");
    Ok(candidate)
}

/// Discard a proposed (or failed) plan without ever activating it.
pub async fn discard_plan(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    plan_id: EntityId,
) -> ScheduleResult<SchedulePlan> {
    let mut plan = get_plan_owned(store, user_id, plan_id).await?;
    plan.transition_to(PlanStatus::Archived)?;
    store.plan_update(&plan).await?;
    tracing::info!(%user_id, %plan_id, "discarded plan");
    Ok(plan)
}

/// Revert to an archived plan: a new active version is created from the
/// target, its events are cloned over, and whichever plan is currently
/// active is archived, all in one transaction.
pub async fn revert_to_plan(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    target_plan_id: EntityId,
) -> ScheduleResult<SchedulePlan> {
    let target = get_plan_owned(store, user_id, target_plan_id).await?;
    if target.status != PlanStatus::Archived {
        return Err(ScheduleError::conflict(format!(
            "plan is {}, only an archived plan can be reverted to",
            target.status
        )));
    }

    let mut new_plan = target.create_next_version();
    new_plan.status = PlanStatus::Active;

    // Task rows are plan-scoped snapshots kept alive across versions;
    // events are cloned and keep referencing the target's task rows.
    let horizon_end = match target.end_date_ms {
        Some(end) => end,
        None => day_start_utc(Utc::now().timestamp_millis()) + 183 * DAY_MS,
    };
    let events = store
        .event_list_by_plan_range(target.id, target.start_date_ms, horizon_end)
        .await?;
    let cloned_events: Vec<ScheduleEvent> = events
        .iter()
        .map(|event| event.clone_for_plan(new_plan.id, event.schedule_task_id))
        .collect();

    let mut plan_updates = Vec::new();
    if let Some(mut active) = store.plan_get_active(user_id).await? {
        active.transition_to(PlanStatus::Archived)?;
        plan_updates.push(active);
    }

    store
        .plan_insert_deep(&new_plan, &[], &cloned_events, &plan_updates)
        .await?;

    tracing::info!(
        %user_id,
        target_plan = %target.id,
        new_plan = %new_plan.id,
        events = cloned_events.len(),
        "reverted to archived plan"
    );
    Ok(new_plan)
}

/// Plan + events in range + the tasks those events reference + stats.
pub async fn get_plan_detail(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    plan_id: EntityId,
    from_date_ms: i64,
    to_date_ms: i64,
) -> ScheduleResult<PlanDetailResponse> {
    let plan = get_plan_owned(store, user_id, plan_id).await?;
    if from_date_ms > to_date_ms {
        return Err(ScheduleError::validation("fromDateMs is after toDateMs"));
    }

    let events = store
        .event_list_by_plan_range(plan_id, from_date_ms, to_date_ms)
        .await?;

    let mut task_row_ids: Vec<EntityId> = events.iter().map(|e| e.schedule_task_id).collect();
    task_row_ids.sort_unstable();
    task_row_ids.dedup();
    let tasks = store.task_list_by_ids(&task_row_ids).await?;

    let stats = PlanStats::compute(&tasks, &events);
    Ok(PlanDetailResponse {
        plan,
        events,
        tasks,
        stats,
    })
}

/// Archived plan history, newest first.
pub async fn get_plan_history(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    page: i64,
    page_size: i64,
) -> ScheduleResult<PlanHistoryResponse> {
    let page = page.max(1);
    let page_size = if (1..=50).contains(&page_size) {
        page_size
    } else {
        10
    };

    let plans = store
        .plan_list_by_status(user_id, PlanStatus::Archived, page_size, (page - 1) * page_size)
        .await?;
    let total_count = store
        .plan_count_by_status(user_id, PlanStatus::Archived)
        .await?;

    Ok(PlanHistoryResponse { plans, total_count })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::{new_entity_id, Priority, TaskScheduleStatus};
    use tempo_storage::MemoryStore;

    fn task_for(plan: &SchedulePlan) -> ScheduleTask {
        let now = Utc::now();
        ScheduleTask {
            id: new_entity_id(),
            user_id: plan.user_id,
            tenant_id: plan.tenant_id,
            schedule_plan_id: plan.id,
            task_id: new_entity_id(),
            task_snapshot_hash: String::new(),
            title: "t".into(),
            duration_min: 60,
            priority: Priority::Medium,
            priority_score: 0.0,
            category: None,
            is_deep_work: false,
            earliest_start_ms: None,
            deadline_ms: None,
            preferred_start_ms: None,
            allow_split: false,
            min_split_duration_min: 0,
            max_split_count: 0,
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
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let tenant = new_entity_id();

        let first = get_or_create_active_plan(&store, user, tenant, 30)
            .await
            .unwrap();
        let second = get_or_create_active_plan(&store, user, tenant, 30)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.plan_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_fidelity() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        let tasks: Vec<_> = (0..3).map(|_| task_for(&plan)).collect();
        for task in &tasks {
            store.task_insert(task).await.unwrap();
        }
        let event = ScheduleEvent::new(
            plan.id,
            tasks[0].id,
            day_start_utc(Utc::now().timestamp_millis()) + DAY_MS,
            540,
            600,
            "t",
        );
        store.event_save_batch(&[event.clone()]).await.unwrap();

        let cloned = clone_plan(&store, &plan, Algorithm::CpSat, 183).await.unwrap();
        assert_eq!(cloned.task_count, 3);
        assert_eq!(cloned.event_count, 1);
        assert_eq!(cloned.plan.version, plan.version + 1);
        assert_eq!(cloned.plan.parent_plan_id, Some(plan.id));
        assert_eq!(cloned.plan.status, PlanStatus::Proposed);
        assert_eq!(cloned.plan.algorithm_used, Algorithm::CpSat);

        // Same task count, every cloned task keeps its external task_id.
        let cloned_tasks = store.task_list_by_plan(cloned.plan.id).await.unwrap();
        assert_eq!(cloned_tasks.len(), tasks.len());
        for source in &tasks {
            let new_row_id = cloned.task_id_mapping[&source.id];
            let clone = cloned_tasks.iter().find(|t| t.id == new_row_id).unwrap();
            assert_eq!(clone.task_id, source.task_id);
        }

        // Cloned event rewired through the translation table.
        let cloned_events = store
            .event_list_by_plan_range(cloned.plan.id, 0, i64::MAX / 2)
            .await
            .unwrap();
        assert_eq!(cloned_events.len(), 1);
        assert_eq!(
            cloned_events[0].schedule_task_id,
            cloned.task_id_mapping[&tasks[0].id]
        );

        // Source plan untouched.
        let source_events = store
            .event_list_by_plan_range(plan.id, 0, i64::MAX / 2)
            .await
            .unwrap();
        assert_eq!(source_events.len(), 1);
        assert_eq!(source_events[0].id, event.id);
    }

    #[tokio::test]
    async fn test_apply_keeps_single_active_plan() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();
        let cloned = clone_plan(&store, &plan, Algorithm::Hybrid, 183).await.unwrap();

        let applied = apply_proposed_plan(&store, user, cloned.plan.id).await.unwrap();
        assert_eq!(applied.status, PlanStatus::Active);

        let old = store.plan_get(plan.id).await.unwrap().unwrap();
        assert_eq!(old.status, PlanStatus::Archived);

        // Exactly one active plan.
        let active = store.plan_get_active(user).await.unwrap().unwrap();
        assert_eq!(active.id, cloned.plan.id);
        assert_eq!(
            store
                .plan_count_by_status(user, PlanStatus::Active)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_apply_rejects_non_proposed() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        let err = apply_proposed_plan(&store, user, plan.id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_apply_enforces_ownership() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();
        let cloned = clone_plan(&store, &plan, Algorithm::Hybrid, 183).await.unwrap();

        let err = apply_proposed_plan(&store, new_entity_id(), cloned.plan.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_discard_archives_proposed_plan() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();
        let cloned = clone_plan(&store, &plan, Algorithm::Hybrid, 183).await.unwrap();

        let discarded = discard_plan(&store, user, cloned.plan.id).await.unwrap();
        assert_eq!(discarded.status, PlanStatus::Archived);

        // The active plan is untouched.
        let active = store.plan_get_active(user).await.unwrap().unwrap();
        assert_eq!(active.id, plan.id);
    }

    #[tokio::test]
    async fn test_revert_creates_new_active_version() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        // Apply a proposed plan so the original becomes archived history.
        let cloned = clone_plan(&store, &plan, Algorithm::Hybrid, 183).await.unwrap();
        apply_proposed_plan(&store, user, cloned.plan.id).await.unwrap();

        let reverted = revert_to_plan(&store, user, plan.id).await.unwrap();
        assert_eq!(reverted.status, PlanStatus::Active);
        assert_eq!(reverted.parent_plan_id, Some(plan.id));
        assert_eq!(reverted.version, plan.version + 1);

        // The plan that was active before the revert is archived now.
        let replaced = store.plan_get(cloned.plan.id).await.unwrap().unwrap();
        assert_eq!(replaced.status, PlanStatus::Archived);
        assert_eq!(
            store
                .plan_count_by_status(user, PlanStatus::Active)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_revert_requires_archived_target() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        let err = revert_to_plan(&store, user, plan.id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_plan_detail_rejects_inverted_range() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        let err = get_plan_detail(&store, user, plan.id, DAY_MS, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = get_or_create_active_plan(&store, user, new_entity_id(), 30)
            .await
            .unwrap();

        // Archive three proposed plans.
        for _ in 0..3 {
            let cloned = clone_plan(&store, &plan, Algorithm::Hybrid, 183).await.unwrap();
            discard_plan(&store, user, cloned.plan.id).await.unwrap();
        }

        let page1 = get_plan_history(&store, user, 1, 2).await.unwrap();
        assert_eq!(page1.plans.len(), 2);
        assert_eq!(page1.total_count, 3);

        let page2 = get_plan_history(&store, user, 2, 2).await.unwrap();
        assert_eq!(page2.plans.len(), 1);
    }
}
