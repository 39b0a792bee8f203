//! In-memory `ScheduleStore` for tests and development mode.
//!
//! Tables are `RwLock<HashMap>`s; composite operations take the relevant
//! write locks for their whole body, which gives the same atomicity the
//! SQL implementation gets from transactions. `queue_fetch_and_lock`
//! claims items by flipping them to `Processing` under one write lock, so
//! a concurrent worker sees an empty batch — the in-process equivalent of
//! a skip-locked dequeue.

use crate::ScheduleStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempo_core::{
    day_start_utc, Algorithm, AvailabilityRule, CalendarException, EntityId, EventStatus,
    PlanStatus, QueueStatus, RescheduleQueueItem, ScheduleEvent, SchedulePlan, ScheduleResult,
    ScheduleTask, ScheduleWindow, Timestamp, TriggerType,
};

#[derive(Debug, Clone)]
struct ProcessedEventRecord {
    #[allow(dead_code)]
    event_type: String,
    #[allow(dead_code)]
    source: String,
    processed_at: Timestamp,
}

/// In-memory storage. Cloning shares the underlying tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    availability: Arc<RwLock<HashMap<EntityId, Vec<AvailabilityRule>>>>,
    exceptions: Arc<RwLock<HashMap<EntityId, CalendarException>>>,
    windows: Arc<RwLock<HashMap<EntityId, Vec<ScheduleWindow>>>>,
    plans: Arc<RwLock<HashMap<EntityId, SchedulePlan>>>,
    tasks: Arc<RwLock<HashMap<EntityId, ScheduleTask>>>,
    events: Arc<RwLock<HashMap<EntityId, ScheduleEvent>>>,
    queue: Arc<RwLock<HashMap<EntityId, RescheduleQueueItem>>>,
    processed_events: Arc<RwLock<HashMap<String, ProcessedEventRecord>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        write(&self.availability).clear();
        write(&self.exceptions).clear();
        write(&self.windows).clear();
        write(&self.plans).clear();
        write(&self.tasks).clear();
        write(&self.events).clear();
        write(&self.queue).clear();
        write(&self.processed_events).clear();
    }

    pub fn plan_count(&self) -> usize {
        read(&self.plans).len()
    }

    pub fn event_count(&self) -> usize {
        read(&self.events).len()
    }

    pub fn queue_count(&self) -> usize {
        read(&self.queue).len()
    }

    fn queue_merge(
        table: &mut HashMap<EntityId, RescheduleQueueItem>,
        item: RescheduleQueueItem,
    ) {
        let existing = table.values_mut().find(|row| {
            row.status == QueueStatus::Pending
                && row.schedule_plan_id == item.schedule_plan_id
                && row.entity_id == item.entity_id
                && row.trigger_type == item.trigger_type
        });

        match existing {
            Some(row) => {
                row.change_payload = item.change_payload;
                row.debounce_until = item.debounce_until;
                row.priority = item.priority;
                row.updated_at = Utc::now();
            }
            None => {
                table.insert(item.id, item);
            }
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    // === Availability ===

    async fn availability_list(&self, user_id: EntityId) -> ScheduleResult<Vec<AvailabilityRule>> {
        Ok(read(&self.availability)
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn availability_replace(
        &self,
        user_id: EntityId,
        rules: Vec<AvailabilityRule>,
    ) -> ScheduleResult<Vec<AvailabilityRule>> {
        write(&self.availability).insert(user_id, rules.clone());
        Ok(rules)
    }

    // === Exceptions ===

    async fn exception_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<CalendarException>> {
        let from = day_start_utc(from_date_ms);
        let to = day_start_utc(to_date_ms);
        let mut result: Vec<_> = read(&self.exceptions)
            .values()
            .filter(|ex| ex.user_id == user_id && ex.date_ms >= from && ex.date_ms <= to)
            .cloned()
            .collect();
        result.sort_by_key(|ex| (ex.date_ms, ex.start_min));
        Ok(result)
    }

    async fn exception_insert(&self, exception: &CalendarException) -> ScheduleResult<()> {
        write(&self.exceptions).insert(exception.id, exception.clone());
        Ok(())
    }

    async fn exception_get(&self, id: EntityId) -> ScheduleResult<Option<CalendarException>> {
        Ok(read(&self.exceptions).get(&id).cloned())
    }

    async fn exception_delete(&self, id: EntityId, user_id: EntityId) -> ScheduleResult<bool> {
        let mut table = write(&self.exceptions);
        match table.get(&id) {
            Some(ex) if ex.user_id == user_id => {
                table.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // === Windows ===

    async fn window_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleWindow>> {
        let from = day_start_utc(from_date_ms);
        let to = day_start_utc(to_date_ms);
        let mut result: Vec<_> = read(&self.windows)
            .get(&user_id)
            .map(|windows| {
                windows
                    .iter()
                    .filter(|w| w.date_ms >= from && w.date_ms <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by_key(|w| (w.date_ms, w.start_min));
        Ok(result)
    }

    async fn window_replace_range(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
        windows: Vec<ScheduleWindow>,
    ) -> ScheduleResult<()> {
        let from = day_start_utc(from_date_ms);
        let to = day_start_utc(to_date_ms);
        let mut table = write(&self.windows);
        let entry = table.entry(user_id).or_default();
        entry.retain(|w| w.date_ms < from || w.date_ms > to);
        entry.extend(windows);
        entry.sort_by_key(|w| (w.date_ms, w.start_min));
        Ok(())
    }

    // === Plans ===

    async fn plan_insert(&self, plan: &SchedulePlan) -> ScheduleResult<()> {
        write(&self.plans).insert(plan.id, plan.clone());
        Ok(())
    }

    async fn plan_get(&self, id: EntityId) -> ScheduleResult<Option<SchedulePlan>> {
        Ok(read(&self.plans).get(&id).cloned())
    }

    async fn plan_update(&self, plan: &SchedulePlan) -> ScheduleResult<()> {
        write(&self.plans).insert(plan.id, plan.clone());
        Ok(())
    }

    async fn plan_update_many(&self, plans: &[SchedulePlan]) -> ScheduleResult<()> {
        let mut table = write(&self.plans);
        for plan in plans {
            table.insert(plan.id, plan.clone());
        }
        Ok(())
    }

    async fn plan_get_active(&self, user_id: EntityId) -> ScheduleResult<Option<SchedulePlan>> {
        Ok(read(&self.plans)
            .values()
            .find(|p| p.user_id == user_id && p.status == PlanStatus::Active)
            .cloned())
    }

    async fn plan_get_proposed(
        &self,
        user_id: EntityId,
        algorithm: Option<Algorithm>,
    ) -> ScheduleResult<Option<SchedulePlan>> {
        let mut candidates: Vec<_> = read(&self.plans)
            .values()
            .filter(|p| {
                p.user_id == user_id
                    && matches!(p.status, PlanStatus::Proposed | PlanStatus::Optimizing)
                    && algorithm.map_or(true, |algo| p.algorithm_used == algo)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(candidates.into_iter().next())
    }

    async fn plan_list_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
        limit: i64,
        offset: i64,
    ) -> ScheduleResult<Vec<SchedulePlan>> {
        let mut plans: Vec<_> = read(&self.plans)
            .values()
            .filter(|p| p.user_id == user_id && p.status == status)
            .cloned()
            .collect();
        plans.sort_by_key(|p| std::cmp::Reverse(p.updated_at));
        Ok(plans
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn plan_count_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
    ) -> ScheduleResult<i64> {
        Ok(read(&self.plans)
            .values()
            .filter(|p| p.user_id == user_id && p.status == status)
            .count() as i64)
    }

    async fn plan_insert_deep(
        &self,
        plan: &SchedulePlan,
        tasks: &[ScheduleTask],
        events: &[ScheduleEvent],
        plan_updates: &[SchedulePlan],
    ) -> ScheduleResult<()> {
        // Lock order: plans, tasks, events. Held together for atomicity.
        let mut plan_table = write(&self.plans);
        let mut task_table = write(&self.tasks);
        let mut event_table = write(&self.events);

        plan_table.insert(plan.id, plan.clone());
        for update in plan_updates {
            plan_table.insert(update.id, update.clone());
        }
        for task in tasks {
            task_table.insert(task.id, task.clone());
        }
        for event in events {
            event_table.insert(event.id, event.clone());
        }
        Ok(())
    }

    // === Tasks ===

    async fn task_insert(&self, task: &ScheduleTask) -> ScheduleResult<()> {
        write(&self.tasks).insert(task.id, task.clone());
        Ok(())
    }

    async fn task_update(&self, task: &ScheduleTask) -> ScheduleResult<()> {
        write(&self.tasks).insert(task.id, task.clone());
        Ok(())
    }

    async fn task_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleTask>> {
        Ok(read(&self.tasks).get(&id).cloned())
    }

    async fn task_get_by_plan_and_task(
        &self,
        plan_id: EntityId,
        task_id: EntityId,
    ) -> ScheduleResult<Option<ScheduleTask>> {
        Ok(read(&self.tasks)
            .values()
            .find(|t| t.schedule_plan_id == plan_id && t.task_id == task_id)
            .cloned())
    }

    async fn task_list_by_plan(&self, plan_id: EntityId) -> ScheduleResult<Vec<ScheduleTask>> {
        let mut tasks: Vec<_> = read(&self.tasks)
            .values()
            .filter(|t| t.schedule_plan_id == plan_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn task_list_by_ids(&self, ids: &[EntityId]) -> ScheduleResult<Vec<ScheduleTask>> {
        let table = read(&self.tasks);
        Ok(ids.iter().filter_map(|id| table.get(id).cloned()).collect())
    }

    async fn task_delete(&self, id: EntityId) -> ScheduleResult<bool> {
        Ok(write(&self.tasks).remove(&id).is_some())
    }

    // === Events ===

    async fn event_save_batch(&self, events: &[ScheduleEvent]) -> ScheduleResult<()> {
        let mut table = write(&self.events);
        for event in events {
            table.insert(event.id, event.clone());
        }
        Ok(())
    }

    async fn event_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleEvent>> {
        Ok(read(&self.events).get(&id).cloned())
    }

    async fn event_list_by_plan_range(
        &self,
        plan_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleEvent>> {
        let from = day_start_utc(from_date_ms);
        let to = day_start_utc(to_date_ms);
        let mut result: Vec<_> = read(&self.events)
            .values()
            .filter(|e| e.schedule_plan_id == plan_id && e.date_ms >= from && e.date_ms <= to)
            .cloned()
            .collect();
        result.sort_by_key(|e| (e.date_ms, e.start_min));
        Ok(result)
    }

    async fn event_list_by_task(&self, task_id: EntityId) -> ScheduleResult<Vec<ScheduleEvent>> {
        let mut result: Vec<_> = read(&self.events)
            .values()
            .filter(|e| e.schedule_task_id == task_id)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.part_index);
        Ok(result)
    }

    async fn event_count_by_task_and_status(
        &self,
        task_id: EntityId,
        status: EventStatus,
    ) -> ScheduleResult<i64> {
        Ok(read(&self.events)
            .values()
            .filter(|e| e.schedule_task_id == task_id && e.status == status)
            .count() as i64)
    }

    async fn event_move_apply(
        &self,
        event: &ScheduleEvent,
        task: &ScheduleTask,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut event_table = write(&self.events);
        let mut task_table = write(&self.tasks);
        let mut queue_table = write(&self.queue);

        event_table.insert(event.id, event.clone());
        task_table.insert(task.id, task.clone());
        if let Some(item) = enqueue {
            Self::queue_merge(&mut queue_table, item);
        }
        Ok(())
    }

    async fn event_complete_apply(
        &self,
        event: &ScheduleEvent,
        task: Option<&ScheduleTask>,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut event_table = write(&self.events);
        let mut task_table = write(&self.tasks);
        let mut queue_table = write(&self.queue);

        event_table.insert(event.id, event.clone());
        if let Some(task) = task {
            task_table.insert(task.id, task.clone());
        }
        if let Some(item) = enqueue {
            Self::queue_merge(&mut queue_table, item);
        }
        Ok(())
    }

    async fn event_split_apply(
        &self,
        original: &ScheduleEvent,
        new_part: &ScheduleEvent,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut event_table = write(&self.events);
        let mut queue_table = write(&self.queue);

        // Shift later sibling parts before the new part takes its index.
        for sibling in event_table.values_mut() {
            if sibling.schedule_task_id == original.schedule_task_id
                && sibling.id != original.id
                && sibling.part_index >= new_part.part_index
            {
                sibling.part_index += 1;
            }
        }
        for sibling in event_table.values_mut() {
            if sibling.schedule_task_id == original.schedule_task_id {
                sibling.total_parts = original.total_parts;
            }
        }

        event_table.insert(original.id, original.clone());
        event_table.insert(new_part.id, new_part.clone());
        if let Some(item) = enqueue {
            Self::queue_merge(&mut queue_table, item);
        }
        Ok(())
    }

    async fn event_update(&self, event: &ScheduleEvent) -> ScheduleResult<()> {
        write(&self.events).insert(event.id, event.clone());
        Ok(())
    }

    // === Queue ===

    async fn queue_upsert(&self, item: RescheduleQueueItem) -> ScheduleResult<()> {
        Self::queue_merge(&mut write(&self.queue), item);
        Ok(())
    }

    async fn queue_dirty_plan_ids(
        &self,
        now: Timestamp,
        stale_before: Timestamp,
        limit: i64,
    ) -> ScheduleResult<Vec<EntityId>> {
        let table = read(&self.queue);
        let mut plan_ids: Vec<EntityId> = Vec::new();
        for item in table.values() {
            if item.status == QueueStatus::Pending
                && (item.debounce_until <= now || item.first_created_at <= stale_before)
                && !plan_ids.contains(&item.schedule_plan_id)
            {
                plan_ids.push(item.schedule_plan_id);
                if plan_ids.len() as i64 >= limit {
                    break;
                }
            }
        }
        Ok(plan_ids)
    }

    async fn queue_fetch_and_lock(
        &self,
        plan_id: EntityId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> ScheduleResult<Vec<RescheduleQueueItem>> {
        let mut table = write(&self.queue);
        let mut claimed = Vec::new();
        for item in table.values_mut() {
            if item.schedule_plan_id == plan_id
                && item.status == QueueStatus::Pending
                && (item.debounce_until <= now || item.first_created_at <= stale_before)
            {
                item.status = QueueStatus::Processing;
                item.updated_at = Utc::now();
                claimed.push(item.clone());
            }
        }
        claimed.sort_by(|a, b| {
            (a.priority, a.created_at).cmp(&(b.priority, b.created_at))
        });
        Ok(claimed)
    }

    async fn queue_update_status(
        &self,
        ids: &[EntityId],
        status: QueueStatus,
        error_message: Option<String>,
        processing_duration_ms: Option<i64>,
    ) -> ScheduleResult<()> {
        let now = Utc::now();
        let mut table = write(&self.queue);
        for id in ids {
            if let Some(item) = table.get_mut(id) {
                item.status = status;
                item.updated_at = now;
                if matches!(status, QueueStatus::Completed | QueueStatus::Failed) {
                    item.processed_at = Some(now);
                    item.processing_duration_ms = processing_duration_ms;
                }
                if error_message.is_some() {
                    item.error_message = error_message.clone();
                }
            }
        }
        Ok(())
    }

    async fn queue_increment_retry(
        &self,
        ids: &[EntityId],
        new_debounce_until: Timestamp,
    ) -> ScheduleResult<()> {
        let now = Utc::now();
        let mut table = write(&self.queue);
        for id in ids {
            if let Some(item) = table.get_mut(id) {
                item.retry_count += 1;
                item.status = QueueStatus::Pending;
                item.debounce_until = new_debounce_until;
                item.updated_at = now;
            }
        }
        Ok(())
    }

    async fn queue_purge_completed(&self, older_than: Timestamp) -> ScheduleResult<u64> {
        let mut table = write(&self.queue);
        let before = table.len();
        table.retain(|_, item| {
            !(item.status == QueueStatus::Completed
                && matches!(item.processed_at, Some(at) if at < older_than))
        });
        Ok((before - table.len()) as u64)
    }

    async fn queue_pending_count(&self, plan_id: EntityId) -> ScheduleResult<i64> {
        Ok(read(&self.queue)
            .values()
            .filter(|item| {
                item.schedule_plan_id == plan_id && item.status == QueueStatus::Pending
            })
            .count() as i64)
    }

    // === Processed events ===

    async fn processed_event_check_and_record(
        &self,
        event_id: &str,
        event_type: &str,
        source: &str,
    ) -> ScheduleResult<bool> {
        let mut table = write(&self.processed_events);
        if table.contains_key(event_id) {
            return Ok(true);
        }
        table.insert(
            event_id.to_string(),
            ProcessedEventRecord {
                event_type: event_type.to_string(),
                source: source.to_string(),
                processed_at: Utc::now(),
            },
        );
        Ok(false)
    }

    async fn processed_event_purge(&self, older_than: Timestamp) -> ScheduleResult<u64> {
        let mut table = write(&self.processed_events);
        let before = table.len();
        table.retain(|_, record| record.processed_at >= older_than);
        Ok((before - table.len()) as u64)
    }

    // === Health ===

    async fn health_check(&self) -> ScheduleResult<bool> {
        Ok(true)
    }
}

impl MemoryStore {
    /// Seed an item bypassing debounce merging (tests only).
    #[doc(hidden)]
    pub fn insert_queue_item_raw(&self, item: RescheduleQueueItem) {
        write(&self.queue).insert(item.id, item);
    }

    /// Count of queue items for one `(plan, entity, trigger)` key in any
    /// status (tests only).
    #[doc(hidden)]
    pub fn queue_key_count(
        &self,
        plan_id: EntityId,
        entity_id: EntityId,
        trigger: TriggerType,
    ) -> usize {
        read(&self.queue)
            .values()
            .filter(|item| {
                item.schedule_plan_id == plan_id
                    && item.entity_id == entity_id
                    && item.trigger_type == trigger
            })
            .count()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempo_core::{new_entity_id, ChangePayload, DAY_MS};

    fn task_added(user: EntityId, plan: EntityId, task: EntityId) -> RescheduleQueueItem {
        RescheduleQueueItem::new(
            user,
            plan,
            task,
            ChangePayload::TaskAdded { task_id: task },
            Duration::seconds(30),
        )
    }

    #[tokio::test]
    async fn test_window_replace_range_is_idempotent() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let windows = vec![
            ScheduleWindow {
                user_id: user,
                date_ms: DAY_MS,
                start_min: 540,
                end_min: 720,
            },
            ScheduleWindow {
                user_id: user,
                date_ms: DAY_MS,
                start_min: 780,
                end_min: 1020,
            },
        ];

        store
            .window_replace_range(user, DAY_MS, DAY_MS, windows.clone())
            .await
            .unwrap();
        let first = store.window_list(user, DAY_MS, DAY_MS).await.unwrap();

        store
            .window_replace_range(user, DAY_MS, DAY_MS, windows)
            .await
            .unwrap();
        let second = store.window_list(user, DAY_MS, DAY_MS).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_window_replace_only_touches_range() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let outside = ScheduleWindow {
            user_id: user,
            date_ms: 5 * DAY_MS,
            start_min: 540,
            end_min: 600,
        };
        store
            .window_replace_range(user, 5 * DAY_MS, 5 * DAY_MS, vec![outside.clone()])
            .await
            .unwrap();

        store
            .window_replace_range(user, DAY_MS, 2 * DAY_MS, vec![])
            .await
            .unwrap();

        let remaining = store.window_list(user, 0, 10 * DAY_MS).await.unwrap();
        assert_eq!(remaining, vec![outside]);
    }

    #[tokio::test]
    async fn test_queue_upsert_debounce_merge() {
        let store = MemoryStore::new();
        let (user, plan, task) = (new_entity_id(), new_entity_id(), new_entity_id());

        store.queue_upsert(task_added(user, plan, task)).await.unwrap();
        let first_created = {
            let items = store
                .queue_fetch_and_lock(plan, Utc::now() + Duration::hours(1), Utc::now())
                .await
                .unwrap();
            assert_eq!(items.len(), 1);
            // Put it back to Pending to exercise the merge path again.
            store
                .queue_increment_retry(&[items[0].id], Utc::now() + Duration::seconds(30))
                .await
                .unwrap();
            items[0].first_created_at
        };

        // Second upsert with the same key merges instead of duplicating.
        store.queue_upsert(task_added(user, plan, task)).await.unwrap();
        assert_eq!(store.queue_key_count(plan, task, TriggerType::TaskAdded), 1);

        let items = store
            .queue_fetch_and_lock(plan, Utc::now() + Duration::hours(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        // first_created_at survives the merge: the starvation clock keeps running.
        assert_eq!(items[0].first_created_at, first_created);
    }

    #[tokio::test]
    async fn test_queue_starvation_bound() {
        let store = MemoryStore::new();
        let (user, plan, task) = (new_entity_id(), new_entity_id(), new_entity_id());

        let mut item = task_added(user, plan, task);
        // Continuously refreshed: debounce is always in the future.
        item.debounce_until = Utc::now() + Duration::hours(1);
        item.first_created_at = Utc::now() - Duration::minutes(10);
        store.insert_queue_item_raw(item);

        let now = Utc::now();
        // Not yet past the starvation bound.
        let dirty = store
            .queue_dirty_plan_ids(now, now - Duration::minutes(30), 10)
            .await
            .unwrap();
        assert!(dirty.is_empty());

        // Past the bound: returned despite the refreshed debounce.
        let dirty = store
            .queue_dirty_plan_ids(now, now - Duration::minutes(5), 10)
            .await
            .unwrap();
        assert_eq!(dirty, vec![plan]);
    }

    #[tokio::test]
    async fn test_fetch_and_lock_excludes_concurrent_worker() {
        let store = MemoryStore::new();
        let (user, plan, task) = (new_entity_id(), new_entity_id(), new_entity_id());

        let mut item = task_added(user, plan, task);
        item.debounce_until = Utc::now() - Duration::seconds(1);
        store.insert_queue_item_raw(item);

        let now = Utc::now();
        let stale = now - Duration::minutes(5);

        let first = store.queue_fetch_and_lock(plan, now, stale).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, QueueStatus::Processing);

        // Second worker draining the same plan gets nothing.
        let second = store.queue_fetch_and_lock(plan, now, stale).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_lock_orders_by_priority_then_age() {
        let store = MemoryStore::new();
        let (user, plan) = (new_entity_id(), new_entity_id());

        let mut low = task_added(user, plan, new_entity_id());
        low.priority = 5;
        low.debounce_until = Utc::now() - Duration::seconds(1);
        let mut urgent = task_added(user, plan, new_entity_id());
        urgent.priority = 1;
        urgent.debounce_until = Utc::now() - Duration::seconds(1);

        store.insert_queue_item_raw(low.clone());
        store.insert_queue_item_raw(urgent.clone());

        let items = store
            .queue_fetch_and_lock(plan, Utc::now(), Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, urgent.id);
        assert_eq!(items[1].id, low.id);
    }

    #[tokio::test]
    async fn test_queue_retry_returns_to_pending() {
        let store = MemoryStore::new();
        let (user, plan, task) = (new_entity_id(), new_entity_id(), new_entity_id());
        let mut item = task_added(user, plan, task);
        item.debounce_until = Utc::now() - Duration::seconds(1);
        let id = item.id;
        store.insert_queue_item_raw(item);

        let claimed = store
            .queue_fetch_and_lock(plan, Utc::now(), Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        store
            .queue_increment_retry(&[id], Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(store.queue_pending_count(plan).await.unwrap(), 1);

        let reclaimed = store
            .queue_fetch_and_lock(plan, Utc::now(), Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_queue_purge_completed() {
        let store = MemoryStore::new();
        let (user, plan, task) = (new_entity_id(), new_entity_id(), new_entity_id());
        let item = task_added(user, plan, task);
        let id = item.id;
        store.insert_queue_item_raw(item);

        store
            .queue_update_status(&[id], QueueStatus::Completed, None, Some(12))
            .await
            .unwrap();
        let purged = store
            .queue_purge_completed(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.queue_count(), 0);
    }

    #[tokio::test]
    async fn test_processed_event_dedup() {
        let store = MemoryStore::new();
        assert!(!store
            .processed_event_check_and_record("evt-1", "task.created", "task-service")
            .await
            .unwrap());
        assert!(store
            .processed_event_check_and_record("evt-1", "task.created", "task-service")
            .await
            .unwrap());

        let purged = store
            .processed_event_purge(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(!store
            .processed_event_check_and_record("evt-1", "task.created", "task-service")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_plan_insert_deep_and_active_lookup() {
        let store = MemoryStore::new();
        let user = new_entity_id();
        let plan = SchedulePlan::new_rolling(user, new_entity_id(), 30);

        store.plan_insert_deep(&plan, &[], &[], &[]).await.unwrap();
        let active = store.plan_get_active(user).await.unwrap().unwrap();
        assert_eq!(active.id, plan.id);
    }
}
